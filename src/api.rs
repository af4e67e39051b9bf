//! Request/response layer in front of the session pool.
//!
//! Every request maps to exactly one pool call and every outcome, including
//! malformed input, becomes a [`Response`]. Nothing here returns an error.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{ErrorKind, SshError};
use crate::ssh::{ChannelProvider, Credentials, SessionPool};
use crate::validation;

/// One operation against the pool, tagged by `op`.
#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Open {
        id: String,
        host: String,
        #[serde(default)]
        port: Option<i64>,
        username: String,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        key_path: Option<PathBuf>,
        #[serde(default)]
        passphrase: Option<String>,
    },
    Run {
        id: String,
        command: String,
    },
    Close {
        id: String,
    },
    List,
}

impl Request {
    pub fn op(&self) -> &'static str {
        match self {
            Request::Open { .. } => "open",
            Request::Run { .. } => "run",
            Request::Close { .. } => "close",
            Request::List => "list",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Copied from the request so callers can match out-of-order replies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
}

impl Response {
    pub fn ok(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_kind: None,
            data,
            request_id: None,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_kind: Some(kind),
            data: None,
            request_id: None,
        }
    }
}

impl From<SshError> for Response {
    fn from(err: SshError) -> Self {
        Response::failure(err.kind(), err.to_string())
    }
}

/// Parse one JSON request line and dispatch it. An optional top-level
/// `request_id` is echoed back in the response.
pub async fn handle_line<P: ChannelProvider>(
    pool: &SessionPool<P>,
    default_port: u16,
    line: &str,
) -> Response {
    let mut value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            return Response::failure(ErrorKind::InvalidRequest, format!("Invalid request: {}", e));
        }
    };

    let request_id = value
        .as_object_mut()
        .and_then(|object| object.remove("request_id"));

    let mut response = match serde_json::from_value::<Request>(value) {
        Ok(request) => dispatch(pool, default_port, request).await,
        Err(e) => Response::failure(ErrorKind::InvalidRequest, format!("Invalid request: {}", e)),
    };
    response.request_id = request_id;
    response
}

pub async fn dispatch<P: ChannelProvider>(
    pool: &SessionPool<P>,
    default_port: u16,
    request: Request,
) -> Response {
    let op = request.op();
    let response = match request {
        Request::Open {
            id,
            host,
            port,
            username,
            password,
            key_path,
            passphrase,
        } => {
            open(
                pool,
                OpenArgs {
                    id,
                    host,
                    port: port.unwrap_or(i64::from(default_port)),
                    username,
                    password,
                    key_path,
                    passphrase,
                },
            )
            .await
        }
        Request::Run { id, command } => run(pool, &id, &command).await,
        Request::Close { id } => close(pool, &id).await,
        Request::List => list(pool),
    };

    let response = response.unwrap_or_else(Response::from);
    if !response.success {
        tracing::debug!(op, kind = ?response.error_kind, "Request failed: {}", response.message);
    }
    response
}

struct OpenArgs {
    id: String,
    host: String,
    port: i64,
    username: String,
    password: Option<String>,
    key_path: Option<PathBuf>,
    passphrase: Option<String>,
}

async fn open<P: ChannelProvider>(
    pool: &SessionPool<P>,
    args: OpenArgs,
) -> Result<Response, SshError> {
    validation::validate_session_id(&args.id)?;
    validation::validate_host(&args.host)?;
    let port = validation::validate_port(args.port)?;
    validation::validate_username(&args.username)?;
    let credentials = Credentials::from_parts(args.password, args.key_path, args.passphrase)?;

    let record = pool
        .open(&args.id, &args.host, port, &args.username, credentials)
        .await?;

    Ok(Response::ok(
        format!(
            "Session '{}' opened to {}@{}:{}",
            record.id, record.username, record.host, record.port
        ),
        serde_json::to_value(&record).ok(),
    ))
}

async fn run<P: ChannelProvider>(
    pool: &SessionPool<P>,
    id: &str,
    command: &str,
) -> Result<Response, SshError> {
    validation::validate_session_id(id)?;
    let result = pool.run(id, command).await?;

    let mut message = format!("Command exited with code {}", result.exit_code);
    if result.truncated {
        message.push_str(" (output truncated)");
    }
    Ok(Response::ok(message, serde_json::to_value(&result).ok()))
}

async fn close<P: ChannelProvider>(pool: &SessionPool<P>, id: &str) -> Result<Response, SshError> {
    validation::validate_session_id(id)?;
    pool.close(id).await?;
    Ok(Response::ok(format!("Session '{}' closed", id), None))
}

fn list<P: ChannelProvider>(pool: &SessionPool<P>) -> Result<Response, SshError> {
    let sessions = pool.list();
    let count = sessions.len();
    Ok(Response::ok(
        format!("{} active session(s)", count),
        serde_json::to_value(&sessions)
            .ok()
            .map(|sessions| json!({ "sessions": sessions, "count": count })),
    ))
}

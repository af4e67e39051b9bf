use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use secrecy::ExposeSecret;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::SshError;
use crate::security_log;

use super::auth::{Credentials, ResolvedAuth};
use super::channel::{ChannelProvider, DialTarget, ShellChannel};
use super::handler::ClientHandler;

/// Buffer size of each in-process pipe between the SSH channel and the shell
/// session.
const PIPE_CAPACITY: usize = 256 * 1024;

/// SSH client for establishing connections
pub struct SshClient {
    config: Arc<Config>,
}

impl SshClient {
    pub fn new(keepalive_interval: u64) -> Self {
        // Treat 0 as "no keepalive" to avoid immediate timeout
        let keepalive = if keepalive_interval == 0 {
            None
        } else {
            Some(Duration::from_secs(keepalive_interval))
        };

        let config = Config {
            inactivity_timeout: Some(Duration::from_secs(3600)),
            keepalive_interval: keepalive,
            keepalive_max: 3,
            ..Default::default()
        };

        Self {
            config: Arc::new(config),
        }
    }

    async fn establish(
        &self,
        target: &DialTarget,
        credentials: &Credentials,
        stream: TcpStream,
    ) -> Result<ShellChannel, SshError> {
        let handler = ClientHandler::new(target.host.clone(), target.port);

        let mut handle = client::connect_stream(self.config.clone(), stream, handler)
            .await
            .map_err(|e| SshError::ConnectionFailed {
                host: target.host.clone(),
                port: target.port,
                reason: e.to_string(),
            })?;

        let auth = ResolvedAuth::resolve(credentials).await?;
        self.authenticate(&mut handle, target, credentials.method_name(), auth)
            .await?;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;

        // No PTY: stdout and stderr must stay separate streams.
        channel
            .request_shell(false)
            .await
            .map_err(|e| SshError::Channel(format!("Shell request failed: {}", e)))?;

        Ok(spawn_driver(handle, channel, target.addr()))
    }

    async fn authenticate(
        &self,
        handle: &mut Handle<ClientHandler>,
        target: &DialTarget,
        method_name: &str,
        auth: ResolvedAuth,
    ) -> Result<(), SshError> {
        let (host, port, username) = (target.host.as_str(), target.port, target.username.as_str());

        security_log::log_auth_attempt(host, port, username, method_name);

        let result = match auth {
            // Use expose_secret() only at the point of authentication
            ResolvedAuth::Password(password) => {
                handle
                    .authenticate_password(username, password.expose_secret())
                    .await
            }
            ResolvedAuth::PublicKey(key) => handle.authenticate_publickey(username, key).await,
        };

        let auth_result = match result {
            Ok(result) => result,
            Err(e) => {
                let reason = e.to_string();
                security_log::log_auth_failure(host, port, username, method_name, &reason);
                return Err(SshError::AuthenticationFailed(reason));
            }
        };

        if !auth_result.success() {
            let reason = "Authentication rejected by server";
            security_log::log_auth_failure(host, port, username, method_name, reason);
            return Err(SshError::AuthenticationFailed(reason.to_string()));
        }

        security_log::log_auth_success(host, port, username, method_name);
        Ok(())
    }
}

impl Default for SshClient {
    fn default() -> Self {
        Self::new(60)
    }
}

impl ChannelProvider for SshClient {
    async fn dial(
        &self,
        target: &DialTarget,
        credentials: &Credentials,
        connect_timeout: Duration,
    ) -> Result<ShellChannel, SshError> {
        let addr = target.addr();

        let stream = timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| SshError::Timeout(addr.clone()))?
            .map_err(|e| SshError::ConnectionFailed {
                host: target.host.clone(),
                port: target.port,
                reason: e.to_string(),
            })?;

        match timeout(connect_timeout, self.establish(target, credentials, stream)).await {
            Ok(result) => result,
            Err(_) => Err(SshError::Timeout(addr)),
        }
    }
}

/// Bridge the russh channel to plain byte pipes.
///
/// The spawned task owns the connection handle and channel. It ends when
/// the remote side closes the channel or when the local stdin pipe is shut
/// down, and disconnects the transport on the way out.
fn spawn_driver(handle: Handle<ClientHandler>, mut channel: Channel<Msg>, addr: String) -> ShellChannel {
    let (stdin_writer, mut stdin_reader) = tokio::io::duplex(PIPE_CAPACITY);
    let (stdout_reader, mut stdout_writer) = tokio::io::duplex(PIPE_CAPACITY);
    let (stderr_reader, mut stderr_writer) = tokio::io::duplex(PIPE_CAPACITY);

    let driver: JoinHandle<()> = tokio::spawn(async move {
        let mut buf = vec![0u8; 8192];

        loop {
            tokio::select! {
                // Remote output
                msg = channel.wait() => {
                    match msg {
                        Some(ChannelMsg::Data { data }) => {
                            if !forward(&mut stdout_writer, &data).await {
                                break;
                            }
                        }
                        Some(ChannelMsg::ExtendedData { data, ext }) => {
                            if ext == 1 && !forward(&mut stderr_writer, &data).await {
                                break;
                            }
                        }
                        Some(ChannelMsg::ExitStatus { exit_status }) => {
                            tracing::debug!(%addr, "Remote shell exited with status {}", exit_status);
                        }
                        Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                            tracing::debug!(%addr, "Remote shell channel closed");
                            break;
                        }
                        Some(_) => {}
                    }
                }
                // Local input
                read = stdin_reader.read(&mut buf) => {
                    match read {
                        Ok(0) | Err(_) => {
                            let _ = channel.eof().await;
                            break;
                        }
                        Ok(n) => {
                            if let Err(e) = channel.data(&buf[..n]).await {
                                tracing::warn!(%addr, "Failed to send data: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
        }

        let _ = channel.close().await;
        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "session closed", "en")
            .await
        {
            tracing::debug!(%addr, "Disconnect failed: {}", e);
        }
    });

    ShellChannel::new(stdin_writer, stdout_reader, stderr_reader).with_driver(driver)
}

async fn forward(pipe: &mut DuplexStream, data: &[u8]) -> bool {
    pipe.write_all(data).await.is_ok()
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use shellpool::api;
use shellpool::config::AppConfig;
use shellpool::ssh::{HostAllowlist, SessionPool, SshClient};

/// Pool of persistent remote shells, driven by JSON lines on stdin
#[derive(Parser, Debug)]
#[command(name = "shellpool")]
#[command(version)]
struct Cli {
    /// Comma-separated host patterns sessions may connect to, e.g. `*.example.com,10.0.*`
    #[arg(long, env = "SHELLPOOL_ALLOWED_HOSTS")]
    allowed_hosts: Option<String>,

    /// Config file (default: platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = shellpool::logging::init_logging(&cli.log_level, cli.log_file.as_deref());

    let config = AppConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_allowed_hosts(cli.allowed_hosts);
    let allowlist = HostAllowlist::compile(config.allowed_hosts.as_deref().unwrap_or(""))
        .context("Invalid allowed hosts")?;

    tracing::info!(
        patterns = ?allowlist.patterns().collect::<Vec<_>>(),
        max_sessions = config.pool.max_sessions,
        "Starting shellpool"
    );

    let pool = Arc::new(SessionPool::new(
        SshClient::new(config.ssh.keepalive_interval_secs),
        allowlist,
        config.pool.clone(),
        config.shell.clone(),
    ));

    serve(pool.clone(), config.ssh.default_port).await;

    let closed = pool.close_all().await;
    tracing::info!(closed, "Shutdown complete");
    Ok(())
}

/// Read requests from stdin until EOF or a shutdown signal. Requests run
/// concurrently; each response is written as one line as soon as it is ready.
async fn serve(pool: Arc<SessionPool<SshClient>>, default_port: u16) {
    let (tx, mut rx) = mpsc::channel::<String>(256);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(mut line) = rx.recv().await {
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                tracing::error!("Failed to write response: {}", e);
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();
    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    let interrupted = loop {
        tokio::select! {
            _ = &mut shutdown => break true,
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let pool = pool.clone();
                    let tx = tx.clone();
                    tasks.spawn(async move {
                        let response = api::handle_line(&pool, default_port, &line).await;
                        match serde_json::to_string(&response) {
                            Ok(json) => {
                                let _ = tx.send(json).await;
                            }
                            Err(e) => tracing::error!("Failed to encode response: {}", e),
                        }
                    });
                }
                Ok(None) => {
                    tracing::info!("Input closed");
                    break false;
                }
                Err(e) => {
                    tracing::warn!("Failed to read request: {}", e);
                    break false;
                }
            }
        }
    };

    if interrupted {
        tasks.abort_all();
    }
    while tasks.join_next().await.is_some() {}

    drop(tx);
    let _ = writer.await;
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        }
    }
}

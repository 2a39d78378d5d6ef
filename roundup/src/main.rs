use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use roundup::runtime::{ServerOptions, init_logging};
use roundup::server::Server;

/// Roundup micro-savings service.
#[derive(Debug, Parser)]
#[command(name = "roundup", version, about)]
struct Args {
    /// Address to bind.
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Route prefix of the savings API.
    #[arg(long)]
    api_prefix: Option<String>,

    /// Largest accepted request body, in bytes.
    #[arg(long)]
    max_body_bytes: Option<usize>,

    /// Also write logs to daily files in this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Args {
    fn into_options(self) -> anyhow::Result<ServerOptions> {
        let mut options = ServerOptions::from_env()?;
        if let Some(host) = self.host {
            options.host = host;
        }
        if let Some(port) = self.port {
            options.port = port;
        }
        if let Some(prefix) = self.api_prefix {
            options.api_prefix = prefix;
        }
        if let Some(limit) = self.max_body_bytes {
            options.max_body_bytes = limit;
        }
        if self.log_dir.is_some() {
            options.log_dir = self.log_dir;
        }
        options.sanitize()?;
        Ok(options)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = Args::parse().into_options()?;
    let _guard = init_logging(options.log_dir.as_deref(), "roundup")?;

    let addr = options.bind_addr();
    let server = Server::bind(options)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    server.serve(shutdown_signal()).await?;
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
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
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

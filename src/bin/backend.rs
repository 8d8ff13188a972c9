#![forbid(unsafe_code)]

//! HTTP server for the yt-dlp wrapper API.
//!
//! Reads its configuration from the environment once, verifies the external
//! tool is reachable, and serves `/info` and `/download` until interrupted.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::Parser;
use nix::unistd::Uid;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tubepipe::{
    config::Config,
    server,
    ytdlp::{YtDlp, ensure_tool_available},
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Minimal yt-dlp wrapper API server.")]
struct Cli {
    /// Bind address, overriding the HOST environment variable.
    #[arg(long, value_name = "ADDR")]
    host: Option<String>,
    /// Listening port, overriding the PORT environment variable.
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if Uid::current().is_root() {
        bail!("backend must not be run as root; use an unprivileged service account");
    }

    let mut config = Config::from_env().context("reading configuration from environment")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    if let Some(path) = &config.cookies_file
        && !path.exists()
    {
        warn!(
            "cookie file {} does not exist; yt-dlp will run without it failing here",
            path.display()
        );
    }

    let runner = YtDlp::from_config(&config);
    ensure_tool_available(runner.tool())
        .await
        .context("checking for the external downloader")?;

    let app = server::app(Arc::new(runner), &config.allow_origin)?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("parsing bind address {}:{}", config.host, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!("yt-dlp API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("failed to install Ctrl+C handler: {err}");
    }
}

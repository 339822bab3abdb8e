//! hookrelay
//!
//! Receives repository webhooks over HTTP and relays them as messages to an
//! IRC channel over a single persistent connection.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use hookrelay_core::OverflowPolicy;
use hookrelay_core::config::{Config, load_config};
use hookrelay_core::tracing_init::{default_filter, init_tracing};
use hookrelay_daemon::Relay;

#[derive(Parser, Debug)]
#[command(name = "hookrelay")]
#[command(version, about = "hookrelay - webhook to IRC notification relay")]
struct Args {
    /// Config file path (default: ~/.config/hookrelay/config.toml if present)
    #[arg(long, short, env = "HOOKRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// IRC server host
    #[arg(long)]
    server: Option<String>,

    /// IRC server port
    #[arg(long)]
    port: Option<u16>,

    /// Use TLS for the IRC connection
    #[arg(long)]
    tls: Option<bool>,

    /// Channel to post into (e.g. "#ci")
    #[arg(long)]
    channel: Option<String>,

    /// Nickname to register with
    #[arg(long)]
    nickname: Option<String>,

    /// Maximum queued messages
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Behavior when the queue is full: reject-new or drop-oldest
    #[arg(long)]
    overflow_policy: Option<OverflowPolicy>,

    /// Send attempts per message before it is dropped
    #[arg(long)]
    max_retries: Option<u32>,

    /// HTTP listen address for webhooks
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "HOOKRELAY_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "HOOKRELAY_LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// CLI flags are the highest-priority configuration layer.
    fn apply(&self, config: &mut Config) {
        if let Some(server) = &self.server {
            config.irc.server.clone_from(server);
        }
        if let Some(port) = self.port {
            config.irc.port = port;
        }
        if let Some(tls) = self.tls {
            config.irc.tls = tls;
        }
        if let Some(channel) = &self.channel {
            config.irc.channel.clone_from(channel);
        }
        if let Some(nickname) = &self.nickname {
            config.irc.nickname.clone_from(nickname);
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue.capacity = capacity;
        }
        if let Some(policy) = self.overflow_policy {
            config.queue.overflow_policy = policy;
        }
        if let Some(max_retries) = self.max_retries {
            config.delivery.max_retries = max_retries;
        }
        if let Some(addr) = self.listen_addr {
            config.receiver.listen_addr = addr;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&default_filter(&args.log_level), args.log_json);

    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting hookrelay");

    let relay = Relay::start(&config).await?;

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // Notify systemd that the relay is accepting webhooks (unix only).
    #[cfg(unix)]
    sd_notify::notify(false, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    info!(addr = %relay.local_addr(), "hookrelay ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    #[cfg(unix)]
    let _ = sd_notify::notify(false, &[sd_notify::NotifyState::Stopping]);

    relay.shutdown().await;
    info!("hookrelay stopped");
    Ok(())
}

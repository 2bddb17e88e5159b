//! Server entry point: loads the channel table, binds every channel's
//! listener, then hands control to the admin console.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use linechat::{channel::Channel, config, console};

/// Multi-channel chat server.
#[derive(Parser, Debug)]
#[command(name = "server", about = "Multi-channel chat server")]
struct Args {
    /// Path to the channel configuration file.
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let channels = config::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;

    let channels: Vec<Arc<Channel>> = channels
        .into_iter()
        .map(|entry| Channel::new(entry.name, entry.port, entry.capacity))
        .collect();
    let registry = Arc::new(channels);

    for channel in registry.iter() {
        let port = channel
            .clone()
            .start(registry.clone())
            .await
            .with_context(|| format!("failed to bind channel {}", channel.name))?;
        log::debug!("{} bound to port {}", channel.name, port);
    }

    console::run(registry).await;
    Ok(())
}

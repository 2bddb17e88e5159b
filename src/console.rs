//! The admin console: a stdin command loop running alongside the channel
//! listeners, for `/kick`, `/mute`, `/empty`, and `/shutdown`.

use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channel::MembershipOp;
use crate::registry::{self, Registry};
use crate::session;

/// Runs the admin console until `/shutdown` is entered or stdin closes.
/// Returns once every channel has been told to shut down.
pub async fn run(registry: Registry) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    println!("Admin console ready. Commands: /kick, /mute, /empty, /shutdown");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!("console: failed to read stdin: {err}");
                break;
            }
        };

        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["/kick", target] => handle_kick(&registry, target).await,
            ["/mute", target, seconds] => handle_mute(&registry, target, seconds).await,
            ["/empty", channel_name] => handle_empty(&registry, channel_name).await,
            ["/shutdown"] => {
                handle_shutdown(&registry).await;
                break;
            }
            [] => continue,
            _ => println!("Unrecognized command: {line}"),
        }
    }
}

/// Splits a `<channel>:<user>` admin target, as used by `/kick` and
/// `/mute`.
fn split_target(target: &str) -> Option<(&str, &str)> {
    target.split_once(':')
}

async fn handle_kick(registry: &Registry, target: &str) {
    let Some((channel_name, user)) = split_target(target) else {
        println!("Usage: /kick <channel>:<user>");
        return;
    };

    let Some(channel) = registry::find_channel(registry, channel_name) else {
        println!("{channel_name} does not exist.");
        return;
    };

    match channel.find_any(user).await {
        Some(session) => {
            session.mark_kicked();
            channel
                .process_membership(MembershipOp::Remove, session.clone())
                .await;
            let _ = session.close().await;
            info!("console: kicked {user} from {channel_name}");
            println!("Kicked {user}");
        }
        None => println!("{user} is not in {channel_name}."),
    }
}

async fn handle_mute(registry: &Registry, target: &str, seconds: &str) {
    let Some((channel_name, user)) = split_target(target) else {
        println!("Usage: /mute <channel>:<user> <seconds>");
        return;
    };

    let seconds: i64 = match seconds.parse() {
        Ok(seconds) if seconds > 0 => seconds,
        _ => {
            println!("Invalid mute time.");
            return;
        }
    };

    let Some(channel) = registry::find_channel(registry, channel_name) else {
        println!("{channel_name} does not exist.");
        return;
    };

    match channel.find_any(user).await {
        Some(session) => {
            session::mute_for(session, seconds).await;
        }
        None => println!("{user} is not here."),
    }
}

async fn handle_empty(registry: &Registry, channel_name: &str) {
    match registry::find_channel(registry, channel_name) {
        Some(channel) => {
            channel.empty().await;
            info!("console: emptied {channel_name}");
            println!("{channel_name} has been emptied.");
        }
        None => println!("{channel_name} does not exist."),
    }
}

async fn handle_shutdown(registry: &Registry) {
    println!("Shutting down...");
    for channel in registry.iter() {
        channel.shutdown().await;
    }
    info!("console: shutdown complete");
}

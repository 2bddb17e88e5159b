//! The set of all channels the server hosts, in config order, and the
//! `/list` report built from it.

use std::sync::Arc;

use crate::channel::Channel;

/// Shared, read-only-after-startup list of channel handles, in the order
/// they appeared in the configuration file. Wrapped in an `Arc` so every
/// session and the admin console can hold a clone cheaply; the list
/// itself is never mutated once the server starts, so no lock is needed
/// around it. Channel names are validated unique at config-load time, so
/// a linear scan by name is sufficient here (`config::load`).
pub type Registry = Arc<Vec<Arc<Channel>>>;

pub fn find_channel(registry: &Registry, name: &str) -> Option<Arc<Channel>> {
    registry.iter().find(|channel| channel.name == name).cloned()
}

/// Builds the `/list` reply: one line per channel, `[Channel] <name>
/// <connected>/<capacity>/<queued>.`, with no trailing newline after the
/// final line (clients read this as a raw chunk rather than line-by-line).
/// Channels are listed in config order, matching the registry itself.
pub async fn list_report(registry: &Registry) -> String {
    let mut lines = Vec::with_capacity(registry.len());
    for channel in registry.iter() {
        let (connected, capacity, queued) = channel.snapshot_counts().await;
        lines.push(format!(
            "[Channel] {} {connected}/{capacity}/{queued}.",
            channel.name
        ));
    }
    lines.join("\n")
}

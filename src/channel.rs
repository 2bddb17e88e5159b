//! A single channel: its listening socket, its connected set, and its FIFO
//! waiting queue.
//!
//! All membership transitions — admitting a new connection, a clean
//! `/quit`, an abrupt disconnect, an AFK timeout, or an admin `/kick` —
//! funnel through [`Channel::process_membership`], which holds the
//! channel's single [`tokio::sync::Mutex`] for the whole transition
//! (including the broadcast of the resulting join/leave notice). This is
//! the "broadcast under lock" design the system follows throughout:
//! correctness over throughput for membership bookkeeping, since a channel
//! is never expected to hold more than a few dozen sessions at once.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::line_io::LineReader;
use crate::protocol;
use crate::registry::Registry;
use crate::session::{self, Session, Status};

/// What happened to a session with respect to its channel's membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipOp {
    /// A newly accepted connection, admitted to CONNECTED or QUEUE.
    Add,
    /// A clean `/quit`, a `/switch` away, or an admin `/kick`.
    Remove,
    /// The socket dropped without a `/quit` (read error or EOF).
    RandExit,
    /// The AFK watchdog timed the session out.
    Timeout,
}

struct ChannelState {
    connected: Vec<Arc<Session>>,
    queue: VecDeque<Arc<Session>>,
}

/// One named, port-bound chat channel.
pub struct Channel {
    pub name: String,
    pub port: u16,
    pub capacity: usize,
    state: Mutex<ChannelState>,
    accept_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Channel {
    pub fn new(name: String, port: u16, capacity: usize) -> Arc<Channel> {
        Arc::new(Channel {
            name,
            port,
            capacity,
            state: Mutex::new(ChannelState {
                connected: Vec::new(),
                queue: VecDeque::new(),
            }),
            accept_task: std::sync::Mutex::new(None),
        })
    }

    /// Binds the channel's port and spawns the accept loop. Each accepted
    /// connection reads its username as the first line, then is admitted
    /// via [`MembershipOp::Add`] and handed off to [`session::run_session`].
    ///
    /// Returns the port actually bound, which lets tests start a channel on
    /// port 0 and read back the ephemeral port the OS assigned.
    pub async fn start(self: Arc<Self>, registry: Registry) -> std::io::Result<u16> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        let bound_port = listener.local_addr()?.port();
        info!("{} channel listening on port {}", self.name, bound_port);

        let channel = self.clone();
        let task = tokio::spawn(async move {
            loop {
                let (stream, addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!("{}: accept failed: {}", channel.name, err);
                        continue;
                    }
                };

                let channel = channel.clone();
                let registry = registry.clone();
                tokio::spawn(async move {
                    channel.admit(stream, addr, registry).await;
                });
            }
        });

        *self.accept_task.lock().unwrap() = Some(task);
        Ok(bound_port)
    }

    async fn admit(
        self: Arc<Self>,
        stream: tokio::net::TcpStream,
        addr: std::net::SocketAddr,
        registry: Registry,
    ) {
        let socket = Arc::new(stream);
        let mut reader = LineReader::new(socket.clone());

        let name = match reader.read_line().await {
            Ok(Some(name)) if !name.trim().is_empty() => name.trim().to_string(),
            _ => {
                warn!("{addr}: disconnected before sending a username");
                return;
            }
        };

        if self.name_exists(&name).await {
            let reject = protocol::server_message(format!(
                "Cannot connect to the {} channel.",
                self.name
            ));
            let mut raw = &*socket;
            let _ = raw.write_all(format!("{reject}\n").as_bytes()).await;
            let _ = raw.shutdown().await;
            warn!("{addr}: rejected, {name} already present in {}", self.name);
            return;
        }

        let session = Session::new(name, socket, self.clone());
        self.process_membership(MembershipOp::Add, session.clone())
            .await;
        session::run_session(session, reader, registry).await;
    }

    /// Applies one membership transition under the channel's lock, updating
    /// the connected/queue lists and broadcasting the resulting notice.
    pub async fn process_membership(&self, op: MembershipOp, session: Arc<Session>) {
        let mut state = self.state.lock().await;

        match op {
            MembershipOp::Add => {
                self.do_add(&mut state, session).await;
            }
            MembershipOp::Remove | MembershipOp::RandExit | MembershipOp::Timeout => {
                let was_connected = state.connected.iter().any(|s| Arc::ptr_eq(s, &session));
                let was_queued = state.queue.iter().any(|s| Arc::ptr_eq(s, &session));
                state.connected.retain(|s| !Arc::ptr_eq(s, &session));
                state.queue.retain(|s| !Arc::ptr_eq(s, &session));

                // REMOVE (voluntary quit, switch, or kick) and RANDEXIT (peer
                // dropped the socket) share one leave notice; TIMEOUT gets
                // its own AFK notice.
                let verb = match op {
                    MembershipOp::Remove | MembershipOp::RandExit => "has left the channel",
                    MembershipOp::Timeout => "went AFK",
                    MembershipOp::Add => unreachable!(),
                };

                if was_connected {
                    let notice = protocol::server_message(format!("{} {}.", session.name, verb));
                    Self::broadcast_locked(&state.connected, &notice).await;
                    if !session.is_kicked() {
                        info!("{}: {} {}", self.name, session.name, verb);
                    }
                    self.reindex_queue(&mut state).await;
                } else if was_queued {
                    if op != MembershipOp::RandExit && !session.is_kicked() {
                        info!("{}: {} has left the channel (queued)", self.name, session.name);
                    }
                    Self::notify_queue_positions(&state.queue).await;
                }
            }
        }
    }

    async fn do_add(&self, state: &mut ChannelState, session: Arc<Session>) {
        let _ = session
            .send_line(&protocol::server_message(format!(
                "Welcome to the {} channel.",
                self.name
            )))
            .await;

        if state.connected.len() < self.capacity {
            session.set_status(Status::Connected);
            session.touch_activity();
            let notice =
                protocol::server_message(format!("{} has joined the channel.", session.name));
            state.connected.push(session.clone());
            Self::broadcast_locked(&state.connected, &notice).await;
            info!("{}: {} joined", self.name, session.name);
        } else {
            session.set_status(Status::Queue);
            let ahead = state.queue.len();
            state.queue.push_back(session.clone());
            let _ = session
                .send_line(&protocol::server_message(format!(
                    "{ahead} user(s) ahead of you."
                )))
                .await;
            info!("{}: {} queued, {ahead} ahead", self.name, session.name);
        }
    }

    /// Promotes waiting sessions into the connected set while there is
    /// room, in FIFO order, then renumbers whoever is still waiting. Each
    /// promotion re-enters the session through the same welcome/broadcast
    /// path a fresh connection takes.
    async fn reindex_queue(&self, state: &mut ChannelState) {
        while state.connected.len() < self.capacity {
            let Some(next) = state.queue.pop_front() else {
                break;
            };
            info!("{}: {} promoted from queue", self.name, next.name);
            self.do_add(state, next).await;
        }
        Self::notify_queue_positions(&state.queue).await;
    }

    async fn notify_queue_positions(queue: &VecDeque<Arc<Session>>) {
        for (ahead, session) in queue.iter().enumerate() {
            let _ = session
                .send_line(&protocol::server_message(format!(
                    "{ahead} user(s) ahead of you."
                )))
                .await;
        }
    }

    async fn broadcast_locked(connected: &[Arc<Session>], text: &str) {
        for session in connected {
            let _ = session.send_line(text).await;
        }
    }

    /// Sends `text` to every currently connected session.
    pub async fn broadcast_public(&self, text: &str) {
        let state = self.state.lock().await;
        Self::broadcast_locked(&state.connected, text).await;
    }

    /// Looks up a connected (not merely queued) session by name.
    pub async fn find_connected(&self, name: &str) -> Option<Arc<Session>> {
        let state = self.state.lock().await;
        state.connected.iter().find(|s| s.name == name).cloned()
    }

    /// True if `name` is connected or waiting in this channel.
    pub async fn name_exists(&self, name: &str) -> bool {
        let state = self.state.lock().await;
        state.connected.iter().any(|s| s.name == name) || state.queue.iter().any(|s| s.name == name)
    }

    /// Looks up a session by name regardless of whether it is connected or
    /// only waiting in the queue, used by the admin console (`/kick`,
    /// `/mute`) which does not distinguish the two.
    pub async fn find_any(&self, name: &str) -> Option<Arc<Session>> {
        let state = self.state.lock().await;
        state
            .connected
            .iter()
            .chain(state.queue.iter())
            .find(|s| s.name == name)
            .cloned()
    }

    /// `(connected count, capacity, queued count)` for the `/list` report.
    pub async fn snapshot_counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock().await;
        (state.connected.len(), self.capacity, state.queue.len())
    }

    /// Disconnects every connected and queued session, used by the admin
    /// `/empty` command. Each session's own receive loop notices the closed
    /// socket and unwinds itself, so membership bookkeeping is left to the
    /// normal `RandExit` path rather than mutated here directly.
    pub async fn empty(&self) {
        let mut state = self.state.lock().await;
        for session in state.connected.iter().chain(state.queue.iter()) {
            session.mark_kicked();
            session.set_status(Status::Disconnected);
            let _ = session.close().await;
        }
        let total = state.connected.len() + state.queue.len();
        state.connected.clear();
        state.queue.clear();
        info!("{}: emptied ({total} sessions)", self.name);
    }

    /// Disconnects every session and stops accepting new connections.
    pub async fn shutdown(&self) {
        self.empty().await;
        if let Some(task) = self.accept_task.lock().unwrap().take() {
            task.abort();
        }
    }
}

//! Per-connection state: the socket, membership status, mute/AFK clocks,
//! and the receive loop that dispatches commands.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use log::info;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex as TokioMutex;

use crate::channel::{Channel, MembershipOp};
use crate::line_io::LineReader;
use crate::protocol;
use crate::registry::{self, Registry};
use crate::time::now_secs;

/// A session's position in its channel, mirrored from `Channel`'s
/// membership lists: a session is in at most one of `connected`/`queue`
/// at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Queue,
    Connected,
    Disconnected,
}

impl From<u8> for Status {
    fn from(value: u8) -> Self {
        match value {
            0 => Status::Queue,
            1 => Status::Connected,
            _ => Status::Disconnected,
        }
    }
}

/// AFK window: a CONNECTED session idle this long is timed out.
const AFK_TIMEOUT_SECS: i64 = 100;
/// How often the watchdog re-checks activity while the session is CONNECTED.
const AFK_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Maximum bytes the mediated file transfer moves in a single chunk.
pub const TRANSFER_BUFFER_SIZE: usize = 2048;

/// Server-side state for one connected client.
pub struct Session {
    pub name: String,
    socket: Arc<TcpStream>,
    write_lock: TokioMutex<()>,
    channel: StdMutex<Arc<Channel>>,
    status: AtomicU8,
    muted_until: AtomicI64,
    last_activity: AtomicI64,
    kicked: AtomicBool,
}

impl Session {
    pub fn new(name: String, socket: Arc<TcpStream>, channel: Arc<Channel>) -> Arc<Session> {
        Arc::new(Session {
            name,
            socket,
            write_lock: TokioMutex::new(()),
            channel: StdMutex::new(channel),
            status: AtomicU8::new(Status::Queue as u8),
            muted_until: AtomicI64::new(0),
            last_activity: AtomicI64::new(now_secs()),
            kicked: AtomicBool::new(false),
        })
    }

    pub fn status(&self) -> Status {
        Status::from(self.status.load(Ordering::SeqCst))
    }

    pub fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    pub fn mark_kicked(&self) {
        self.kicked.store(true, Ordering::SeqCst);
    }

    pub fn is_kicked(&self) -> bool {
        self.kicked.load(Ordering::SeqCst)
    }

    pub fn touch_activity(&self) {
        self.last_activity.store(now_secs(), Ordering::SeqCst);
    }

    fn idle_for(&self) -> i64 {
        now_secs() - self.last_activity.load(Ordering::SeqCst)
    }

    pub fn set_muted_until(&self, until: i64) {
        self.muted_until.store(until, Ordering::SeqCst);
    }

    pub fn clear_mute(&self) {
        self.muted_until.store(0, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.muted_until.load(Ordering::SeqCst) > now_secs()
    }

    /// Seconds remaining on the current mute, rounded down, never negative.
    pub fn muted_remaining(&self) -> i64 {
        let until = self.muted_until.load(Ordering::SeqCst);
        if until == 0 {
            0
        } else {
            (until - now_secs()).max(0)
        }
    }

    pub fn current_channel(&self) -> Arc<Channel> {
        self.channel.lock().unwrap().clone()
    }

    pub fn set_channel(&self, channel: Arc<Channel>) {
        *self.channel.lock().unwrap() = channel;
    }

    /// Force-closes the underlying socket from outside the session's own
    /// task (kick, empty, shutdown, AFK timeout all call this).
    pub async fn close(&self) -> io::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut socket = &*self.socket;
        socket.shutdown().await
    }

    async fn write_locked(&self, data: &[u8]) -> io::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut socket = &*self.socket;
        socket.write_all(data).await?;
        socket.flush().await
    }

    /// Sends one newline-terminated line.
    pub async fn send_line(&self, text: &str) -> io::Result<()> {
        let mut buf = Vec::with_capacity(text.len() + 1);
        buf.extend_from_slice(text.as_bytes());
        buf.push(b'\n');
        self.write_locked(&buf).await
    }

    /// Sends a bare control token (`/send_ok`, `/send_bad_user`, `/sending
    /// <path>`) with no trailing newline, matching what the client compares
    /// for exact equality.
    pub async fn send_control(&self, text: &str) -> io::Result<()> {
        self.write_locked(text.as_bytes()).await
    }

    /// Sends an arbitrary byte payload verbatim (file contents, or a `/list`
    /// report that must not gain a trailing terminator).
    pub async fn send_raw(&self, data: &[u8]) -> io::Result<()> {
        self.write_locked(data).await
    }
}

/// Runs a session's receive loop until the connection ends, one way or
/// another. Spawned once per accepted (and admitted) connection.
pub async fn run_session(session: Arc<Session>, mut reader: LineReader, registry: Registry) {
    let watchdog = tokio::spawn(afk_watchdog(session.clone()));

    loop {
        if session.status() == Status::Disconnected {
            break;
        }

        let line = match reader.read_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => {
                randexit(&session).await;
                break;
            }
        };

        if line.is_empty() {
            randexit(&session).await;
            break;
        }

        let tokens: Vec<&str> = line.split(' ').collect();
        match tokens[0] {
            "/quit" => {
                let channel = session.current_channel();
                channel
                    .process_membership(MembershipOp::Remove, session.clone())
                    .await;
                session.set_status(Status::Disconnected);
                let _ = session.close().await;
                break;
            }
            "/whisper" => handle_whisper(&session, &tokens).await,
            "/list" => handle_list(&session, &registry).await,
            "/switch" => handle_switch(&session, &tokens, &registry).await,
            "/send" => handle_send(&session, &tokens, &mut reader).await,
            _ => handle_message(&session, &line).await,
        }

        if !session.is_muted() {
            session.touch_activity();
        }
    }

    watchdog.abort();
}

async fn randexit(session: &Arc<Session>) {
    let channel = session.current_channel();
    channel
        .process_membership(MembershipOp::RandExit, session.clone())
        .await;
    session.set_status(Status::Disconnected);
    let _ = session.close().await;
}

async fn handle_whisper(session: &Arc<Session>, tokens: &[&str]) {
    if session.status() != Status::Connected {
        return;
    }

    if session.is_muted() {
        send_mute_notice(session).await;
        return;
    }

    if tokens.len() < 2 {
        let _ = session
            .send_line(&protocol::server_message(" is not here."))
            .await;
        return;
    }

    let target_name = tokens[1];
    let text = tokens.get(2..).map(|rest| rest.join(" ")).unwrap_or_default();

    let channel = session.current_channel();
    match channel.find_connected(target_name).await {
        Some(target) => {
            let _ = target
                .send_line(&protocol::whisper_message(&session.name, &text))
                .await;
            info!(
                "{} whispers to {}: {}",
                session.name, target_name, text
            );
        }
        None => {
            let _ = session
                .send_line(&protocol::server_message(format!("{target_name} is not here.")))
                .await;
        }
    }
}

async fn handle_list(session: &Arc<Session>, registry: &Registry) {
    let report = registry::list_report(registry).await;
    let _ = session.send_raw(report.as_bytes()).await;
}

async fn handle_switch(session: &Arc<Session>, tokens: &[&str], registry: &Registry) {
    if tokens.len() != 2 {
        let _ = session
            .send_line(&protocol::server_message(" does not exist."))
            .await;
        return;
    }

    let target_name = tokens[1];
    match registry::find_channel(registry, target_name) {
        Some(target) => {
            if target.name_exists(&session.name).await {
                let _ = session
                    .send_line(&protocol::server_message(format!(
                        "Cannot switch to the {target_name} channel."
                    )))
                    .await;
            } else {
                let current = session.current_channel();
                current
                    .process_membership(MembershipOp::Remove, session.clone())
                    .await;
                target
                    .process_membership(MembershipOp::Add, session.clone())
                    .await;
                session.set_channel(target);
            }
        }
        None => {
            let _ = session
                .send_line(&protocol::server_message(format!("{target_name} does not exist.")))
                .await;
        }
    }
}

async fn handle_send(session: &Arc<Session>, tokens: &[&str], reader: &mut LineReader) {
    if session.status() != Status::Connected {
        return;
    }
    if tokens.len() < 3 {
        return;
    }

    let target_name = tokens[1];
    let path = tokens[2];
    let channel = session.current_channel();

    match channel.find_connected(target_name).await {
        Some(target) => {
            let _ = session.send_control("/send_ok").await;

            let payload = match reader.read_payload(TRANSFER_BUFFER_SIZE).await {
                Ok(payload) => payload,
                Err(_) => return,
            };

            if payload.as_slice() == b"/bad_path" {
                return;
            }

            let _ = target.send_control(&format!("/sending {path}")).await;
            let _ = target.send_raw(&payload).await;
            info!("{} sent {} to {}.", session.name, path, target.name);
        }
        None => {
            let _ = session.send_control("/send_bad_user").await;
        }
    }
}

async fn handle_message(session: &Arc<Session>, line: &str) {
    if session.status() != Status::Connected {
        return;
    }

    if session.is_muted() {
        send_mute_notice(session).await;
        return;
    }

    let channel = session.current_channel();
    let text = protocol::user_message(&session.name, line);
    channel.broadcast_public(&text).await;
    info!("{text}");
}

async fn send_mute_notice(session: &Arc<Session>) {
    let secs = session.muted_remaining();
    let _ = session
        .send_line(&protocol::server_message(format!(
            "You are still muted for {secs} seconds."
        )))
        .await;
}

async fn afk_watchdog(session: Arc<Session>) {
    loop {
        tokio::time::sleep(AFK_POLL_INTERVAL).await;
        match session.status() {
            Status::Disconnected => break,
            Status::Queue => continue,
            Status::Connected => {
                if session.idle_for() >= AFK_TIMEOUT_SECS {
                    let channel = session.current_channel();
                    channel
                        .process_membership(MembershipOp::Timeout, session.clone())
                        .await;
                    session.set_status(Status::Disconnected);
                    let _ = session.close().await;
                    break;
                }
            }
        }
    }
}

/// Mutes `session` for `seconds`, notifying it immediately and spawning a
/// best-effort task that clears the mute once the window elapses. The mute
/// is also checked (and treated as expired) on every message via
/// `muted_until`, so the background task is a convenience, not the source
/// of truth.
pub async fn mute_for(session: Arc<Session>, seconds: i64) {
    session.set_muted_until(now_secs() + seconds);
    let _ = session
        .send_line(&protocol::server_message(format!(
            "You have been muted for {seconds} seconds."
        )))
        .await;
    info!("Muted {} for {} seconds.", session.name, seconds);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(seconds.max(0) as u64)).await;
        session.clear_mute();
    });
}

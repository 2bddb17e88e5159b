//! End-to-end tests against real sockets: capacity queueing and promotion,
//! whispering, muting, channel-switch collisions, file transfer, and admin
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use linechat::channel::Channel;
use linechat::registry::Registry;
use linechat::session;

async fn start_channel(name: &str, capacity: usize) -> (Arc<Channel>, Registry, u16) {
    let channel = Channel::new(name.to_string(), 0, capacity);
    let registry: Registry = Arc::new(vec![channel.clone()]);
    let port = channel.clone().start(registry.clone()).await.unwrap();
    (channel, registry, port)
}

async fn connect_as(port: u16, username: &str) -> TcpStream {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream
        .write_all(format!("{username}\n").as_bytes())
        .await
        .unwrap();
    stream
}

/// Reads one `\n`-terminated line, panicking on EOF — good enough for tests
/// that know exactly how many lines to expect.
async fn read_line(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await.unwrap();
        assert!(n > 0, "connection closed before a line arrived");
        if byte[0] == b'\n' {
            break;
        }
        buf.push(byte[0]);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[tokio::test]
async fn capacity_queue_then_promotion_on_quit() {
    let (_channel, registry, port) = start_channel("common", 1).await;

    let mut alice = connect_as(port, "alice").await;
    read_line(&mut alice).await; // welcome
    assert!(read_line(&mut alice).await.contains("alice has joined"));

    let mut bob = connect_as(port, "bob").await;
    read_line(&mut bob).await; // welcome
    assert!(read_line(&mut bob).await.contains("0 user(s) ahead of you"));

    alice.write_all(b"/quit\n").await.unwrap();

    let bob_welcome = read_line(&mut bob).await;
    assert!(bob_welcome.contains("Welcome to the common channel"));
    let bob_join = read_line(&mut bob).await;
    assert!(bob_join.contains("bob has joined"));

    drop(registry);
}

#[tokio::test]
async fn whisper_reaches_only_the_named_recipient() {
    let (_channel, _registry, port) = start_channel("common", 5).await;

    let mut alice = connect_as(port, "alice").await;
    read_line(&mut alice).await; // welcome
    read_line(&mut alice).await; // own join
    let mut bob = connect_as(port, "bob").await;
    read_line(&mut bob).await; // welcome
    read_line(&mut bob).await; // own join
    read_line(&mut alice).await; // alice sees bob's join broadcast

    alice
        .write_all(b"/whisper bob hello there\n")
        .await
        .unwrap();

    let received = read_line(&mut bob).await;
    assert!(received.contains("whispers to you"));
    assert!(received.contains("hello there"));
}

#[tokio::test]
async fn muted_user_gets_a_notice_instead_of_a_broadcast() {
    let (channel, _registry, port) = start_channel("common", 5).await;

    let mut alice = connect_as(port, "alice").await;
    read_line(&mut alice).await; // welcome
    read_line(&mut alice).await; // own join

    let target = channel.find_connected("alice").await.unwrap();
    session::mute_for(target, 30).await;
    let _ = read_line(&mut alice).await; // the mute notice itself

    alice.write_all(b"hello everyone\n").await.unwrap();
    let reply = read_line(&mut alice).await;
    assert!(reply.contains("still muted"));
}

#[tokio::test]
async fn switch_is_refused_when_the_name_is_already_taken_there() {
    let channel_a = Channel::new("alpha".to_string(), 0, 5);
    let channel_b = Channel::new("beta".to_string(), 0, 5);
    let registry: Registry = Arc::new(vec![channel_a.clone(), channel_b.clone()]);

    let port_a = channel_a.clone().start(registry.clone()).await.unwrap();
    let port_b = channel_b.clone().start(registry.clone()).await.unwrap();

    let mut alice_in_a = connect_as(port_a, "alice").await;
    read_line(&mut alice_in_a).await; // welcome
    read_line(&mut alice_in_a).await; // own join
    let mut alice_in_b = connect_as(port_b, "alice").await;
    read_line(&mut alice_in_b).await; // welcome
    read_line(&mut alice_in_b).await; // own join

    alice_in_a.write_all(b"/switch beta\n").await.unwrap();
    let reply = read_line(&mut alice_in_a).await;
    assert!(reply.contains("Cannot switch"));
}

#[tokio::test]
async fn file_transfer_control_tokens_and_payload_are_relayed() {
    let (_channel, _registry, port) = start_channel("common", 5).await;

    let mut alice = connect_as(port, "alice").await;
    read_line(&mut alice).await; // welcome
    read_line(&mut alice).await; // own join
    let mut bob = connect_as(port, "bob").await;
    read_line(&mut bob).await; // welcome
    read_line(&mut bob).await; // own join
    read_line(&mut alice).await; // alice sees bob's join broadcast

    alice
        .write_all(b"/send bob notes.txt\n")
        .await
        .unwrap();

    let mut ack = [0u8; 8];
    alice.read_exact(&mut ack).await.unwrap();
    assert_eq!(&ack, b"/send_ok");

    alice.write_all(b"hello from a file").await.unwrap();

    let mut header = [0u8; "/sending notes.txt".len()];
    bob.read_exact(&mut header).await.unwrap();
    assert_eq!(&header, b"/sending notes.txt");

    let mut payload = [0u8; "hello from a file".len()];
    bob.read_exact(&mut payload).await.unwrap();
    assert_eq!(&payload, b"hello from a file");
}

#[tokio::test]
async fn admin_shutdown_closes_sessions_and_stops_accepting() {
    let (channel, _registry, port) = start_channel("common", 5).await;

    let mut alice = connect_as(port, "alice").await;
    read_line(&mut alice).await; // welcome
    read_line(&mut alice).await; // own join

    channel.shutdown().await;

    let mut buf = [0u8; 8];
    let n = alice.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "session socket should be closed by shutdown");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
}

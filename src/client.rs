//! The line-oriented client: one task reads stdin and writes commands to
//! the server, another reads the server's raw output and prints it
//! verbatim.
//!
//! The server frames its outbound protocol as whole lines except for three
//! control tokens used by the file-transfer handshake (`/send_ok`,
//! `/send_bad_user`, `/sending <path>`) and the `/list` report, which omits
//! a trailing newline after its last line. A strictly line-buffered reader
//! would stall forever waiting for that missing terminator, so this client
//! reads whatever raw chunk arrives and compares it for exact equality
//! against the control tokens before falling back to printing it as text.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};

use crate::session::TRANSFER_BUFFER_SIZE;

/// Outcome of a `/send` handshake, reported back to `send_loop` by
/// `receive_loop` once the server's control token arrives.
type PendingSend = Arc<Mutex<Option<oneshot::Sender<bool>>>>;

/// Connects to `host:port`, announces `username`, and runs the client
/// until the server closes the connection or the user sends `/quit`.
pub async fn run(host: &str, port: u16, username: &str) -> anyhow::Result<()> {
    let stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("could not connect to {host}:{port}"))?;
    let socket = Arc::new(stream);

    {
        let mut welcome = &*socket;
        welcome
            .write_all(format!("{username}\n").as_bytes())
            .await
            .context("failed to send username")?;
    }

    let pending: PendingSend = Arc::new(Mutex::new(None));

    let recv_socket = socket.clone();
    let recv_pending = pending.clone();
    let receiver = tokio::spawn(async move {
        receive_loop(recv_socket, recv_pending).await;
    });

    send_loop(socket, pending).await?;
    receiver.abort();
    Ok(())
}

async fn send_loop(socket: Arc<TcpStream>, pending: PendingSend) -> anyhow::Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = stdin.next_line().await.context("failed to read stdin")? {
        let tokens: Vec<&str> = line.split(' ').collect();

        if tokens.first() == Some(&"/send") && tokens.len() >= 3 {
            send_file(&socket, &pending, &line, tokens[1], tokens[2]).await?;
        } else {
            let mut out = &*socket;
            out.write_all(line.as_bytes()).await?;
            out.write_all(b"\n").await?;
        }

        if line.trim() == "/quit" {
            break;
        }
    }

    Ok(())
}

async fn send_file(
    socket: &Arc<TcpStream>,
    pending: &PendingSend,
    command_line: &str,
    target: &str,
    path: &str,
) -> anyhow::Result<()> {
    let (tx, rx) = oneshot::channel();
    *pending.lock().await = Some(tx);

    {
        let mut out = &**socket;
        out.write_all(command_line.as_bytes()).await?;
        out.write_all(b"\n").await?;
    }

    match rx.await {
        Ok(true) => match tokio::fs::read(path).await {
            Ok(contents) => {
                let mut out = &**socket;
                out.write_all(&contents[..contents.len().min(TRANSFER_BUFFER_SIZE)])
                    .await?;
            }
            Err(_) => {
                let mut out = &**socket;
                out.write_all(b"/bad_path").await?;
                println!("{path} does not exist.");
            }
        },
        Ok(false) => {
            println!("{target} is not here.");
            // Still attempt the local open so a bad path is reported even
            // though the server already refused the transfer.
            let _ = tokio::fs::File::open(path).await;
        }
        Err(_) => println!("Lost connection while sending {path}."),
    }

    Ok(())
}

async fn receive_loop(socket: Arc<TcpStream>, pending: PendingSend) {
    let mut buf = vec![0u8; TRANSFER_BUFFER_SIZE];

    loop {
        let mut reader = &*socket;
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => {
                println!("Disconnected from server.");
                return;
            }
            Ok(n) => n,
        };

        let chunk = &buf[..n];

        if chunk == b"/send_ok" {
            if let Some(tx) = pending.lock().await.take() {
                let _ = tx.send(true);
            }
            continue;
        }

        if chunk == b"/send_bad_user" {
            if let Some(tx) = pending.lock().await.take() {
                let _ = tx.send(false);
            }
            continue;
        }

        let text = String::from_utf8_lossy(chunk);
        if let Some(path) = text.strip_prefix("/sending ") {
            let path = path.trim().to_string();
            println!("Receiving {path}...");
            if let Err(err) = receive_file(&socket, &path).await {
                println!("Failed to save {path}: {err}");
            }
            continue;
        }

        print!("{text}");
        use std::io::Write as _;
        let _ = std::io::stdout().flush();
    }
}

async fn receive_file(socket: &Arc<TcpStream>, path: &str) -> anyhow::Result<()> {
    let mut buf = vec![0u8; TRANSFER_BUFFER_SIZE];
    let mut reader = &**socket;
    let n = reader.read(&mut buf).await?;
    tokio::fs::write(path, &buf[..n]).await?;
    println!("Saved {path}.");
    Ok(())
}

//! One task per accepted connection.
//!
//! The handshake runs synchronously on the accepting task: only LOGIN and
//! REGISTER are honoured until a login succeeds. After that the socket is
//! split: a writer task drains this session's registry channel while the
//! read loop decodes frames and hands them to the router. Every exit path
//! unregisters the session and releases the socket.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{info, warn};

use samovar_proto::{ClientFrame, ServerFrame};
use samovar_store::StorageError;
use samovar_types::events::ServerEvent;

use crate::{Context, auth, router};

/// Attachments above this size are refused; the connection is closed
/// rather than draining an unbounded body.
const MAX_ATTACHMENT_BYTES: u64 = 64 * 1024 * 1024;

/// How long a closing connection waits for its writer task to flush
/// queued frames before the socket is dropped anyway.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, ctx: Context) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = write_half;

    let username = match authenticate(&mut reader, &mut writer, &ctx, addr).await {
        Some(username) => username,
        None => return,
    };

    let (conn_id, mut rx) = ctx.registry.register(&username).await;
    ctx.registry
        .broadcast(
            ServerFrame::Event(ServerEvent::UserOnline {
                user: username.clone(),
            }),
            None,
        )
        .await;
    info!("{username} logged in from {addr}");

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write_frame(&mut writer, &frame).await.is_err() {
                break;
            }
        }
    });

    let recv = read_loop(&mut reader, &ctx, &username);
    let writer_done = tokio::select! {
        // Writer gone: evicted by a newer login, or the peer stopped
        // accepting writes. Dropping the read half closes the socket.
        _ = &mut send_task => true,
        _ = recv => false,
    };

    // Only the session's current owner announces the offline transition;
    // an evicted connection must not tear down its successor.
    let owner = ctx.registry.unregister(&username, conn_id).await;

    if !writer_done {
        // Unregistering dropped this session's sender, so the writer task
        // exits once it has flushed whatever is still queued (a final
        // error event, say). A stalled peer delays the close, never
        // prevents it.
        let _ = tokio::time::timeout(DRAIN_TIMEOUT, &mut send_task).await;
        send_task.abort();
    }

    if owner {
        ctx.registry
            .broadcast(
                ServerFrame::Event(ServerEvent::UserOffline {
                    user: username.clone(),
                }),
                None,
            )
            .await;
    }
    info!("{username} disconnected ({addr})");
}

/// Handshake: loops until a LOGIN succeeds or the peer goes away.
/// Bad credentials are fatal (FAIL, then close); everything else is
/// reported and survived.
async fn authenticate(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    ctx: &Context,
    addr: SocketAddr,
) -> Option<String> {
    loop {
        let line = read_line(reader).await?;
        match ClientFrame::decode(&line) {
            Ok(ClientFrame::Login { username, password }) => {
                let valid = match ctx.store.user(&username) {
                    Ok(Some(user)) => auth::verify_password(&password, &user.password),
                    Ok(None) => false,
                    Err(e) => {
                        warn!("store failure during login from {addr}: {e}");
                        false
                    }
                };
                if valid {
                    write_frame(writer, &ServerFrame::Ok).await.ok()?;
                    return Some(username);
                }
                warn!("failed login for {username:?} from {addr}");
                let _ = write_frame(writer, &ServerFrame::Fail).await;
                return None;
            }
            Ok(ClientFrame::Register { username, password }) => {
                match register_user(ctx, &username, &password) {
                    Ok(()) => {
                        info!("registered {username} from {addr}");
                        write_frame(writer, &ServerFrame::Ok).await.ok()?;
                    }
                    Err(reason) => {
                        write_error(writer, &reason).await.ok()?;
                    }
                }
            }
            Ok(_) => {
                write_error(writer, "authentication required").await.ok()?;
            }
            Err(e) => {
                warn!("protocol error during handshake from {addr}: {e}");
                write_error(writer, &e.to_string()).await.ok()?;
            }
        }
    }
}

fn register_user(ctx: &Context, username: &str, password: &str) -> Result<(), String> {
    if username.is_empty() || password.is_empty() {
        return Err("username and password must not be empty".into());
    }
    let hash = auth::hash_password(password).map_err(|e| e.to_string())?;
    match ctx.store.create_user(username, &hash) {
        Ok(()) => Ok(()),
        Err(StorageError::UsernameTaken(_)) => Err("username taken".into()),
        Err(e) => Err(format!("storage failure: {e}")),
    }
}

async fn read_loop(reader: &mut BufReader<OwnedReadHalf>, ctx: &Context, username: &str) {
    loop {
        let Some(line) = read_line(reader).await else {
            return;
        };
        match ClientFrame::decode(&line) {
            Ok(ClientFrame::File { filename, size }) => {
                if size > MAX_ATTACHMENT_BYTES {
                    router::send_error(ctx, username, "attachment too large").await;
                    return;
                }
                let mut data = vec![0u8; size as usize];
                if reader.read_exact(&mut data).await.is_err() {
                    return;
                }
                router::handle_file(ctx, username, &filename, &data).await;
            }
            Ok(frame) => router::dispatch(ctx, username, frame).await,
            Err(e) => {
                // Malformed frames are dropped, never fatal.
                warn!("protocol error from {username}: {e}");
                router::send_error(ctx, username, &e.to_string()).await;
            }
        }
    }
}

/// Read one newline-terminated frame. None on EOF or I/O error.
async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Option<String> {
    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &ServerFrame) -> std::io::Result<()> {
    let mut line = frame.encode();
    line.push('\n');
    writer.write_all(line.as_bytes()).await
}

async fn write_error(writer: &mut OwnedWriteHalf, error: &str) -> std::io::Result<()> {
    write_frame(
        writer,
        &ServerFrame::Event(ServerEvent::Error {
            error: error.to_string(),
        }),
    )
    .await
}

//! TCP connection management.
//!
//! One task per accepted connection. Admission control runs before any
//! session state is allocated: when the registry is full the socket gets
//! a busy notice and is closed without ever being registered. Each
//! connection's reads are wrapped in the inactivity window, so the idle
//! watchdog resets on every inbound byte and fires at most once, funneling
//! into the same cleanup path as a normal close.
//!
//! NIST 800-53: AC-10 (Concurrent Session Control), AC-12 (Session Termination)

use crate::auth::AuthGate;
use crate::command::{self, Command};
use crate::config::ServerConfig;
use crate::session::{Session, SessionHandle};
use crate::stats::StatsAggregator;
use crate::store::FileStore;
use bytes::{Buf, BytesMut};
use chrono::Utc;
use stash_core::protocol::{INACTIVITY_CLOSING, NOT_AUTHENTICATED, SERVER_BUSY};
use stash_core::{Result, StashError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::WriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::{Duration, timeout};
use tracing::{debug, error, info, warn};

/// Shared server state handed to every connection task.
pub struct ServerState {
    pub config: ServerConfig,
    pub store: FileStore,
    pub gate: AuthGate,
    pub stats: StatsAggregator,
    registry: Mutex<HashMap<u64, Arc<SessionHandle>>>,
    next_id: AtomicU64,
    message_log: Mutex<tokio::fs::File>,
}

impl ServerState {
    /// Handles of all currently registered sessions.
    pub async fn live_sessions(&self) -> Vec<Arc<SessionHandle>> {
        self.registry.lock().await.values().cloned().collect()
    }

    /// Append one chat line to the append-only message log.
    pub async fn append_message(&self, username: &str, line: &str) -> Result<()> {
        let entry = format!("[{}] {}: {}\n", Utc::now().to_rfc3339(), username, line);
        let mut log = self.message_log.lock().await;
        log.write_all(entry.as_bytes()).await?;
        Ok(())
    }
}

/// The Stash TCP server.
pub struct Server {
    state: Arc<ServerState>,
    listener: TcpListener,
}

impl Server {
    /// Validate the configuration, open the message log, and bind the
    /// listening socket.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let message_log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.message_log)
            .await
            .map_err(|e| {
                StashError::Config(format!(
                    "Failed to open message log {:?}: {}",
                    config.message_log, e
                ))
            })?;

        let addr = format!("{}:{}", config.bind_address, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| StashError::Connection(format!("Failed to bind {}: {}", addr, e)))?;

        let state = Arc::new(ServerState {
            store: FileStore::new(config.root_dir.clone()),
            gate: AuthGate::new(config.users.clone()),
            stats: StatsAggregator::new(),
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            message_log: Mutex::new(message_log),
            config,
        });

        Ok(Self { state, listener })
    }

    /// The address the server is actually listening on. Useful when bound
    /// to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop.
    pub async fn run(self) -> Result<()> {
        info!(
            "Stash server listening on {} (root: {:?}, max {} connections)",
            self.listener.local_addr()?,
            self.state.store.root(),
            self.state.config.max_connections
        );

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    continue;
                }
            };

            // Admission control: check and register under one lock, before
            // any session state exists for the socket.
            let handle = {
                let mut registry = self.state.registry.lock().await;
                if registry.len() >= self.state.config.max_connections {
                    warn!(
                        "Rejecting connection from {}: {} active connections (limit {})",
                        peer,
                        registry.len(),
                        self.state.config.max_connections
                    );
                    tokio::spawn(reject_busy(stream, peer));
                    continue;
                }
                let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
                let handle = Arc::new(SessionHandle::new(id, peer));
                registry.insert(id, handle.clone());
                handle
            };

            info!("Accepted connection {} from {}", handle.id, peer);
            let state = self.state.clone();
            tokio::spawn(async move {
                let id = handle.id;
                let session = Session::new(handle);
                if let Err(e) = handle_connection(state.clone(), stream, session).await {
                    warn!("Connection {} ended with error: {}", id, e);
                }
                cleanup(&state, id).await;
            });
        }
    }
}

/// Write the busy notice and close the socket; the connection was never
/// registered.
async fn reject_busy(mut stream: TcpStream, peer: SocketAddr) {
    if let Err(e) = stream.write_all(format!("{}\n", SERVER_BUSY).as_bytes()).await {
        debug!("Failed to send busy notice to {}: {}", peer, e);
    }
    let _ = stream.shutdown().await;
}

/// Deregister the session and persist its counters. Runs exactly once per
/// connection, whether it ended by close, error, or inactivity.
async fn cleanup(state: &ServerState, id: u64) {
    let handle = state.registry.lock().await.remove(&id);
    let Some(handle) = handle else { return };

    if let Some(username) = handle.username().await {
        state.stats.flush_session(&username, &handle).await;
    }
    info!("Connection {} from {} closed", handle.id, handle.peer);
}

/// Drive one connection: reads wrapped in the inactivity window, bytes
/// routed to the upload accumulator or the line splitter depending on the
/// session phase.
async fn handle_connection(
    state: Arc<ServerState>,
    mut stream: TcpStream,
    mut session: Session,
) -> Result<()> {
    let idle_window = Duration::from_millis(state.config.inactivity_timeout_ms);
    let (mut reader, mut writer) = stream.split();

    let mut inbound = BytesMut::with_capacity(8 * 1024);
    let mut chunk = [0u8; 4 * 1024];

    loop {
        let n = match timeout(idle_window, reader.read(&mut chunk)).await {
            Err(_) => {
                warn!(
                    "Evicting connection {} from {} after {}ms of inactivity",
                    session.handle.id, session.handle.peer, state.config.inactivity_timeout_ms
                );
                send_line(&state, &mut session, &mut writer, INACTIVITY_CLOSING).await?;
                break;
            }
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!("Read error on connection {}: {}", session.handle.id, e);
                break;
            }
        };

        session.handle.touch();
        session
            .handle
            .bytes_received
            .fetch_add(n as u64, Ordering::Relaxed);
        session
            .handle
            .messages_received
            .fetch_add(1, Ordering::Relaxed);
        state.stats.add_received(n as u64);

        inbound.extend_from_slice(&chunk[..n]);
        drain_inbound(&state, &mut session, &mut writer, &mut inbound).await?;
    }

    let _ = writer.shutdown().await;
    Ok(())
}

/// Consume buffered inbound bytes: verbatim into the upload accumulator
/// while an upload is in flight, otherwise split into CR/LF-tolerant lines.
async fn drain_inbound(
    state: &ServerState,
    session: &mut Session,
    writer: &mut WriteHalf<'_>,
    inbound: &mut BytesMut,
) -> Result<()> {
    loop {
        if session.awaiting_upload() {
            if inbound.is_empty() {
                return Ok(());
            }
            let raw = inbound.split();
            handle_upload_chunk(state, session, writer, &raw).await?;
            continue;
        }

        let Some(line) = next_line(inbound) else {
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        handle_line(state, session, writer, line).await?;
    }
}

/// Extract the next complete line from the buffer, tolerating both LF and
/// CRLF terminators. Returns `None` while the buffer holds only a partial
/// line.
fn next_line(inbound: &mut BytesMut) -> Option<String> {
    let at = inbound.iter().position(|&b| b == b'\n')?;
    let line = inbound.split_to(at);
    inbound.advance(1); // the newline itself
    Some(String::from_utf8_lossy(&line).to_string())
}

/// Route one complete line through the auth gate or the command
/// dispatcher depending on the session phase.
async fn handle_line(
    state: &ServerState,
    session: &mut Session,
    writer: &mut WriteHalf<'_>,
    line: &str,
) -> Result<()> {
    if !session.is_authenticated() {
        let reply = match state.gate.authenticate(line) {
            Ok(info) => {
                // Merge counters persisted from this user's previous
                // sessions, so the new session resumes where it left off.
                if let Some(prev) = state.stats.counters_for(&info.username).await {
                    let handle = &session.handle;
                    handle
                        .bytes_received
                        .fetch_add(prev.bytes_received, Ordering::Relaxed);
                    handle.bytes_sent.fetch_add(prev.bytes_sent, Ordering::Relaxed);
                    handle
                        .messages_received
                        .fetch_add(prev.messages_received, Ordering::Relaxed);
                }
                let welcome = format!("AUTH_OK Welcome {}. Role={}", info.username, info.role);
                session.authenticate(info).await?;
                welcome
            }
            Err(StashError::Authentication(reason)) => format!("AUTH_FAIL {}", reason),
            Err(_) => NOT_AUTHENTICATED.to_string(),
        };
        return send_line(state, session, writer, &reply).await;
    }

    let reply = match Command::parse(line) {
        Ok(cmd) => match command::dispatch(state, session, cmd).await {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_security_event() {
                    warn!(
                        "Security event on connection {} ({}): {}",
                        session.handle.id, session.handle.peer, e
                    );
                } else {
                    debug!("Command failed on connection {}: {}", session.handle.id, e);
                }
                format!("ERROR {}", e.client_message())
            }
        },
        Err(e) => format!("ERROR {}", e.client_message()),
    };
    send_line(state, session, writer, &reply).await
}

/// Feed one raw chunk to the in-flight upload; on completion write the
/// payload to the store and report the outcome. Upload state is cleared
/// regardless of outcome.
async fn handle_upload_chunk(
    state: &ServerState,
    session: &mut Session,
    writer: &mut WriteHalf<'_>,
    chunk: &[u8],
) -> Result<()> {
    match session.push_upload_chunk(chunk) {
        Ok(None) => Ok(()),
        Ok(Some((target, payload))) => {
            let reply = match state.store.write(&target, &payload).await {
                Ok(()) => {
                    info!(
                        "Connection {} uploaded {} bytes to '{}'",
                        session.handle.id,
                        payload.len(),
                        target
                    );
                    format!("UPLOAD_OK {}", target)
                }
                Err(e) => {
                    warn!("Upload to '{}' failed: {}", target, e);
                    format!("ERROR Upload failed: {}", e.client_message())
                }
            };
            send_line(state, session, writer, &reply).await
        }
        Err(e) => {
            warn!(
                "Upload aborted on connection {}: {}",
                session.handle.id, e
            );
            let reply = format!("ERROR Upload failed: {}", e.client_message());
            send_line(state, session, writer, &reply).await
        }
    }
}

/// Write a newline-terminated reply, counting the bytes on the session and
/// the global totals together with the write itself.
async fn send_line(
    state: &ServerState,
    session: &mut Session,
    writer: &mut WriteHalf<'_>,
    text: &str,
) -> Result<()> {
    let framed = format!("{}\n", text);
    writer.write_all(framed.as_bytes()).await?;
    session
        .handle
        .bytes_sent
        .fetch_add(framed.len() as u64, Ordering::Relaxed);
    state.stats.add_sent(framed.len() as u64);
    Ok(())
}

//! # NATS Wire Client
//!
//! Plain-text NATS protocol over TCP:
//!
//! ```text
//! S: INFO {...}
//! C: CONNECT {...}
//! C: SUB <subject> [queue group] <sid>
//! C: PUB <subject> [reply-to] <#bytes>\r\n<payload>
//! S: MSG <subject> <sid> [reply-to] <#bytes>\r\n<payload>
//! S: PING            C: PONG
//! ```
//!
//! One background task owns the read half of the socket. When the socket
//! drops it cycles through the configured servers with a fixed backoff,
//! forever, and replays every subscription on the new connection.
//!
//! TLS is negotiated by an external provider; this client only speaks
//! plain TCP and refuses a configured TLS context.

use super::{ConnectOptions, ConnectionState, Frame, StatsTracker, Transport, TransportStats};
use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Operations a server sends to a client
#[derive(Debug, Clone, PartialEq)]
enum ServerOp {
    Info,
    Msg {
        subject: String,
        reply_to: Option<String>,
        size: usize,
    },
    Ping,
    Pong,
    Ok,
    Err(String),
    Unknown(String),
}

fn parse_server_op(line: &str) -> Result<ServerOp> {
    let line = line.trim_end();
    let mut parts = line.split_whitespace();

    let op = match parts.next() {
        Some(op) => op.to_ascii_uppercase(),
        None => return Ok(ServerOp::Unknown(String::new())),
    };

    match op.as_str() {
        "MSG" => {
            let args: Vec<&str> = parts.collect();
            let (subject, reply_to, size) = match args.as_slice() {
                [subject, _sid, size] => (subject, None, size),
                [subject, _sid, reply_to, size] => (subject, Some(reply_to.to_string()), size),
                _ => {
                    return Err(TransportError::protocol(format!(
                        "malformed MSG header: {}",
                        line
                    )))
                }
            };
            let size = size.parse::<usize>().map_err(|_| {
                TransportError::protocol(format!("invalid MSG payload size: {}", line))
            })?;
            Ok(ServerOp::Msg {
                subject: subject.to_string(),
                reply_to,
                size,
            })
        }
        "PING" => Ok(ServerOp::Ping),
        "PONG" => Ok(ServerOp::Pong),
        "+OK" => Ok(ServerOp::Ok),
        "INFO" => Ok(ServerOp::Info),
        "-ERR" => Ok(ServerOp::Err(
            line[4..].trim().trim_matches('\'').to_string(),
        )),
        _ => Ok(ServerOp::Unknown(line.to_string())),
    }
}

fn encode_pub(subject: &str, reply_to: Option<&str>, payload: &[u8]) -> Vec<u8> {
    let header = match reply_to {
        Some(reply_to) => format!("PUB {} {} {}\r\n", subject, reply_to, payload.len()),
        None => format!("PUB {} {}\r\n", subject, payload.len()),
    };
    let mut out = Vec::with_capacity(header.len() + payload.len() + 2);
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\r\n");
    out
}

fn encode_sub(subject: &str, queue_group: Option<&str>, sid: u64) -> String {
    match queue_group {
        Some(group) => format!("SUB {} {} {}\r\n", subject, group, sid),
        None => format!("SUB {} {}\r\n", subject, sid),
    }
}

fn connect_command(name: &str) -> String {
    let options = serde_json::json!({
        "verbose": false,
        "pedantic": false,
        "name": name,
        "lang": "rust",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": 1,
    });
    format!("CONNECT {}\r\n", options)
}

/// `nats://host:port` or bare `host:port` to a socket address string
fn server_address(server: &str) -> Result<String> {
    match server.split_once("://") {
        Some(("nats", address)) => Ok(address.to_string()),
        Some((scheme, _)) => Err(TransportError::configuration(
            format!("unsupported server scheme '{}' in {}", scheme, server),
            Some("servers"),
        )),
        None => Ok(server.to_string()),
    }
}

struct Subscription {
    sid: u64,
    subject: String,
    queue_group: Option<String>,
}

struct Shared {
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    subscriptions: Mutex<Vec<Subscription>>,
    next_sid: AtomicU64,
    state: Mutex<ConnectionState>,
    server: Mutex<Option<String>>,
    stats: StatsTracker,
    frames: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    async fn connect_any(&self, options: &ConnectOptions) -> Option<(BufReader<OwnedReadHalf>, String)> {
        for server in &options.servers {
            match self.connect_to(server, &options.name).await {
                Ok(reader) => return Some((reader, server.clone())),
                Err(e) => warn!(server = %server, error = %e, "Connection attempt failed"),
            }
        }
        None
    }

    async fn connect_to(&self, server: &str, name: &str) -> Result<BufReader<OwnedReadHalf>> {
        let address = server_address(server)?;
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&address))
            .await
            .map_err(|_| TransportError::connection("connect timed out", Some(server)))?
            .map_err(|e| TransportError::connection_with_source("connect failed", Some(server), e))?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        let mut line = String::new();
        reader.read_line(&mut line).await?;
        if parse_server_op(&line)? != ServerOp::Info {
            return Err(TransportError::protocol(format!(
                "expected INFO from {}, got {:?}",
                server,
                line.trim_end()
            )));
        }

        let mut handshake = connect_command(name).into_bytes();
        for sub in self.subscriptions.lock().iter() {
            handshake.extend_from_slice(
                encode_sub(&sub.subject, sub.queue_group.as_deref(), sub.sid).as_bytes(),
            );
        }
        write.write_all(&handshake).await?;

        *self.writer.lock().await = Some(write);
        Ok(reader)
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let stream = writer
            .as_mut()
            .ok_or_else(|| TransportError::not_connected("write"))?;

        if let Err(e) = stream.write_all(bytes).await {
            *writer = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Serve one connection; returns when it drops
    async fn read_loop(&self, mut reader: BufReader<OwnedReadHalf>) {
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    warn!("Server closed the connection");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Read failed");
                    return;
                }
            }

            match parse_server_op(&line) {
                Ok(ServerOp::Msg {
                    subject,
                    reply_to,
                    size,
                }) => {
                    let mut payload = vec![0u8; size + 2];
                    if let Err(e) = reader.read_exact(&mut payload).await {
                        warn!(error = %e, subject = %subject, "Truncated MSG payload");
                        return;
                    }
                    payload.truncate(size);
                    self.stats.record_in(size);

                    let sender = self.frames.lock().clone();
                    let Some(sender) = sender else { return };
                    let frame = Frame {
                        subject,
                        reply_to,
                        data: Bytes::from(payload),
                    };
                    if sender.send(frame).is_err() {
                        debug!("Frame receiver dropped, closing connection");
                        self.set_state(ConnectionState::Closed);
                        return;
                    }
                }
                Ok(ServerOp::Ping) => {
                    if let Err(e) = self.write(b"PONG\r\n").await {
                        warn!(error = %e, "Failed to answer PING");
                        return;
                    }
                }
                Ok(ServerOp::Err(message)) => warn!(error = %message, "Server reported an error"),
                Ok(ServerOp::Unknown(op)) => debug!(op = %op, "Ignoring unknown server operation"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Discarding malformed server line"),
            }
        }
    }

    /// Connection supervisor: read until the socket drops, then reconnect
    async fn run(self: Arc<Self>, options: ConnectOptions, mut reader: BufReader<OwnedReadHalf>) {
        loop {
            self.read_loop(reader).await;
            if self.state() == ConnectionState::Closed {
                return;
            }

            self.set_state(ConnectionState::Reconnecting);
            *self.writer.lock().await = None;
            *self.server.lock() = None;

            reader = loop {
                tokio::time::sleep(options.reconnect_wait).await;
                if self.state() == ConnectionState::Closed {
                    return;
                }
                if let Some((reader, server)) = self.connect_any(&options).await {
                    info!(server = %server, "Reconnected");
                    *self.server.lock() = Some(server);
                    self.set_state(ConnectionState::Connected);
                    self.stats.record_reconnect();
                    break reader;
                }
                warn!("No server reachable, retrying in {:?}", options.reconnect_wait);
            };
        }
    }
}

pub struct NatsTransport {
    shared: Arc<Shared>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl NatsTransport {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                writer: tokio::sync::Mutex::new(None),
                subscriptions: Mutex::new(Vec::new()),
                next_sid: AtomicU64::new(1),
                state: Mutex::new(ConnectionState::Disconnected),
                server: Mutex::new(None),
                stats: StatsTracker::default(),
                frames: Mutex::new(Some(sender)),
            }),
            receiver: tokio::sync::Mutex::new(receiver),
            supervisor: Mutex::new(None),
        }
    }
}

impl Default for NatsTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn start(&self, options: ConnectOptions) -> Result<()> {
        if options.tls.is_some() {
            return Err(TransportError::configuration(
                "TLS is not negotiated by the plain NATS client",
                Some("tls"),
            ));
        }
        if options.servers.is_empty() {
            return Err(TransportError::configuration(
                "no servers configured",
                Some("servers"),
            ));
        }
        for server in &options.servers {
            server_address(server)?;
        }

        match self.shared.state() {
            ConnectionState::Closed => return Err(TransportError::Closed),
            state if state.is_started() => return Ok(()),
            _ => {}
        }

        self.shared.set_state(ConnectionState::Connecting);
        let (reader, server) = loop {
            if let Some(connected) = self.shared.connect_any(&options).await {
                break connected;
            }
            warn!(
                servers = ?options.servers,
                "No server reachable, retrying in {:?}",
                options.reconnect_wait
            );
            tokio::time::sleep(options.reconnect_wait).await;
        };

        info!(name = %options.name, server = %server, "Connected");
        *self.shared.server.lock() = Some(server);
        self.shared.set_state(ConnectionState::Connected);

        let shared = Arc::clone(&self.shared);
        *self.supervisor.lock() = Some(tokio::spawn(shared.run(options, reader)));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.shared.set_state(ConnectionState::Closed);
        if let Some(handle) = self.supervisor.lock().take() {
            handle.abort();
        }
        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "Error shutting down connection");
            }
        }
        self.shared.frames.lock().take();
        *self.shared.server.lock() = None;
        Ok(())
    }

    async fn publish(&self, subject: &str, data: Bytes, reply_to: Option<&str>) -> Result<()> {
        if !self.shared.state().is_active() {
            return Err(TransportError::not_connected(format!("publish to {}", subject)));
        }
        self.shared.write(&encode_pub(subject, reply_to, &data)).await?;
        self.shared.stats.record_out(data.len());
        Ok(())
    }

    async fn subscribe(&self, subject: &str, queue_group: Option<&str>) -> Result<()> {
        let state = self.shared.state();
        if state == ConnectionState::Closed {
            return Err(TransportError::Closed);
        }
        if !state.is_started() {
            return Err(TransportError::not_connected(format!("subscribe to {}", subject)));
        }

        let sid = self.shared.next_sid.fetch_add(1, Ordering::Relaxed);
        self.shared.subscriptions.lock().push(Subscription {
            sid,
            subject: subject.to_string(),
            queue_group: queue_group.map(str::to_string),
        });

        // replayed on reconnect if this write misses the current socket
        if state.is_active() {
            self.shared
                .write(encode_sub(subject, queue_group, sid).as_bytes())
                .await?;
        }
        debug!(subject, queue_group, sid, "Subscribed");
        Ok(())
    }

    async fn receive(&self) -> Result<Frame> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await.ok_or(TransportError::Closed)
    }

    fn connected_server(&self) -> Option<String> {
        self.shared.server.lock().clone()
    }

    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn stats(&self) -> TransportStats {
        self.shared.stats.snapshot()
    }
}

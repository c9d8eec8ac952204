use std::collections::HashMap;
use std::path::Path;

use anyhow::anyhow;
pub use awc::ws;
use awc::{ws::Codec, BoxedSocket, ClientResponse};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::select;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::message::{FileEvent, Identity, Message, Payload, Positions, RawIdentity};
use crate::transfer::{AcceptWaiters, InboundTransfer, SendOutcome, TransferOptions};

pub mod config;
pub mod message;
pub mod transfer;

pub use config::{SocketConfig, SocketConfigBuilder};

/// Chunk payloads blow up the 64 KiB default WebSocket frame cap once encoded
/// as JSON byte arrays; both ends of the connection raise it to this.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

pub type WsFramed = actix_codec::Framed<BoxedSocket, Codec>;

/// What the socket surfaces to the embedding application.
#[derive(Debug)]
pub enum SocketEvent {
    Peers(Vec<Identity>),
    PeerLeft {
        client_id: String,
    },
    Layout(Positions),
    /// A single desk moved. The current server keeps layout fixed and never
    /// emits this, but the protocol allows it.
    LayoutUpdate {
        name: String,
        x: i32,
        y: i32,
    },
    Text {
        from: String,
        from_name: String,
        content: String,
    },
    /// An inbound transfer was announced. Already accepted when the socket
    /// runs with auto-accept; otherwise call [`SocketHandle::accept`].
    Offer {
        from: String,
        transfer_id: String,
        name: String,
        size: u64,
        mime: String,
    },
    Progress {
        transfer_id: String,
        received: u64,
        size: u64,
    },
    /// A transfer completed and reassembled into its final bytes.
    Received {
        from: String,
        name: String,
        mime: String,
        data: Bytes,
    },
}

enum Command {
    Send(Message),
    Register {
        transfer_id: String,
        expect_from: Option<String>,
        notify: oneshot::Sender<()>,
    },
    Abandon {
        transfer_id: String,
    },
    AcceptOffer {
        transfer_id: String,
        offerer: String,
    },
}

/// One client's persistent connection to the relay: joins the shared room on
/// construction, then [`run`](Self::run) drives the message loop while
/// [`SocketHandle`]s feed it commands.
pub struct ShareSocket {
    config: SocketConfig,
    client_id: String,
    room: String,
    peers: Vec<Identity>,
    ws: WsFramed,
    cmd_tx: UnboundedSender<Command>,
    cmd_rx: UnboundedReceiver<Command>,
    event_tx: UnboundedSender<SocketEvent>,
    event_rx: Option<UnboundedReceiver<SocketEvent>>,
    waiters: AcceptWaiters,
    inbound: HashMap<String, InboundTransfer>,
}

impl std::fmt::Debug for ShareSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareSocket")
            .field("client_id", &self.client_id)
            .field("room", &self.room)
            .field("peers", &self.peers)
            .finish()
    }
}

impl ShareSocket {
    /// Connects, announces identity, and waits for the server's `welcome`.
    pub async fn new(config: SocketConfig) -> anyhow::Result<Self> {
        let (_res, mut ws) = ShareSocket::connect(&config).await?;
        let hello = Message::Hello {
            client_id: config.client_id.clone(),
            identity: RawIdentity {
                name: config.name.clone(),
                mac: config.mac.clone(),
            },
        };
        ws.send(ws::Message::Text(serde_json::to_string(&hello)?.into()))
            .await?;
        let (client_id, room) = loop {
            match ws.next().await {
                Some(Ok(ws::Frame::Text(text))) => {
                    if let Ok(Message::Welcome { room, client_id, .. }) =
                        serde_json::from_slice(&text)
                    {
                        break (client_id, room);
                    }
                }
                Some(Ok(_)) => continue,
                _ => return Err(anyhow!("connection closed before welcome")),
            }
        };
        info!("joined room {room} as {client_id}");
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            client_id,
            room,
            peers: Vec::new(),
            ws,
            cmd_tx,
            cmd_rx,
            event_tx,
            event_rx: Some(event_rx),
            waiters: AcceptWaiters::default(),
            inbound: HashMap::new(),
        })
    }

    /// Raw WebSocket connect, used by tests that speak the wire directly.
    pub async fn connect(
        config: &SocketConfig,
    ) -> Result<(ClientResponse, WsFramed), anyhow::Error> {
        awc::Client::new()
            .ws(config.base_url())
            .max_frame_size(MAX_FRAME_BYTES)
            .connect()
            .await
            .map_err(|e| anyhow!("Client error: {}", e))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn handle(&self) -> SocketHandle {
        SocketHandle {
            client_id: self.client_id.clone(),
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    /// The event stream. Yields `None` once the socket shuts down.
    pub fn take_events(&mut self) -> UnboundedReceiver<SocketEvent> {
        self.event_rx.take().expect("events already taken")
    }

    /// Drives the connection until the server closes it or the transport
    /// fails. Interleaves inbound frames with commands from handles; every
    /// in-flight transfer is just more traffic through this one loop.
    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            select! {
                Some(cmd) = self.cmd_rx.recv() => {
                    self.handle_command(cmd).await?;
                }
                frame = self.ws.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            if self.handle_frame(frame).await? {
                                break;
                            }
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_command(&mut self, cmd: Command) -> anyhow::Result<()> {
        match cmd {
            Command::Send(msg) => self.send_message(&msg).await?,
            Command::Register { transfer_id, expect_from, notify } => {
                self.waiters.register(transfer_id, expect_from, notify);
            }
            Command::Abandon { transfer_id } => self.waiters.abandon(&transfer_id),
            Command::AcceptOffer { transfer_id, offerer } => {
                self.accept_offer(transfer_id, offerer).await?;
            }
        }
        Ok(())
    }

    /// Returns `true` when the connection is done.
    async fn handle_frame(&mut self, frame: ws::Frame) -> anyhow::Result<bool> {
        match frame {
            ws::Frame::Text(text) => match serde_json::from_slice::<Message>(&text) {
                Ok(msg) => self.handle_message(msg).await?,
                Err(e) => debug!("ignoring unparseable frame: {e}"),
            },
            ws::Frame::Ping(payload) => self.ws.send(ws::Message::Pong(payload)).await?,
            ws::Frame::Pong(_) => {}
            ws::Frame::Close(reason) => {
                debug!(?reason, "server closed the connection");
                let _ = self.ws.close().await;
                return Ok(true);
            }
            ws::Frame::Binary(_) | ws::Frame::Continuation(_) => {}
        }
        Ok(false)
    }

    async fn handle_message(&mut self, msg: Message) -> anyhow::Result<()> {
        match msg {
            Message::Peers { peers } => {
                self.peers = peers.clone();
                self.emit(SocketEvent::Peers(peers));
            }
            Message::PeerLeft { client_id } => {
                self.peers.retain(|p| p.client_id != client_id);
                self.emit(SocketEvent::PeerLeft { client_id });
            }
            Message::Layout { positions } => self.emit(SocketEvent::Layout(positions)),
            Message::LayoutUpdate { name, x, y } => {
                self.emit(SocketEvent::LayoutUpdate { name, x, y })
            }
            Message::Relay { from, from_name, payload, .. } => {
                let from = from.unwrap_or_default();
                let from_name = from_name.unwrap_or_default();
                match serde_json::from_value::<Payload>(payload) {
                    Ok(payload) => self.handle_payload(from, from_name, payload).await?,
                    Err(e) => debug!("ignoring unknown relay payload: {e}"),
                }
            }
            // hello/identify flow the other way; the welcome was consumed
            // during the handshake.
            Message::Hello { .. } | Message::Welcome { .. } | Message::Identify { .. } => {}
        }
        Ok(())
    }

    async fn handle_payload(
        &mut self,
        from: String,
        from_name: String,
        payload: Payload,
    ) -> anyhow::Result<()> {
        match payload {
            Payload::Text { content } => self.emit(SocketEvent::Text { from, from_name, content }),
            Payload::File(event) => self.handle_file_event(from, event).await?,
        }
        Ok(())
    }

    async fn handle_file_event(&mut self, from: String, event: FileEvent) -> anyhow::Result<()> {
        match event {
            FileEvent::Offer { transfer_id, name, size, mime } => {
                self.inbound.insert(
                    transfer_id.clone(),
                    InboundTransfer::new(from.clone(), name.clone(), mime.clone(), size),
                );
                self.emit(SocketEvent::Offer {
                    from: from.clone(),
                    transfer_id: transfer_id.clone(),
                    name,
                    size,
                    mime,
                });
                if self.config.auto_accept {
                    self.accept_offer(transfer_id, from).await?;
                }
            }
            FileEvent::Accept { transfer_id } => {
                // First matching accept unblocks the sender; the rest idle out.
                self.waiters.accept(&transfer_id, &from);
            }
            FileEvent::Chunk { transfer_id, data, size, name, mime } => {
                let transfer = self.inbound.entry(transfer_id.clone()).or_insert_with(|| {
                    // Chunks only flow after an accept, so a transfer we never
                    // offered locally is still a live one.
                    let mut t = InboundTransfer::new(from, name, mime, size);
                    t.accepted = true;
                    t
                });
                transfer.push_chunk(data);
                let (received, size) = (transfer.received, transfer.size);
                self.emit(SocketEvent::Progress { transfer_id, received, size });
            }
            FileEvent::Complete { transfer_id } => {
                let accepted = self
                    .inbound
                    .get(&transfer_id)
                    .map(|t| t.accepted)
                    .unwrap_or(false);
                if !accepted {
                    // Complete without a matching accepted transfer is a no-op.
                    debug!("ignoring complete for unknown transfer {transfer_id}");
                    return Ok(());
                }
                if let Some(transfer) = self.inbound.remove(&transfer_id) {
                    if !transfer.is_complete() {
                        warn!(
                            "transfer {transfer_id} completed with {}/{} bytes",
                            transfer.received, transfer.size
                        );
                    }
                    let (from, name, mime) =
                        (transfer.from.clone(), transfer.name.clone(), transfer.mime.clone());
                    self.emit(SocketEvent::Received { from, name, mime, data: transfer.assemble() });
                }
            }
        }
        Ok(())
    }

    async fn accept_offer(&mut self, transfer_id: String, offerer: String) -> anyhow::Result<()> {
        if let Some(transfer) = self.inbound.get_mut(&transfer_id) {
            transfer.accepted = true;
        }
        let accept = relay_to(
            Some(offerer),
            &Payload::File(FileEvent::Accept { transfer_id }),
        )?;
        self.send_message(&accept).await
    }

    async fn send_message(&mut self, msg: &Message) -> anyhow::Result<()> {
        Ok(self
            .ws
            .send(ws::Message::Text(serde_json::to_string(msg)?.into()))
            .await?)
    }

    fn emit(&self, event: SocketEvent) {
        // Receiver may have been dropped by an uninterested embedder.
        let _ = self.event_tx.send(event);
    }
}

fn relay_to(to: Option<String>, payload: &Payload) -> anyhow::Result<Message> {
    Ok(Message::Relay {
        to,
        from: None,
        from_name: None,
        payload: serde_json::to_value(payload)?,
    })
}

enum Source {
    Memory(Bytes),
    File(tokio::fs::File),
}

/// Cheap clonable handle for issuing commands while the socket runs.
#[derive(Clone)]
pub struct SocketHandle {
    client_id: String,
    cmd_tx: UnboundedSender<Command>,
}

impl SocketHandle {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Re-announces identity; the server rebroadcasts presence.
    pub fn identify(&self, name: &str, mac: &str) -> anyhow::Result<()> {
        self.command(Command::Send(Message::Identify {
            identity: RawIdentity { name: name.to_string(), mac: mac.to_string() },
        }))
    }

    /// Sends a text snippet to one peer or, with `to = None`, the whole room.
    pub fn send_text(&self, to: Option<String>, content: &str) -> anyhow::Result<()> {
        let msg = relay_to(to, &Payload::Text { content: content.to_string() })?;
        self.command(Command::Send(msg))
    }

    /// Manually accepts a previously offered transfer.
    pub fn accept(&self, transfer_id: &str, offerer: &str) -> anyhow::Result<()> {
        self.command(Command::AcceptOffer {
            transfer_id: transfer_id.to_string(),
            offerer: offerer.to_string(),
        })
    }

    /// Offers a file and, once accepted, streams it chunk by chunk straight
    /// off the filesystem.
    pub async fn send_file(
        &self,
        path: impl AsRef<Path>,
        to: Option<String>,
        options: TransferOptions,
    ) -> anyhow::Result<SendOutcome> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let mime = mime_guess::from_path(path).first_or_octet_stream().to_string();
        self.send_source(Source::File(file), name, mime, size, to, options)
            .await
    }

    /// Like [`send_file`](Self::send_file) for an in-memory blob.
    pub async fn send_bytes(
        &self,
        name: &str,
        mime: &str,
        data: Bytes,
        to: Option<String>,
        options: TransferOptions,
    ) -> anyhow::Result<SendOutcome> {
        let size = data.len() as u64;
        self.send_source(
            Source::Memory(data),
            name.to_string(),
            mime.to_string(),
            size,
            to,
            options,
        )
        .await
    }

    async fn send_source(
        &self,
        source: Source,
        name: String,
        mime: String,
        size: u64,
        to: Option<String>,
        options: TransferOptions,
    ) -> anyhow::Result<SendOutcome> {
        let transfer_id = Uuid::new_v4().to_string();
        let (notify, accepted) = oneshot::channel();
        self.command(Command::Register {
            transfer_id: transfer_id.clone(),
            expect_from: to.clone(),
            notify,
        })?;
        self.command(Command::Send(relay_to(
            to.clone(),
            &Payload::File(FileEvent::Offer {
                transfer_id: transfer_id.clone(),
                name: name.clone(),
                size,
                mime: mime.clone(),
            }),
        )?))?;

        let accepted = tokio::time::timeout(options.accept_timeout, accepted).await;
        if !matches!(accepted, Ok(Ok(()))) {
            // Nobody accepted in time. The offer is quietly abandoned; the
            // receiver is never told and no chunk is ever sent.
            self.command(Command::Abandon { transfer_id })?;
            return Ok(SendOutcome::NotAccepted);
        }

        match source {
            Source::Memory(data) => {
                for chunk in data.chunks(options.chunk_size) {
                    self.send_chunk(&transfer_id, &to, chunk, size, &name, &mime)?;
                }
            }
            Source::File(mut file) => {
                let mut buf = vec![0u8; options.chunk_size];
                loop {
                    let n = file.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    self.send_chunk(&transfer_id, &to, &buf[..n], size, &name, &mime)?;
                }
            }
        }
        self.command(Command::Send(relay_to(
            to,
            &Payload::File(FileEvent::Complete { transfer_id }),
        )?))?;
        Ok(SendOutcome::Delivered)
    }

    fn send_chunk(
        &self,
        transfer_id: &str,
        to: &Option<String>,
        data: &[u8],
        size: u64,
        name: &str,
        mime: &str,
    ) -> anyhow::Result<()> {
        let chunk = Payload::File(FileEvent::Chunk {
            transfer_id: transfer_id.to_string(),
            data: data.to_vec(),
            size,
            name: name.to_string(),
            mime: mime.to_string(),
        });
        self.command(Command::Send(relay_to(to.clone(), &chunk)?))
    }

    fn command(&self, cmd: Command) -> anyhow::Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| anyhow!("socket task is gone"))
    }
}

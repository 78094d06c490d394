use crate::live::manager::ManagerEvent;
use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

/// Close code used when the connection dropped without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code used when a close frame carried no status
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Details of a transport closure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub was_clean: bool,
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self {
            was_clean: true,
            code,
            reason: reason.into(),
        }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            was_clean: false,
            code: ABNORMAL_CLOSURE,
            reason: reason.into(),
        }
    }
}

/// Events a transport reports back to the manager
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed(CloseInfo),
    Error(String),
}

/// Event sink handed to a transport when it is opened.
///
/// Every event is tagged with the generation of the connect attempt that
/// created the transport, so the manager can drop callbacks from a
/// superseded attempt.
#[derive(Clone)]
pub struct TransportEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<ManagerEvent>,
}

impl TransportEvents {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<ManagerEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Opened);
    }

    pub fn message(&self, text: impl Into<String>) {
        self.emit(TransportEvent::Message(text.into()));
    }

    pub fn closed(&self, info: CloseInfo) {
        self.emit(TransportEvent::Closed(info));
    }

    pub fn error(&self, error: impl Into<String>) {
        self.emit(TransportEvent::Error(error.into()));
    }

    fn emit(&self, event: TransportEvent) {
        let event = ManagerEvent::Transport {
            generation: self.generation,
            event,
        };
        if self.tx.send(event).is_err() {
            debug!(generation = self.generation, "Manager gone, dropping transport event");
        }
    }
}

/// An open (or opening) bidirectional text channel
pub trait Transport: Send {
    /// Queue a text frame for the peer
    fn send_text(&self, text: String) -> Result<()>;

    /// Start an intentional close
    fn close(&self);
}

/// Creates transports. `open` must return without waiting for the
/// connection; progress is reported through `events`.
pub trait Connector: Send + Sync {
    fn open(&self, url: &str, events: TransportEvents) -> Result<Box<dyn Transport>>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn open(&self, url: &str, events: TransportEvents) -> Result<Box<dyn Transport>> {
        let parsed = reqwest::Url::parse(url).with_context(|| format!("Invalid WebSocket URL '{}'", url))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(anyhow!("Unsupported WebSocket scheme '{}'", parsed.scheme()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .context("WebSocket transport requires a Tokio runtime")?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        runtime.spawn(run_socket(parsed.to_string(), outbound_rx, events));

        Ok(Box::new(WsTransport {
            outbound: outbound_tx,
        }))
    }
}

struct WsTransport {
    outbound: mpsc::UnboundedSender<Message>,
}

impl Transport for WsTransport {
    fn send_text(&self, text: String) -> Result<()> {
        self.outbound
            .send(Message::Text(text.into()))
            .map_err(|_| anyhow!("WebSocket task has stopped"))
    }

    fn close(&self) {
        // Ignore send errors: the socket task already exited
        let _ = self.outbound.send(Message::Close(None));
    }
}

/// Drive one WebSocket connection until it closes
async fn run_socket(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    events: TransportEvents,
) {
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            warn!(url = %url, error = %e, "WebSocket connect failed");
            events.error(e.to_string());
            events.closed(CloseInfo::abnormal(e.to_string()));
            return;
        }
    };

    info!(url = %url, generation = events.generation(), "WebSocket open");
    events.opened();

    let (mut sink, mut stream) = socket.split();
    let mut closing = false;

    loop {
        tokio::select! {
            Some(msg) = outbound.recv() => {
                let is_close = matches!(msg, Message::Close(_));
                if let Err(e) = sink.send(msg).await {
                    if closing || is_close {
                        events.closed(CloseInfo::clean(ABNORMAL_CLOSURE, "closed locally"));
                    } else {
                        warn!(error = %e, "WebSocket send failed");
                        events.closed(CloseInfo::abnormal(e.to_string()));
                    }
                    return;
                }
                closing |= is_close;
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        events.message(text.to_string());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let info = match frame {
                            Some(frame) => CloseInfo::clean(u16::from(frame.code), frame.reason.to_string()),
                            None => CloseInfo::clean(NO_STATUS_RECEIVED, ""),
                        };
                        debug!(code = info.code, reason = %info.reason, "WebSocket close frame received");
                        events.closed(info);
                        return;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite; binary frames are ignored
                    }
                    Some(Err(e)) => {
                        if closing {
                            events.closed(CloseInfo::clean(ABNORMAL_CLOSURE, "closed locally"));
                        } else {
                            warn!(error = %e, "WebSocket error");
                            events.error(e.to_string());
                            events.closed(CloseInfo::abnormal(e.to_string()));
                        }
                        return;
                    }
                    None => {
                        let info = if closing {
                            CloseInfo::clean(ABNORMAL_CLOSURE, "closed locally")
                        } else {
                            CloseInfo::abnormal("stream ended without close frame")
                        };
                        events.closed(info);
                        return;
                    }
                }
            }
        }
    }
}

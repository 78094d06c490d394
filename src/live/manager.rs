use crate::config::LiveConfig;
use crate::live::backoff::BackoffPolicy;
use crate::live::listeners::{ListenerId, ListenerRegistry};
use crate::live::protocol::{Channel, ClientMessage, InboundMessage, MessageKind};
use crate::live::state::{ConnectionState, ConnectionStatus, StatusChange};
use crate::live::transport::{CloseInfo, Connector, Transport, TransportEvent, TransportEvents};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Everything the manager task reacts to
pub(crate) enum ManagerEvent {
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    ReconnectDue {
        generation: u64,
    },
    Command(Command),
}

/// Requests forwarded from a `ManagerHandle`
pub(crate) enum Command {
    Connect,
    Send(Value),
    Subscribe(Channel),
    SubscribeAll,
    Disconnect,
    Shutdown,
}

/// Owns the single live-updates connection.
///
/// The manager is a state machine with named transitions (`connect`,
/// `on_open`, `on_message`, `on_close`, `schedule_reconnect`,
/// `on_reconnect_due`, `disconnect`). `run` drives it from one event queue;
/// tests can also call the transitions directly.
///
/// Every connect attempt gets a new generation number. Transport events and
/// reconnect timers carry the generation they belong to, and anything from
/// an older generation is ignored.
pub struct ConnectionManager {
    config: LiveConfig,
    backoff: BackoffPolicy,
    connector: Arc<dyn Connector>,
    registry: Arc<ListenerRegistry>,
    state: ConnectionState,
    attempt_count: u32,
    generation: u64,
    transport: Option<Box<dyn Transport>>,
    reconnect_timer: Option<JoinHandle<()>>,
    pending_delay: Option<Duration>,
    events_tx: mpsc::UnboundedSender<ManagerEvent>,
    events_rx: mpsc::UnboundedReceiver<ManagerEvent>,
}

impl ConnectionManager {
    pub fn new(config: LiveConfig, connector: Arc<dyn Connector>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backoff: config.backoff(),
            config,
            connector,
            registry: Arc::new(ListenerRegistry::new()),
            state: ConnectionState::Idle,
            attempt_count: 0,
            generation: 0,
            transport: None,
            reconnect_timer: None,
            pending_delay: None,
            events_tx,
            events_rx,
        }
    }

    /// Cloneable handle for consumers
    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle {
            tx: self.events_tx.clone(),
            registry: Arc::clone(&self.registry),
        }
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Delay of the outstanding reconnect timer, if one is armed
    pub fn pending_reconnect_delay(&self) -> Option<Duration> {
        self.pending_delay
    }

    /// Connect, then process events until shutdown or terminal failure.
    ///
    /// Returns the final state.
    pub async fn run(mut self) -> ConnectionState {
        self.connect();

        while self.state != ConnectionState::Failed {
            let Some(event) = self.events_rx.recv().await else {
                break;
            };
            if !self.handle_event(event) {
                break;
            }
        }

        self.cancel_reconnect();
        info!(state = %self.state, "Connection manager stopped");
        self.state
    }

    /// Handle every event already queued without waiting.
    ///
    /// Returns the number of events processed.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            processed += 1;
            if !self.handle_event(event) {
                break;
            }
        }
        processed
    }

    /// Returns false when the manager should stop
    fn handle_event(&mut self, event: ManagerEvent) -> bool {
        match event {
            ManagerEvent::Transport { generation, event } => match event {
                TransportEvent::Opened => self.on_open(generation),
                TransportEvent::Message(raw) => self.on_message(generation, &raw),
                TransportEvent::Closed(info) => self.on_close(generation, info),
                TransportEvent::Error(e) => self.on_error(generation, &e),
            },
            ManagerEvent::ReconnectDue { generation } => self.on_reconnect_due(generation),
            ManagerEvent::Command(command) => match command {
                Command::Connect => self.connect(),
                Command::Send(message) => {
                    self.send(&message);
                }
                Command::Subscribe(channel) => {
                    self.subscribe(channel);
                }
                Command::SubscribeAll => self.subscribe_to_all(),
                Command::Disconnect => self.disconnect(),
                Command::Shutdown => {
                    self.disconnect();
                    return false;
                }
            },
        }
        true
    }

    /// Start a new connect attempt.
    ///
    /// Never fails to the caller: a transport that cannot be built is handled
    /// like an unclean close.
    pub fn connect(&mut self) {
        if self.state == ConnectionState::Failed {
            warn!("Connection manager has failed, ignoring connect");
            return;
        }

        self.cancel_reconnect();
        if let Some(previous) = self.transport.take() {
            previous.close();
        }

        self.generation += 1;
        self.state = ConnectionState::Connecting;

        let url = match self.config.endpoint_url() {
            Ok(url) => url,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Cannot build live endpoint URL");
                self.handle_close(CloseInfo::abnormal(format!("invalid endpoint: {:#}", e)));
                return;
            }
        };

        info!(
            url = %url,
            generation = self.generation,
            attempt = self.attempt_count,
            "Connecting to live updates"
        );

        let events = TransportEvents::new(self.generation, self.events_tx.clone());
        match self.connector.open(&url, events) {
            Ok(transport) => self.transport = Some(transport),
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to create transport");
                self.handle_close(CloseInfo::abnormal(format!("transport error: {:#}", e)));
            }
        }
    }

    /// Transport for `generation` finished its handshake
    pub fn on_open(&mut self, generation: u64) {
        if self.is_stale(generation, "open") {
            return;
        }
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "Ignoring open outside connecting state");
            return;
        }

        self.state = ConnectionState::Connected;
        self.attempt_count = 0;
        self.pending_delay = None;
        info!(generation = generation, "Live connection established");
        self.emit_status(ConnectionStatus::Connected);

        let channels = self.config.channels.clone();
        for channel in channels {
            self.subscribe(channel);
        }
    }

    /// Route one inbound text frame to the listeners for its type
    pub fn on_message(&mut self, generation: u64, raw: &str) {
        if self.is_stale(generation, "message") {
            return;
        }

        match InboundMessage::decode(raw) {
            Ok(message) => {
                let delivered = self.registry.dispatch(&message);
                debug!(kind = %message.kind(), delivered = delivered, "Dispatched live message");
            }
            Err(e) => {
                debug!(error = %e, "Discarding malformed live message");
            }
        }
    }

    /// Transport for `generation` closed
    pub fn on_close(&mut self, generation: u64, info: CloseInfo) {
        if self.is_stale(generation, "close") {
            return;
        }
        self.handle_close(info);
    }

    /// Transport for `generation` reported an error; a close always follows
    pub fn on_error(&mut self, generation: u64, error: &str) {
        if self.is_stale(generation, "error") {
            return;
        }
        warn!(generation = generation, error = %error, "Live connection error");
    }

    fn handle_close(&mut self, info: CloseInfo) {
        if matches!(self.state, ConnectionState::Idle | ConnectionState::Failed) {
            debug!(state = %self.state, "Ignoring close after shutdown");
            return;
        }

        self.transport = None;
        self.state = ConnectionState::Disconnected;
        info!(
            code = info.code,
            reason = %info.reason,
            clean = info.was_clean,
            "Live connection closed"
        );
        self.emit_status(ConnectionStatus::Disconnected);

        if !info.was_clean && self.backoff.has_attempts_left(self.attempt_count) {
            self.schedule_reconnect();
        } else if info.was_clean {
            self.fail(format!("Connection closed by server ({} {})", info.code, info.reason));
        } else {
            self.fail("Max reconnection attempts reached".to_string());
        }
    }

    /// Arm the backoff timer for the next attempt
    pub fn schedule_reconnect(&mut self) {
        self.cancel_reconnect();

        self.attempt_count += 1;
        let delay = self.backoff.delay_for(self.attempt_count);
        self.state = ConnectionState::Reconnecting;
        self.pending_delay = Some(delay);

        info!(
            attempt = self.attempt_count,
            max_attempts = self.backoff.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        let tx = self.events_tx.clone();
        let generation = self.generation;
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ManagerEvent::ReconnectDue { generation });
        }));
    }

    /// Backoff timer armed during `generation` fired
    pub fn on_reconnect_due(&mut self, generation: u64) {
        if generation != self.generation || self.state != ConnectionState::Reconnecting {
            debug!(
                generation = generation,
                current = self.generation,
                state = %self.state,
                "Ignoring stale reconnect timer"
            );
            return;
        }

        self.reconnect_timer = None;
        self.pending_delay = None;

        if self.attempt_count <= self.backoff.max_attempts {
            self.connect();
        } else {
            self.fail("Max reconnection attempts reached".to_string());
        }
    }

    /// Serialize and write `message` if connected; otherwise warn and drop it
    pub fn send<T: Serialize + ?Sized>(&mut self, message: &T) -> bool {
        let transport = match (&self.state, &self.transport) {
            (ConnectionState::Connected, Some(transport)) => transport,
            _ => {
                warn!(state = %self.state, "Live connection is not open, cannot send message");
                return false;
            }
        };

        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to serialize outbound message");
                return false;
            }
        };

        match transport.send_text(text) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Failed to send live message");
                false
            }
        }
    }

    pub fn subscribe(&mut self, channel: Channel) -> bool {
        debug!(channel = %channel, "Subscribing");
        self.send(&ClientMessage::Subscribe { channel })
    }

    pub fn subscribe_to_all(&mut self) {
        for channel in Channel::ALL {
            self.subscribe(channel);
        }
    }

    /// Intentional shutdown: no reconnect, late events from the closed
    /// transport are ignored
    pub fn disconnect(&mut self) {
        self.cancel_reconnect();
        self.generation += 1;
        self.attempt_count = 0;

        if let Some(transport) = self.transport.take() {
            transport.close();
        }

        match self.state {
            ConnectionState::Failed => {}
            ConnectionState::Idle => {}
            _ => {
                self.state = ConnectionState::Idle;
                info!("Live connection closed by client");
                self.emit_status(ConnectionStatus::Disconnected);
            }
        }
    }

    fn fail(&mut self, reason: String) {
        self.cancel_reconnect();
        self.transport = None;
        self.state = ConnectionState::Failed;
        error!(reason = %reason, "Live connection failed");
        self.emit_status(ConnectionStatus::Failed(reason));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        self.pending_delay = None;
    }

    fn is_stale(&self, generation: u64, what: &str) -> bool {
        if generation != self.generation {
            debug!(
                generation = generation,
                current = self.generation,
                event = what,
                "Ignoring event from superseded transport"
            );
            return true;
        }
        false
    }

    fn emit_status(&self, status: ConnectionStatus) {
        self.registry.notify_status(&StatusChange::now(status));
    }
}

/// Cheap, cloneable access to a running `ConnectionManager`.
///
/// Consumers receive one of these at construction time. Listener
/// registration takes effect immediately; everything else is queued to the
/// manager task.
#[derive(Clone)]
pub struct ManagerHandle {
    tx: mpsc::UnboundedSender<ManagerEvent>,
    registry: Arc<ListenerRegistry>,
}

impl ManagerHandle {
    pub fn register_listener<F>(&self, kind: MessageKind, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.registry.register(kind, callback)
    }

    pub fn on_status_change<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&StatusChange) + Send + Sync + 'static,
    {
        self.registry.on_status_change(callback)
    }

    pub fn unregister(&self, id: ListenerId) -> bool {
        self.registry.unregister(id)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.registry.latest_status()
    }

    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    pub fn send<T: Serialize + ?Sized>(&self, message: &T) {
        match serde_json::to_value(message) {
            Ok(value) => self.command(Command::Send(value)),
            Err(e) => warn!(error = %e, "Failed to serialize outbound message"),
        }
    }

    pub fn subscribe(&self, channel: Channel) {
        self.command(Command::Subscribe(channel));
    }

    pub fn subscribe_to_all(&self) {
        self.command(Command::SubscribeAll);
    }

    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Disconnect and stop the manager task
    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    fn command(&self, command: Command) {
        if self.tx.send(ManagerEvent::Command(command)).is_err() {
            debug!("Connection manager has stopped, dropping command");
        }
    }
}

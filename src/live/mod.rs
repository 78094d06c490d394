// Live dashboard connection: lifecycle, backoff and message fan-out

pub mod backoff;
pub mod listeners;
pub mod manager;
pub mod protocol;
pub mod state;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use listeners::{ListenerId, ListenerRegistry};
pub use manager::{ConnectionManager, ManagerHandle};
pub use protocol::{Channel, ClientMessage, DecodeError, InboundMessage, MessageKind};
pub use state::{ConnectionState, ConnectionStatus, StatusChange};
pub use transport::{CloseInfo, Connector, Transport, TransportEvent, TransportEvents, WsConnector};

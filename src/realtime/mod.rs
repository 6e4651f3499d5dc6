pub mod messages;
pub mod registry;

pub use messages::{ClientMessage, ServerEvent, ServerMessage};
pub use registry::{ConnectedUser, ConnectionId, Outbound, WebSocketManager};

//! klingel-protocol – Event-Definitionen
//!
//! Dieses Crate definiert alle Events, die zwischen Client und Server
//! ueber die WebSocket-Verbindung ausgetauscht werden.

pub mod control;

pub use control::{ClientEvent, ErrorCode, OnlineUser, ProtokollFehler, ServerEvent, Ziel};

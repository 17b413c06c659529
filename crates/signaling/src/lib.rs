//! klingel-signaling – Presence- und Anruf-Signaling ueber WebSocket
//!
//! Dieser Crate implementiert den Relay fuer Klingel. Er verwaltet
//! WebSocket-Verbindungen, den Online-Status, Bildschirmfreigaben und leitet
//! WebRTC-Signaling (SDP, ICE) zwischen Benutzern weiter. Medien fliessen
//! nie ueber den Server.
//!
//! ## Architektur
//!
//! ```text
//! HTTP Listener (SignalingServer)
//!     |  GET /ws?token=...  -> Token-Pruefung, Zulassung
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- CallRelay         (call:offer, call:answer, call:ice-candidate, call:end)
//!     +-- ScreenShareRelay  (start/stop, offer, answer, ice-candidate)
//!     +-- DirektRelay       (send-message, typing-start/stop)
//!
//! PresenceManager    – Online-Status, user-online/offline, Screen-Share-Status
//! ConnectionRegistry – UserId -> Verbindung, Menge der Screen-Sharer
//! EventBroadcaster   – Events an einzelne oder alle Clients senden
//! CallTracker        – Anrufzustand pro Benutzerpaar
//! ```

pub mod broadcast;
pub mod call_relay;
pub mod call_state;
pub mod connection;
pub mod direkt;
pub mod dispatcher;
pub mod error;
pub mod presence;
pub mod registry;
pub mod screen_share;
pub mod server;
pub mod server_state;
pub mod ws;

// Bequeme Re-Exporte
pub use broadcast::{ClientSender, EventBroadcaster, Zustellung};
pub use call_relay::CallRelay;
pub use call_state::{AnrufModus, AnrufZustand, CallTracker};
pub use connection::{close_code, ClientConnection};
pub use dispatcher::MessageDispatcher;
pub use error::{SignalingError, SignalingResult};
pub use presence::PresenceManager;
pub use registry::ConnectionRegistry;
pub use screen_share::ScreenShareRelay;
pub use server::SignalingServer;
pub use server_state::{SignalingConfig, SignalingState};

//! Fehlertypen fuer den Signaling-Service

use klingel_core::types::UserId;
use klingel_protocol::ErrorCode;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (Listener, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Zwischen den beiden Teilnehmern laeuft bereits ein Anruf
    #[error("Anruf zwischen {a} und {b} laeuft bereits ({zustand})")]
    AnrufLaeuftBereits {
        a: UserId,
        b: UserId,
        zustand: &'static str,
    },

    /// Nachricht passt nicht zum aktuellen Anrufzustand
    #[error("Ungueltiger Uebergang: '{event}' im Zustand '{zustand}'")]
    UngueltigerUebergang {
        event: &'static str,
        zustand: &'static str,
    },
}

impl SignalingError {
    /// Fehler-Code fuer Fehler, die dem Absender gemeldet werden
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AnrufLaeuftBereits { .. } => ErrorCode::CallInProgress,
            Self::UngueltigerUebergang { .. } => ErrorCode::InvalidTransition,
            _ => ErrorCode::InvalidRequest,
        }
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

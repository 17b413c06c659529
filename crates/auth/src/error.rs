//! Fehlertypen fuer die Identitaetspruefung

use thiserror::Error;

/// Alle moeglichen Fehler bei der Token-Pruefung
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Kein Token uebergeben")]
    TokenFehlt,

    #[error("Token abgelaufen")]
    TokenAbgelaufen,

    #[error("Token ungueltig: {0}")]
    TokenUngueltig(String),

    /// Die vom Client angegebene userId passt nicht zum Token
    #[error("Identitaet weicht vom Token ab: angegeben={angegeben}, token={token}")]
    IdentitaetAbweichend { angegeben: String, token: String },

    #[error("Token konnte nicht ausgestellt werden: {0}")]
    Ausstellung(String),
}

impl AuthError {
    /// WebSocket-Close-Code fuer diesen Fehler
    ///
    /// 4001 = Token abgelaufen, 4002 = Token ungueltig
    pub fn close_code(&self) -> u16 {
        match self {
            Self::TokenAbgelaufen => 4001,
            _ => 4002,
        }
    }
}

/// Result-Alias fuer die Identitaetspruefung
pub type AuthResult<T> = Result<T, AuthError>;

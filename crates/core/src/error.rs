//! Fehlertypen fuer Klingel
//!
//! Zentraler Fehler-Enum fuer crateuebergreifende Fehlerzustaende.
//! Untermodule definieren eigene Fehler und konvertieren via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer Klingel
pub type Result<T> = std::result::Result<T, KlingelError>;

/// Alle crateuebergreifenden Fehler im Klingel-System
#[derive(Debug, Error)]
pub enum KlingelError {
    // --- Ressourcen ---
    #[error("Server voll: maximale Clientanzahl erreicht")]
    ServerVoll,

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

}

impl KlingelError {
    /// Erstellt einen Konfigurationsfehler
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }
}

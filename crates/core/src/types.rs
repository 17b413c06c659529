//! Gemeinsame Identifikationstypen fuer Klingel
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stabile Benutzer-ID, vergeben vom Auth-Service
///
/// Der Inhalt ist fuer den Relay opak (typischerweise eine Dokument-ID
/// aus dem Persistenz-Service). Auf dem Draht als nackter String.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Eindeutige ID einer einzelnen Transport-Verbindung
///
/// Ein Benutzer kann sich neu verbinden; jede Verbindung bekommt eine
/// neue ID, damit ein verspaeteter Disconnect der alten Verbindung den
/// neuen Eintrag nicht entfernt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerbindungsId(pub Uuid);

impl VerbindungsId {
    /// Erstellt eine neue zufaellige VerbindungsId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VerbindungsId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VerbindungsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Art eines Anrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnrufTyp {
    Voice,
    Video,
}

impl std::fmt::Display for AnrufTyp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Voice => f.write_str("voice"),
            Self::Video => f.write_str("video"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbindungs_id_eindeutig() {
        let a = VerbindungsId::new();
        let b = VerbindungsId::new();
        assert_ne!(a, b, "Zwei neue VerbindungsIds muessen verschieden sein");
    }

    #[test]
    fn user_id_ist_transparenter_string() {
        let uid = UserId::new("65f1c0ffee");
        let json = serde_json::to_string(&uid).unwrap();
        assert_eq!(json, "\"65f1c0ffee\"");
        let zurueck: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, uid);
    }

    #[test]
    fn anruf_typ_kleingeschrieben() {
        assert_eq!(serde_json::to_string(&AnrufTyp::Video).unwrap(), "\"video\"");
        let typ: AnrufTyp = serde_json::from_str("\"voice\"").unwrap();
        assert_eq!(typ, AnrufTyp::Voice);
        assert!(serde_json::from_str::<AnrufTyp>("\"fax\"").is_err());
    }

    #[test]
    fn verbindungs_id_display() {
        let id = VerbindungsId(Uuid::nil());
        assert!(id.to_string().starts_with("conn:"));
    }
}

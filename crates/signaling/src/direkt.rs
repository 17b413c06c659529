//! Direktnachrichten und Tipp-Anzeigen
//!
//! Beides geht an genau einen Empfaenger. Ist er nicht online, wird still
//! verworfen.

use klingel_core::types::UserId;
use klingel_protocol::control::{DirektNachricht, TypingDaten};
use klingel_protocol::ServerEvent;
use serde_json::Value;

use crate::broadcast::{EventBroadcaster, Zustellung};

/// Relay fuer `send-message` und `typing-*`
#[derive(Clone)]
pub struct DirektRelay {
    broadcaster: EventBroadcaster,
}

impl DirektRelay {
    pub fn neu(broadcaster: EventBroadcaster) -> Self {
        Self { broadcaster }
    }

    /// `send-message` -> `new-message` mit `senderId` des Absenders
    pub fn nachricht(&self, von: &UserId, nachricht: DirektNachricht) -> Zustellung {
        let mut inhalt = nachricht.inhalt;
        inhalt.insert("senderId".into(), Value::String(von.to_string()));

        tracing::debug!(von = %von, an = %nachricht.receiver_id, "Direktnachricht");
        self.einzeln(&nachricht.receiver_id, ServerEvent::NewMessage(inhalt))
    }

    /// `typing-start` / `typing-stop`
    ///
    /// Ohne `targetUserId` passiert nichts.
    pub fn tippen(&self, von: &UserId, name: &str, daten: TypingDaten, tippt: bool) -> Zustellung {
        let Some(ziel) = daten.target_user_id else {
            return Zustellung::Verworfen;
        };

        let event = if tippt {
            ServerEvent::UserTyping {
                user_id: von.clone(),
                username: name.to_string(),
            }
        } else {
            ServerEvent::UserStoppedTyping {
                user_id: von.clone(),
            }
        };
        self.einzeln(&ziel, event)
    }

    fn einzeln(&self, ziel: &UserId, event: ServerEvent) -> Zustellung {
        if self.broadcaster.an_user_senden(ziel, event) {
            Zustellung::Zugestellt
        } else {
            self.broadcaster.verworfen("ziel_offline");
            Zustellung::Verworfen
        }
    }
}

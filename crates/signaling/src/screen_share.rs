//! Screen-Share-Relay
//!
//! Start und Stopp aendern den Presence-Zustand. Offer und ICE koennen an
//! einen einzelnen Zuschauer oder an alle anderen Clients gehen, die Antwort
//! eines Zuschauers geht immer an genau einen Sharer. Ziele, die nicht
//! online sind, werden still uebersprungen.

use klingel_core::types::UserId;
use klingel_protocol::control::{ScreenShareAnswerDaten, ScreenShareIceDaten, ScreenShareOfferDaten};
use klingel_protocol::{ServerEvent, Ziel};

use crate::broadcast::{EventBroadcaster, Zustellung};
use crate::presence::PresenceManager;

/// Relay fuer Bildschirmfreigaben
#[derive(Clone)]
pub struct ScreenShareRelay {
    presence: PresenceManager,
    broadcaster: EventBroadcaster,
}

impl ScreenShareRelay {
    pub fn neu(presence: PresenceManager, broadcaster: EventBroadcaster) -> Self {
        Self {
            presence,
            broadcaster,
        }
    }

    /// `start-screen-share`
    pub fn starten(&self, von: &UserId) -> bool {
        self.presence.freigabe_starten(von)
    }

    /// `stop-screen-share`
    pub fn beenden(&self, von: &UserId) -> bool {
        self.presence.freigabe_beenden(von)
    }

    /// `screen-share-offer`
    pub fn angebot(&self, von: &UserId, name: &str, daten: ScreenShareOfferDaten) -> Zustellung {
        let ziel = daten.ziel();
        let event = ServerEvent::ScreenShareOffer {
            user_id: von.clone(),
            username: name.to_string(),
            offer: daten.offer,
        };
        self.verteilen(von, ziel, event)
    }

    /// `screen-share-answer` – immer an genau einen Benutzer
    pub fn antwort(&self, von: &UserId, name: &str, daten: ScreenShareAnswerDaten) -> Zustellung {
        let event = ServerEvent::ScreenShareAnswer {
            user_id: von.clone(),
            username: name.to_string(),
            answer: daten.answer,
        };
        self.verteilen(von, Ziel::User(daten.user_id), event)
    }

    /// `ice-candidate` fuer Screen-Share-Verbindungen
    pub fn ice(&self, von: &UserId, name: &str, daten: ScreenShareIceDaten) -> Zustellung {
        let ziel = daten.ziel();
        let event = ServerEvent::IceCandidate {
            user_id: von.clone(),
            username: name.to_string(),
            candidate: daten.candidate,
        };
        self.verteilen(von, ziel, event)
    }

    fn verteilen(&self, von: &UserId, ziel: Ziel, event: ServerEvent) -> Zustellung {
        match ziel {
            Ziel::Alle => Zustellung::Verteilt(self.broadcaster.an_alle_ausser_senden(von, event)),
            Ziel::User(user_id) => {
                if self.broadcaster.an_user_senden(&user_id, event) {
                    Zustellung::Zugestellt
                } else {
                    self.broadcaster.verworfen("ziel_offline");
                    Zustellung::Verworfen
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

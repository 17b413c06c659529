//! Anruf-Relay – Leitet 1:1-Anruf-Signaling zwischen zwei Benutzern weiter
//!
//! SDP und ICE-Kandidaten sind fuer den Relay opak. Der Absender jeder
//! weitergeleiteten Nachricht ist immer die authentifizierte Identitaet der
//! sendenden Verbindung.
//!
//! Nur `call:offer` meldet ein fehlendes Ziel zurueck (`call:user-offline`).
//! Antworten, Kandidaten und Auflegen an nicht verbundene Ziele werden still
//! verworfen.

use klingel_core::types::UserId;
use klingel_protocol::control::{CallAnswerDaten, CallEndDaten, CallIceDaten, CallOfferDaten};
use klingel_protocol::ServerEvent;
use std::sync::Arc;

use crate::broadcast::{EventBroadcaster, Zustellung};
use crate::call_state::CallTracker;
use crate::error::SignalingResult;
use crate::registry::ConnectionRegistry;

/// Relay fuer `call:*`-Nachrichten
#[derive(Clone)]
pub struct CallRelay {
    registry: ConnectionRegistry,
    broadcaster: EventBroadcaster,
    tracker: Arc<CallTracker>,
}

impl CallRelay {
    pub fn neu(
        registry: ConnectionRegistry,
        broadcaster: EventBroadcaster,
        tracker: Arc<CallTracker>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            tracker,
        }
    }

    pub fn tracker(&self) -> &CallTracker {
        &self.tracker
    }

    /// `call:offer` -> `call:incoming` beim Ziel
    ///
    /// Ist das Ziel offline, bekommt der Absender `call:user-offline` und es
    /// entsteht kein Anrufzustand. Nachschlagen und Eintragen laufen unter
    /// der Schreibsperre, damit ein gleichzeitiges Abmelden des Ziels den
    /// neuen Eintrag sicher mit aufraeumt.
    pub fn angebot(&self, von: &UserId, daten: CallOfferDaten) -> SignalingResult<Zustellung> {
        let _sperre = self.registry.schreibsperre();
        let Some(ziel) = self.registry.sender_von(&daten.to) else {
            tracing::debug!(von = %von, an = %daten.to, "Anruf an Offline-Benutzer");
            self.broadcaster.verworfen("ziel_offline");
            self.broadcaster.an_user_senden(
                von,
                ServerEvent::CallUserOffline { user_id: daten.to },
            );
            return Ok(Zustellung::ZielOffline);
        };

        self.tracker.angebot(von, &daten.to, daten.call_type)?;

        tracing::info!(von = %von, an = %daten.to, typ = %daten.call_type, "Anruf angeboten");
        self.broadcaster.direkt_senden(
            &ziel,
            ServerEvent::CallIncoming {
                from: von.clone(),
                offer: daten.offer,
                call_type: daten.call_type,
                caller_info: daten.caller_info,
            },
        );
        Ok(Zustellung::Zugestellt)
    }

    /// `call:answer` -> `call:answer` beim Anrufer
    pub fn antwort(&self, von: &UserId, daten: CallAnswerDaten) -> SignalingResult<Zustellung> {
        let Some(ziel) = self.registry.sender_von(&daten.to) else {
            self.broadcaster.verworfen("ziel_offline");
            return Ok(Zustellung::Verworfen);
        };

        self.tracker.antwort(von, &daten.to)?;

        tracing::info!(von = %von, an = %daten.to, "Anruf angenommen");
        self.broadcaster.direkt_senden(
            &ziel,
            ServerEvent::CallAnswer {
                from: von.clone(),
                answer: daten.answer,
            },
        );
        Ok(Zustellung::Zugestellt)
    }

    /// `call:ice-candidate` -> `call:ice-candidate` beim Ziel
    pub fn ice(&self, von: &UserId, daten: CallIceDaten) -> Zustellung {
        let Some(ziel) = self.registry.sender_von(&daten.to) else {
            self.broadcaster.verworfen("ziel_offline");
            return Zustellung::Verworfen;
        };

        if !self.tracker.ice(von, &daten.to) {
            tracing::debug!(von = %von, an = %daten.to, "ICE-Kandidat ohne laufenden Anruf");
            self.broadcaster.verworfen("kein_anruf");
            return Zustellung::Verworfen;
        }

        self.broadcaster.direkt_senden(
            &ziel,
            ServerEvent::CallIceCandidate {
                from: von.clone(),
                candidate: daten.candidate,
            },
        );
        Zustellung::Zugestellt
    }

    /// `call:end` -> `call:end` beim Ziel
    ///
    /// Der Anrufzustand wird auch dann aufgeraeumt, wenn das Ziel schon
    /// offline ist.
    pub fn ende(&self, von: &UserId, daten: CallEndDaten) -> Zustellung {
        let vorher = self.tracker.ende(von, &daten.to);

        let Some(ziel) = self.registry.sender_von(&daten.to) else {
            self.broadcaster.verworfen("ziel_offline");
            return Zustellung::Verworfen;
        };

        let Some(vorher) = vorher else {
            tracing::debug!(von = %von, an = %daten.to, "Auflegen ohne laufenden Anruf");
            self.broadcaster.verworfen("kein_anruf");
            return Zustellung::Verworfen;
        };

        tracing::info!(
            von = %von,
            an = %daten.to,
            grund = %daten.reason,
            zustand = vorher.name(),
            "Anruf beendet"
        );
        self.broadcaster.direkt_senden(
            &ziel,
            ServerEvent::CallEnd {
                from: von.clone(),
                reason: daten.reason,
            },
        );
        Zustellung::Zugestellt
    }

    /// Vergisst alle Anrufe eines Benutzers; die Gegenseite wird nicht informiert
    pub fn teilnehmer_entfernen(&self, user_id: &UserId) {
        let entfernt = self.tracker.teilnehmer_entfernen(user_id);
        if entfernt > 0 {
            tracing::debug!(user_id = %user_id, anrufe = entfernt, "Anrufzustand aufgeraeumt");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Event-Broadcaster – Sendet Events an verbundene Clients
//!
//! Jede Verbindung besitzt eine begrenzte Send-Queue (`ClientSender`). Der
//! Broadcaster schlaegt Empfaenger in der `ConnectionRegistry` nach und
//! reiht Events nicht-blockierend ein. Zustellung ist fire-and-forget:
//! volle oder geschlossene Queues verwerfen das Event mit einem Log-Eintrag.
//!
//! ## Selektives Broadcasting
//! - An einen User: `an_user_senden`
//! - An alle ausser einen: `an_alle_ausser_senden`

use klingel_core::types::{UserId, VerbindungsId};
use klingel_observability::KlingelMetrics;
use klingel_protocol::ServerEvent;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

use crate::registry::ConnectionRegistry;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer einzelnen Verbindung
///
/// Das ist das `connectionHandle` eines Registry-Eintrags. Clone teilt
/// Queue und Trenn-Signal.
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub user_id: UserId,
    pub verbindungs_id: VerbindungsId,
    tx: mpsc::Sender<ServerEvent>,
    trenn_signal: Arc<Notify>,
}

impl ClientSender {
    /// Erstellt ein Handle fuer eine neue Verbindung
    pub fn neu(
        user_id: UserId,
        verbindungs_id: VerbindungsId,
        tx: mpsc::Sender<ServerEvent>,
    ) -> Self {
        Self {
            user_id,
            verbindungs_id,
            tx,
            trenn_signal: Arc::new(Notify::new()),
        }
    }

    /// Sendet ein Event nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, event: ServerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    event = event.name(),
                    "Send-Queue voll – Event verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(user_id = %self.user_id, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }

    /// Fordert den Verbindungs-Task auf, die Verbindung zu schliessen
    pub fn trennen(&self) {
        self.trenn_signal.notify_one();
    }

    /// Wartet bis `trennen` aufgerufen wurde
    pub async fn trennung_angefordert(&self) {
        self.trenn_signal.notified().await;
    }
}

// ---------------------------------------------------------------------------
// Zustellung
// ---------------------------------------------------------------------------

/// Was mit einer weitergeleiteten Nachricht passiert ist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zustellung {
    /// An genau einen Empfaenger eingereiht
    Zugestellt,
    /// An mehrere Empfaenger verteilt
    Verteilt(usize),
    /// Ziel nicht online, Absender wurde benachrichtigt
    ZielOffline,
    /// Still verworfen
    Verworfen,
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Event-Broadcaster fuer alle verbundenen Clients
///
/// Clone teilt die Registry. Zaehlt jedes eingereihte und jedes verworfene
/// Event in den Metriken.
#[derive(Clone)]
pub struct EventBroadcaster {
    registry: ConnectionRegistry,
    metriken: KlingelMetrics,
}

impl EventBroadcaster {
    /// Erstellt einen neuen EventBroadcaster ueber der Registry
    pub fn neu(registry: ConnectionRegistry, metriken: KlingelMetrics) -> Self {
        Self { registry, metriken }
    }

    /// Sendet ein Event direkt ueber ein Handle (ohne Registry-Lookup)
    pub fn direkt_senden(&self, sender: &ClientSender, event: ServerEvent) -> bool {
        let name = event.name();
        if sender.senden(event) {
            self.metriken.event_gesendet(name);
            true
        } else {
            self.metriken.event_verworfen("queue");
            false
        }
    }

    /// Sendet ein Event an einen einzelnen Benutzer
    ///
    /// Gibt `true` zurueck wenn der Benutzer gefunden und das Event eingereiht wurde.
    pub fn an_user_senden(&self, user_id: &UserId, event: ServerEvent) -> bool {
        match self.registry.sender_von(user_id) {
            Some(sender) => self.direkt_senden(&sender, event),
            None => {
                tracing::debug!(user_id = %user_id, event = event.name(), "Senden an unbekannten Client");
                false
            }
        }
    }

    /// Sendet ein Event an alle verbundenen Clients ausser einem
    ///
    /// Gibt die Anzahl der erfolgreichen Sendungen zurueck.
    pub fn an_alle_ausser_senden(&self, ausgeschlossen: &UserId, event: ServerEvent) -> usize {
        self.registry
            .alle_sender(Some(ausgeschlossen))
            .iter()
            .filter(|sender| self.direkt_senden(sender, event.clone()))
            .count()
    }

    /// Zaehlt ein Event, das mangels Ziel nicht zugestellt wurde
    pub fn verworfen(&self, grund: &str) {
        self.metriken.event_verworfen(grund);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

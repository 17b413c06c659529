//! Presence-Broadcaster – Online-Status und Screen-Share-Status
//!
//! Verbinden, Trennen und Screen-Share-Wechsel aendern die Registry und
//! benachrichtigen die uebrigen Clients. Jede dieser Operationen laeuft
//! komplett unter der Schreibsperre der Registry, damit Beobachter nie einen
//! Zwischenzustand sehen (z.B. `user-offline` vor `screen-share-stopped`).

use klingel_auth::Identitaet;
use klingel_core::types::{UserId, VerbindungsId};
use klingel_observability::KlingelMetrics;
use klingel_protocol::ServerEvent;

use crate::broadcast::{ClientSender, EventBroadcaster};
use crate::registry::{ConnectionRegistry, VerbindungsEintrag};

// ---------------------------------------------------------------------------
// Ergebnis
// ---------------------------------------------------------------------------

/// Ergebnis von `client_verbunden`
#[derive(Debug)]
pub struct Anmeldung {
    /// Ersetzte Verbindung desselben Benutzers
    pub ersetzt: Option<VerbindungsEintrag>,
    /// Anzahl Clients, die `user-online` erhalten haben
    pub benachrichtigt: usize,
}

// ---------------------------------------------------------------------------
// PresenceManager
// ---------------------------------------------------------------------------

/// Verwaltet den Online-Status aller verbundenen Clients
///
/// Clone teilt Registry und Broadcaster.
#[derive(Clone)]
pub struct PresenceManager {
    registry: ConnectionRegistry,
    broadcaster: EventBroadcaster,
    metriken: KlingelMetrics,
}

impl PresenceManager {
    pub fn neu(
        registry: ConnectionRegistry,
        broadcaster: EventBroadcaster,
        metriken: KlingelMetrics,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            metriken,
        }
    }

    /// Registriert eine authentifizierte Verbindung
    ///
    /// Der neue Client bekommt `online-users` (ohne sich selbst), alle anderen
    /// `user-online`. Ersetzt die Verbindung eine bestehende desselben
    /// Benutzers, erhaelt die alte `session-replaced` und wird getrennt; die
    /// anderen Clients sehen dabei keinen erneuten `user-online`.
    pub fn client_verbunden(&self, identitaet: &Identitaet, sender: ClientSender) -> Anmeldung {
        let _sperre = self.registry.schreibsperre();
        self.verbunden_gesperrt(identitaet, sender)
    }

    /// Wie `client_verbunden`; der Aufrufer haelt die Schreibsperre
    pub(crate) fn verbunden_gesperrt(
        &self,
        identitaet: &Identitaet,
        sender: ClientSender,
    ) -> Anmeldung {
        let user_id = &identitaet.user_id;

        let snapshot = self.registry.snapshot(Some(user_id));
        let ersetzt = self.registry.registrieren(
            user_id.clone(),
            sender.clone(),
            identitaet.anzeigename.clone(),
        );

        if let Some(alt) = &ersetzt {
            tracing::info!(
                user_id = %user_id,
                alte_verbindung = %alt.verbindungs_id(),
                neue_verbindung = %sender.verbindungs_id,
                "Verbindung ersetzt"
            );

            // Die Freigabe gehoerte zur alten Verbindung
            if self.registry.freigabe_beenden(user_id) {
                self.broadcaster.an_alle_ausser_senden(
                    user_id,
                    ServerEvent::ScreenShareStopped {
                        user_id: user_id.clone(),
                        username: alt.anzeigename.clone(),
                    },
                );
            }

            self.broadcaster.direkt_senden(
                &alt.sender,
                ServerEvent::SessionReplaced {
                    user_id: user_id.clone(),
                },
            );
            alt.sender.trennen();
        }

        self.broadcaster
            .direkt_senden(&sender, ServerEvent::OnlineUsers(snapshot));

        let benachrichtigt = if ersetzt.is_none() {
            tracing::info!(user_id = %user_id, username = %identitaet.anzeigename, "Client online");
            self.broadcaster.an_alle_ausser_senden(
                user_id,
                ServerEvent::UserOnline {
                    user_id: user_id.clone(),
                    username: identitaet.anzeigename.clone(),
                },
            )
        } else {
            0
        };

        self.gauges_aktualisieren();
        Anmeldung {
            ersetzt,
            benachrichtigt,
        }
    }

    /// Traegt eine getrennte Verbindung aus
    ///
    /// Teilte der Benutzer den Bildschirm, geht `screen-share-stopped` vor
    /// `user-offline` raus. Gehoert der Registry-Eintrag inzwischen einer
    /// neueren Verbindung, passiert nichts und es wird `false` zurueckgegeben.
    pub fn client_getrennt(&self, user_id: &UserId, verbindungs_id: VerbindungsId) -> bool {
        let _sperre = self.registry.schreibsperre();
        self.getrennt_gesperrt(user_id, verbindungs_id)
    }

    /// Wie `client_getrennt`; der Aufrufer haelt die Schreibsperre
    pub(crate) fn getrennt_gesperrt(&self, user_id: &UserId, verbindungs_id: VerbindungsId) -> bool {
        let eintrag = match self.registry.nachschlagen(user_id) {
            Some(e) if e.verbindungs_id() == verbindungs_id => e,
            _ => {
                tracing::debug!(
                    user_id = %user_id,
                    verbindung = %verbindungs_id,
                    "Veraltete Verbindung getrennt, Registry unveraendert"
                );
                return false;
            }
        };

        if self.registry.teilt_bildschirm(user_id) {
            self.broadcaster.an_alle_ausser_senden(
                user_id,
                ServerEvent::ScreenShareStopped {
                    user_id: user_id.clone(),
                    username: eintrag.anzeigename.clone(),
                },
            );
        }

        if self
            .registry
            .entfernen_wenn_verbindung(user_id, verbindungs_id)
            .is_none()
        {
            return false;
        }

        self.broadcaster.an_alle_ausser_senden(
            user_id,
            ServerEvent::UserOffline {
                user_id: user_id.clone(),
                username: eintrag.anzeigename.clone(),
            },
        );

        tracing::info!(user_id = %user_id, username = %eintrag.anzeigename, "Client offline");
        self.gauges_aktualisieren();
        true
    }

    /// Startet eine Bildschirmfreigabe
    ///
    /// Nur der Uebergang nicht-teilend -> teilend wird gemeldet.
    pub fn freigabe_starten(&self, user_id: &UserId) -> bool {
        let _sperre = self.registry.schreibsperre();
        let Some(eintrag) = self.registry.nachschlagen(user_id) else {
            return false;
        };
        if !self.registry.freigabe_starten(user_id) {
            return false;
        }

        tracing::info!(user_id = %user_id, "Screen-Share gestartet");
        self.broadcaster.an_alle_ausser_senden(
            user_id,
            ServerEvent::ScreenShareStarted {
                user_id: user_id.clone(),
                username: eintrag.anzeigename,
            },
        );
        self.gauges_aktualisieren();
        true
    }

    /// Beendet eine Bildschirmfreigabe
    pub fn freigabe_beenden(&self, user_id: &UserId) -> bool {
        let _sperre = self.registry.schreibsperre();
        let Some(eintrag) = self.registry.nachschlagen(user_id) else {
            return false;
        };
        if !self.registry.freigabe_beenden(user_id) {
            return false;
        }

        tracing::info!(user_id = %user_id, "Screen-Share beendet");
        self.broadcaster.an_alle_ausser_senden(
            user_id,
            ServerEvent::ScreenShareStopped {
                user_id: user_id.clone(),
                username: eintrag.anzeigename,
            },
        );
        self.gauges_aktualisieren();
        true
    }

    pub fn online_anzahl(&self) -> usize {
        self.registry.online_anzahl()
    }

    fn gauges_aktualisieren(&self) {
        self.metriken
            .verbundene_clients
            .set(self.registry.online_anzahl() as i64);
        self.metriken
            .screen_sharer
            .set(self.registry.teilende_anzahl() as i64);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

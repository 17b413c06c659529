//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt alle geteilten Services und Zustands-Manager, die sicher zwischen
//! tokio-Tasks geteilt werden koennen.

use klingel_auth::{Identitaet, TokenPruefer};
use klingel_core::types::{UserId, VerbindungsId};
use klingel_core::KlingelError;
use klingel_observability::{HealthState, KlingelMetrics};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

use crate::broadcast::{ClientSender, EventBroadcaster};
use crate::call_relay::CallRelay;
use crate::call_state::{AnrufModus, CallTracker};
use crate::direkt::DirektRelay;
use crate::presence::{Anmeldung, PresenceManager};
use crate::registry::ConnectionRegistry;
use crate::screen_share::ScreenShareRelay;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale gleichzeitige Verbindungen
    pub max_clients: u32,
    /// Ping-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Wartezeit auf Pong in Sekunden
    pub pong_timeout_sek: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Pruefung der Anruf-Nachrichten
    pub anruf_modus: AnrufModus,
    /// Intervall des Statistik-Logs in Sekunden (0 = aus)
    pub stats_intervall_sek: u64,
    /// Erlaubte CORS-Origins (leer = alle)
    pub cors_origins: Vec<String>,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "Klingel".to_string(),
            max_clients: 1024,
            keepalive_sek: 30,
            pong_timeout_sek: 10,
            send_queue_groesse: 64,
            anruf_modus: AnrufModus::Strict,
            stats_intervall_sek: 30,
            cors_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Naht zum Auth-Service
    pub pruefer: Arc<dyn TokenPruefer>,
    /// Wer ist verbunden
    pub registry: ConnectionRegistry,
    /// Event-Broadcaster (Nachrichten an Clients senden)
    pub broadcaster: EventBroadcaster,
    /// Online-Status und Screen-Share-Status
    pub presence: PresenceManager,
    /// 1:1-Anruf-Signaling
    pub anrufe: CallRelay,
    /// Bildschirmfreigaben
    pub screen_share: ScreenShareRelay,
    /// Direktnachrichten und Tipp-Anzeigen
    pub direkt: DirektRelay,
    /// Prometheus-Metriken
    pub metriken: KlingelMetrics,
    /// Health-Zustand fuer `/health`
    pub health: HealthState,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
    shutdown_tx: watch::Sender<bool>,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    pub fn neu(
        config: SignalingConfig,
        pruefer: Arc<dyn TokenPruefer>,
        metriken: KlingelMetrics,
        health: HealthState,
    ) -> Arc<Self> {
        let registry = ConnectionRegistry::neu();
        let broadcaster = EventBroadcaster::neu(registry.clone(), metriken.clone());
        let presence = PresenceManager::neu(registry.clone(), broadcaster.clone(), metriken.clone());
        let tracker = Arc::new(CallTracker::neu(config.anruf_modus));
        let anrufe = CallRelay::neu(registry.clone(), broadcaster.clone(), tracker);
        let screen_share = ScreenShareRelay::neu(presence.clone(), broadcaster.clone());
        let direkt = DirektRelay::neu(broadcaster.clone());
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            config: Arc::new(config),
            pruefer,
            registry,
            broadcaster,
            presence,
            anrufe,
            screen_share,
            direkt,
            metriken,
            health,
            start_time: Instant::now(),
            shutdown_tx,
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Prueft ob eine weitere Verbindung angenommen werden darf
    ///
    /// Ein Benutzer, der bereits verbunden ist, ersetzt nur seine Verbindung
    /// und zaehlt nicht gegen das Limit. Nur unter der Schreibsperre
    /// aussagekraeftig.
    fn zulassung_pruefen(&self, user_id: &UserId) -> klingel_core::Result<()> {
        if self.registry.ist_online(user_id) {
            return Ok(());
        }
        if self.registry.online_anzahl() >= self.config.max_clients as usize {
            return Err(KlingelError::ServerVoll);
        }
        Ok(())
    }

    /// Traegt eine authentifizierte Verbindung ein
    ///
    /// Limit-Pruefung, Registrierung und das Aufraeumen der Anrufe einer
    /// ersetzten Sitzung laufen unter derselben Schreibsperre.
    pub fn client_anmelden(
        &self,
        identitaet: &Identitaet,
        sender: ClientSender,
    ) -> klingel_core::Result<Anmeldung> {
        let anmeldung = {
            let _sperre = self.registry.schreibsperre();
            self.zulassung_pruefen(&identitaet.user_id)?;
            let anmeldung = self.presence.verbunden_gesperrt(identitaet, sender);
            if anmeldung.ersetzt.is_some() {
                // Die Peer-Verbindungen der alten Sitzung sind verloren
                self.anrufe.teilnehmer_entfernen(&identitaet.user_id);
            }
            anmeldung
        };
        self.anruf_gauge_aktualisieren();
        Ok(anmeldung)
    }

    /// Traegt eine getrennte Verbindung aus
    ///
    /// Gibt `false` zurueck wenn die Verbindung schon ersetzt war.
    pub fn client_abmelden(&self, user_id: &UserId, verbindungs_id: VerbindungsId) -> bool {
        let entfernt = {
            let _sperre = self.registry.schreibsperre();
            let entfernt = self.presence.getrennt_gesperrt(user_id, verbindungs_id);
            if entfernt {
                self.anrufe.teilnehmer_entfernen(user_id);
            }
            entfernt
        };
        if entfernt {
            self.anruf_gauge_aktualisieren();
        }
        entfernt
    }

    pub fn anruf_gauge_aktualisieren(&self) {
        self.metriken
            .aktive_anrufe
            .set(self.anrufe.tracker().anzahl() as i64);
    }

    /// Loest das Herunterfahren aller Verbindungen und Listener aus
    pub fn herunterfahren(&self) {
        self.health.herunterfahren_melden();
        self.shutdown_tx.send_replace(true);
    }

    /// Empfaenger fuer das Shutdown-Signal
    pub fn shutdown_abonnieren(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn faehrt_herunter(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

#[cfg(test)]
pub(crate) mod test_hilfen {
    use super::*;
    use klingel_auth::{AuthError, AuthResult};

    /// Akzeptiert jedes Token der Form `user:<id>` oder `user:<id>:<name>`
    pub struct TestPruefer;

    impl TokenPruefer for TestPruefer {
        fn pruefen(&self, token: &str) -> AuthResult<Identitaet> {
            let mut teile = token.splitn(3, ':');
            match (teile.next(), teile.next(), teile.next()) {
                (Some("user"), Some(id), name) if !id.is_empty() => {
                    Ok(Identitaet::neu(UserId::new(id), name.map(str::to_string)))
                }
                (Some("abgelaufen"), _, _) => Err(AuthError::TokenAbgelaufen),
                _ => Err(AuthError::TokenUngueltig("unbekanntes Test-Token".into())),
            }
        }
    }

    pub fn test_state(config: SignalingConfig) -> Arc<SignalingState> {
        let metriken = KlingelMetrics::neu().unwrap();
        let health = HealthState::neu(metriken.clone());
        SignalingState::neu(config, Arc::new(TestPruefer), metriken, health)
    }
}

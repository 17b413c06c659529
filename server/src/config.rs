//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist. Nur das JWT-Secret muss gesetzt werden, entweder in
//! `[auth]` oder ueber `KLINGEL_JWT_SECRET`.

use klingel_core::{KlingelError, Result};
use klingel_observability::logging::{log_format_gueltig, log_level_gueltig};
use klingel_signaling::{AnrufModus, SignalingConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Umgebungsvariable, die `auth.jwt_secret` ueberschreibt
pub const JWT_SECRET_ENV: &str = "KLINGEL_JWT_SECRET";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Token-Pruefung
    pub auth: AuthEinstellungen,
    /// Verbindungen und Anrufe
    pub signaling: SignalingEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Clients
    pub max_clients: u32,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Klingel".into(),
            max_clients: 1024,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer HTTP und WebSocket
    pub bind_adresse: String,
    /// Port fuer `/ws` und `/health`
    pub port: u16,
    /// Erlaubte CORS-Origins (leer = alle erlaubt)
    pub cors_origins: Vec<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 5000,
            cors_origins: vec!["http://localhost:5173".into()],
        }
    }
}

/// Token-Pruefung
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEinstellungen {
    /// Geteiltes HS256-Secret des Auth-Service
    pub jwt_secret: Option<String>,
}

/// Verbindungs- und Anruf-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// Ping-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Wartezeit auf Pong in Sekunden
    pub pong_timeout_sek: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// "strict" oder "permissive"
    pub anruf_modus: AnrufModus,
    /// Intervall des Statistik-Logs in Sekunden (0 = aus)
    pub stats_intervall_sek: u64,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        let standard = SignalingConfig::default();
        Self {
            keepalive_sek: standard.keepalive_sek,
            pong_timeout_sek: standard.pong_timeout_sek,
            send_queue_groesse: standard.send_queue_groesse,
            anruf_modus: standard.anruf_modus,
            stats_intervall_sek: standard.stats_intervall_sek,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    /// `KLINGEL_JWT_SECRET` ersetzt danach ein Secret aus der Datei.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };

        if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
            config.secret_setzen(secret);
        }
        Ok(config)
    }

    /// Parst eine Konfiguration aus einem TOML-String
    pub fn aus_toml(inhalt: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(inhalt)
    }

    fn secret_setzen(&mut self, secret: String) {
        if !secret.is_empty() {
            self.auth.jwt_secret = Some(secret);
        }
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> Result<()> {
        match self.auth.jwt_secret.as_deref() {
            None | Some("") => {
                return Err(KlingelError::konfiguration(format!(
                    "auth.jwt_secret fehlt (oder {JWT_SECRET_ENV} setzen)"
                )))
            }
            Some(_) => {}
        }
        if self.server.max_clients == 0 {
            return Err(KlingelError::konfiguration("server.max_clients muss > 0 sein"));
        }
        if self.signaling.send_queue_groesse == 0 {
            return Err(KlingelError::konfiguration(
                "signaling.send_queue_groesse muss > 0 sein",
            ));
        }
        if self.signaling.keepalive_sek == 0 {
            return Err(KlingelError::konfiguration(
                "signaling.keepalive_sek muss > 0 sein",
            ));
        }
        if !log_level_gueltig(&self.logging.level) {
            return Err(KlingelError::konfiguration(format!(
                "logging.level ungueltig: '{}'",
                self.logging.level
            )));
        }
        if !log_format_gueltig(&self.logging.format) {
            return Err(KlingelError::konfiguration(format!(
                "logging.format ungueltig: '{}'",
                self.logging.format
            )));
        }
        self.bind_adresse()?;
        Ok(())
    }

    /// Baut die Konfiguration des Signaling-Service
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            server_name: self.server.name.clone(),
            max_clients: self.server.max_clients,
            keepalive_sek: self.signaling.keepalive_sek,
            pong_timeout_sek: self.signaling.pong_timeout_sek,
            send_queue_groesse: self.signaling.send_queue_groesse,
            anruf_modus: self.signaling.anruf_modus,
            stats_intervall_sek: self.signaling.stats_intervall_sek,
            cors_origins: self.netzwerk.cors_origins.clone(),
        }
    }

    /// Bind-Adresse fuer `/ws` und `/health`
    pub fn bind_adresse(&self) -> Result<SocketAddr> {
        adresse_parsen(&self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    /// Bind-Adresse fuer den Observability-Server
    pub fn observability_bind_adresse(&self) -> Result<SocketAddr> {
        adresse_parsen(&self.netzwerk.bind_adresse, self.observability.port)
    }
}

fn adresse_parsen(host: &str, port: u16) -> Result<SocketAddr> {
    format!("{host}:{port}").parse().map_err(|e| {
        KlingelError::konfiguration(format!("ungueltige Bind-Adresse '{host}:{port}': {e}"))
    })
}

//! klingel-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Token-Pruefung, Metriken und den
//! Signaling-Server und stellt den Einstiegspunkt fuer `main` bereit.

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use klingel_auth::JwtPruefer;
use klingel_core::KlingelError;
use klingel_observability::{observability_server_starten, HealthState, KlingelMetrics};
use klingel_signaling::{SignalingServer, SignalingState};
use std::sync::Arc;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Konfiguration pruefen
    /// 2. Metriken, Health und Signaling-Zustand aufbauen
    /// 3. Observability-Server starten (falls aktiviert)
    /// 4. Signaling-Server bedienen bis Ctrl-C / SIGTERM
    pub async fn starten(self) -> Result<()> {
        self.config.validieren()?;

        let secret = self
            .config
            .auth
            .jwt_secret
            .as_deref()
            .ok_or_else(|| KlingelError::konfiguration("auth.jwt_secret fehlt"))?;
        let pruefer = Arc::new(JwtPruefer::neu(secret.as_bytes()));

        let metriken = KlingelMetrics::neu()?;
        let health = HealthState::neu(metriken.clone());
        let state = SignalingState::neu(
            self.config.signaling_config(),
            pruefer,
            metriken.clone(),
            health.clone(),
        );

        let bind_addr = self.config.bind_adresse()?;
        tracing::info!(
            server_name = %self.config.server.name,
            addr = %bind_addr,
            max_clients = self.config.server.max_clients,
            "Server startet"
        );

        if self.config.observability.aktiviert {
            let obs_addr = self.config.observability_bind_adresse()?;
            let shutdown_rx = state.shutdown_abonnieren();
            tokio::spawn(async move {
                if let Err(e) =
                    observability_server_starten(obs_addr, metriken, health, shutdown_rx).await
                {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            });
        }

        let signal_state = Arc::clone(&state);
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
            signal_state.herunterfahren();
        });

        SignalingServer::neu(state, bind_addr).starten().await?;
        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Wartet auf Ctrl-C oder (unter Unix) SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(fehler = %e, "Ctrl-C-Handler konnte nicht installiert werden");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(fehler = %e, "SIGTERM-Handler konnte nicht installiert werden");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm => {}
    }
}

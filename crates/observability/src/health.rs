//! Health-Check-Endpunkt fuer Klingel
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Anzahl verbundener Clients

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::KlingelMetrics;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Server faehrt herunter
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub online_clients: i64,
    pub screen_sharers: i64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    faehrt_herunter: Arc<AtomicBool>,
    metriken: KlingelMetrics,
}

impl HealthState {
    pub fn neu(metriken: KlingelMetrics) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            faehrt_herunter: Arc::new(AtomicBool::new(false)),
            metriken,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Markiert den Server als herunterfahrend (`/health` liefert dann 503)
    pub fn herunterfahren_melden(&self) {
        self.faehrt_herunter.store(true, Ordering::Relaxed);
    }

    pub fn faehrt_herunter(&self) -> bool {
        self.faehrt_herunter.load(Ordering::Relaxed)
    }

    pub fn antwort(&self) -> HealthResponse {
        let status = if self.faehrt_herunter() {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };
        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            online_clients: self.metriken.verbundene_clients.get(),
            screen_sharers: self.metriken.screen_sharer.get(),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.antwort();
    let http_status = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> HealthState {
        HealthState::neu(KlingelMetrics::neu().unwrap())
    }

    #[test]
    fn health_state_uptime_frisch() {
        assert!(state().uptime_seconds() < 5);
    }

    #[test]
    fn antwort_liest_gauges() {
        let metriken = KlingelMetrics::neu().unwrap();
        let state = HealthState::neu(metriken.clone());
        metriken.verbundene_clients.set(7);
        metriken.screen_sharer.set(2);

        let antwort = state.antwort();
        assert_eq!(antwort.status, HealthStatus::Healthy);
        assert_eq!(antwort.online_clients, 7);
        assert_eq!(antwort.screen_sharers, 2);
    }

    #[test]
    fn herunterfahren_macht_unhealthy() {
        let state = state();
        assert!(!state.faehrt_herunter());
        state.herunterfahren_melden();
        assert_eq!(state.antwort().status, HealthStatus::Unhealthy);
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
            online_clients: 4,
            screen_sharers: 1,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"uptime_seconds\":3600"));
        assert!(json.contains("\"online_clients\":4"));
    }

    #[test]
    fn health_response_deserialisierung() {
        let json = r#"{"status":"unhealthy","version":"0.1.0","uptime_seconds":100,"online_clients":0,"screen_sharers":0}"#;
        let response: HealthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, HealthStatus::Unhealthy);
        assert_eq!(response.uptime_seconds, 100);
    }
}

//! Prometheus-kompatible Metriken fuer Klingel
//!
//! Registrierte Metriken:
//! - `klingel_connected_clients` – Gauge: Aktuell verbundene Clients
//! - `klingel_screen_sharers` – Gauge: Clients, die gerade den Bildschirm teilen
//! - `klingel_active_calls` – Gauge: Verfolgte Anrufe
//! - `klingel_events_sent_total` – Counter: Eingereihte Events (event)
//! - `klingel_events_dropped_total` – Counter: Verworfene Events (grund)
//! - `klingel_call_rejections_total` – Counter: Abgelehnte Anruf-Nachrichten (code)
//! - `klingel_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `klingel_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Alle Klingel-Prometheus-Metriken
///
/// Clone teilt die Registry.
#[derive(Clone)]
pub struct KlingelMetrics {
    pub registry: Arc<Registry>,

    // Presence
    pub verbundene_clients: IntGauge,
    pub screen_sharer: IntGauge,
    pub aktive_anrufe: IntGauge,

    // Relay
    pub events_gesendet: IntCounterVec,
    pub events_verworfen: IntCounterVec,
    pub anruf_ablehnungen: IntCounterVec,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl KlingelMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Presence ---
        let verbundene_clients = IntGauge::with_opts(Opts::new(
            "klingel_connected_clients",
            "Anzahl aktuell verbundener Clients",
        ))?;
        registry.register(Box::new(verbundene_clients.clone()))?;

        let screen_sharer = IntGauge::with_opts(Opts::new(
            "klingel_screen_sharers",
            "Anzahl Clients, die den Bildschirm teilen",
        ))?;
        registry.register(Box::new(screen_sharer.clone()))?;

        let aktive_anrufe = IntGauge::with_opts(Opts::new(
            "klingel_active_calls",
            "Anzahl verfolgter Anrufe",
        ))?;
        registry.register(Box::new(aktive_anrufe.clone()))?;

        // --- Relay ---
        let events_gesendet = IntCounterVec::new(
            Opts::new("klingel_events_sent_total", "An Clients eingereihte Events"),
            &["event"],
        )?;
        registry.register(Box::new(events_gesendet.clone()))?;

        let events_verworfen = IntCounterVec::new(
            Opts::new("klingel_events_dropped_total", "Verworfene Events"),
            &["grund"],
        )?;
        registry.register(Box::new(events_verworfen.clone()))?;

        let anruf_ablehnungen = IntCounterVec::new(
            Opts::new(
                "klingel_call_rejections_total",
                "Abgelehnte Anruf-Nachrichten",
            ),
            &["code"],
        )?;
        registry.register(Box::new(anruf_ablehnungen.clone()))?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new("klingel_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "klingel_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            verbundene_clients,
            screen_sharer,
            aktive_anrufe,
            events_gesendet,
            events_verworfen,
            anruf_ablehnungen,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Zaehlt ein eingereihtes Event
    pub fn event_gesendet(&self, event: &str) {
        self.events_gesendet.with_label_values(&[event]).inc();
    }

    /// Zaehlt ein verworfenes Event
    pub fn event_verworfen(&self, grund: &str) {
        self.events_verworfen.with_label_values(&[grund]).inc();
    }

    /// Zaehlt eine abgelehnte Anruf-Nachricht
    pub fn anruf_abgelehnt(&self, code: &str) {
        self.anruf_ablehnungen.with_label_values(&[code]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: KlingelMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(
    axum::extract::State(metriken): axum::extract::State<KlingelMetrics>,
) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

//! Request-Timing Middleware fuer Axum
//!
//! Misst die Antwortzeit jeder HTTP-Anfrage und protokolliert sie als
//! strukturiertes Log-Event und als Prometheus-Histogramm.
//!
//! Geloggt wird nur der Pfad. Die Query kann ein Token enthalten
//! (`/ws?token=...`) und taucht deshalb nirgends auf.

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    middleware::Next,
};
use std::time::Instant;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::TraceLayer;

use crate::metrics::KlingelMetrics;

/// Span-Konstruktor fuer den TraceLayer
pub type SpanFn = fn(&Request<Body>) -> tracing::Span;

fn span_ohne_query(req: &Request<Body>) -> tracing::Span {
    tracing::info_span!("http", method = %req.method(), path = %req.uri().path())
}

/// TraceLayer, dessen Spans keine Query-Parameter enthalten
pub fn request_trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, SpanFn> {
    TraceLayer::new_for_http().make_span_with(span_ohne_query as SpanFn)
}

/// Axum-Middleware-Funktion: misst Antwortzeit, loggt und zaehlt.
///
/// Verwendung:
/// ```ignore
/// Router::new()
///     .route("/", get(handler))
///     .layer(axum::middleware::from_fn_with_state(metriken, timing_middleware))
/// ```
pub async fn timing_middleware(
    State(metriken): State<KlingelMetrics>,
    req: Request<Body>,
    next: Next,
) -> Response<Body> {
    let methode = req.method().to_string();
    let pfad = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let dauer = start.elapsed();
    let status = response.status().as_u16();

    metriken
        .http_requests_total
        .with_label_values(&[&methode, &pfad, &status.to_string()])
        .inc();
    metriken
        .http_request_duration_seconds
        .with_label_values(&[&methode, &pfad])
        .observe(dauer.as_secs_f64());

    tracing::debug!(
        method = %methode,
        path = %pfad,
        status = status,
        duration_ms = dauer.as_millis() as u64,
        bucket = dauer_bucket(dauer.as_millis() as u64),
        "HTTP-Anfrage abgeschlossen"
    );

    response
}

/// Grobe Einordnung einer Dauer (in ms) fuer Log-Zeilen
pub fn dauer_bucket(dauer_ms: u64) -> &'static str {
    match dauer_ms {
        0..=1 => "<=1ms",
        2..=5 => "<=5ms",
        6..=10 => "<=10ms",
        11..=25 => "<=25ms",
        26..=50 => "<=50ms",
        51..=100 => "<=100ms",
        101..=250 => "<=250ms",
        251..=500 => "<=500ms",
        501..=1000 => "<=1s",
        _ => ">1s",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_grenzen() {
        assert_eq!(dauer_bucket(0), "<=1ms");
        assert_eq!(dauer_bucket(5), "<=5ms");
        assert_eq!(dauer_bucket(25), "<=25ms");
        assert_eq!(dauer_bucket(1000), "<=1s");
        assert_eq!(dauer_bucket(1001), ">1s");
    }

    #[test]
    fn span_enthaelt_keine_query() {
        let req = Request::builder()
            .uri("/ws?token=geheim")
            .body(Body::empty())
            .unwrap();
        // Span-Felder sind nicht direkt lesbar; Pfad-Extraktion pruefen
        assert_eq!(req.uri().path(), "/ws");
        let _span = span_ohne_query(&req);
    }
}

//! HTTP-Listener – Bindet Socket, bedient WebSocket-Upgrades
//!
//! Der `SignalingServer` baut den Axum-Router (`/ws`, `/health`), bindet
//! den Listener und laeuft bis zum Shutdown-Signal. Nebenher schreibt ein
//! Task periodisch eine Statistik-Zeile ins Log.

use axum::{http::HeaderValue, middleware, routing::get, Router};
use klingel_observability::{health_router, request_trace_layer, timing_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::error::SignalingResult;
use crate::server_state::SignalingState;
use crate::ws::ws_handler;

/// WebSocket-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
    bind_addr: SocketAddr,
}

impl SignalingServer {
    /// Erstellt einen neuen SignalingServer
    pub fn neu(state: Arc<SignalingState>, bind_addr: SocketAddr) -> Self {
        Self { state, bind_addr }
    }

    /// Baut den Router mit allen Endpunkten und Layern
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .with_state(Arc::clone(&self.state))
            .merge(health_router(self.state.health.clone()))
            .layer(middleware::from_fn_with_state(
                self.state.metriken.clone(),
                timing_middleware,
            ))
            .layer(request_trace_layer())
            .layer(cors_layer(&self.state.config.cors_origins))
    }

    /// Bindet den Listener an die konfigurierte Adresse
    pub async fn binden(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(self.bind_addr).await
    }

    /// Bindet und bedient Verbindungen bis zum Shutdown
    pub async fn starten(self) -> SignalingResult<()> {
        let listener = self.binden().await?;
        self.bedienen(listener).await
    }

    /// Bedient Verbindungen auf einem bereits gebundenen Listener
    ///
    /// Laeuft bis `SignalingState::herunterfahren` aufgerufen wird.
    pub async fn bedienen(self, listener: TcpListener) -> SignalingResult<()> {
        let lokale_addr = listener.local_addr()?;
        tracing::info!(
            server_name = %self.state.config.server_name,
            addr = %lokale_addr,
            max_clients = self.state.config.max_clients,
            anruf_modus = ?self.state.config.anruf_modus,
            "Signaling-Server gestartet"
        );

        let stats_task = tokio::spawn(statistik_loop(Arc::clone(&self.state)));

        let mut shutdown_rx = self.state.shutdown_abonnieren();
        let app = self.router();
        let ergebnis = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
            tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
        })
        .await;

        stats_task.abort();
        tracing::info!("Signaling-Server gestoppt");
        Ok(ergebnis?)
    }

    /// Gibt die konfigurierte Bind-Adresse zurueck
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let erlaubt: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ungueltiger CORS-Origin ignoriert");
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if erlaubt.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(erlaubt))
    }
}

/// Schreibt periodisch die Anzahl verbundener Clients und Screen-Sharer
async fn statistik_loop(state: Arc<SignalingState>) {
    if state.config.stats_intervall_sek == 0 {
        return;
    }
    let mut intervall = tokio::time::interval(Duration::from_secs(state.config.stats_intervall_sek));
    // Erster Tick kommt sofort
    intervall.tick().await;

    loop {
        intervall.tick().await;
        tracing::info!(
            online = state.registry.online_anzahl(),
            screen_sharer = state.registry.teilende_anzahl(),
            anrufe = state.anrufe.tracker().anzahl(),
            uptime_sek = state.uptime_sek(),
            "Statistik"
        );
    }
}

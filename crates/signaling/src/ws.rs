//! WebSocket-Upgrade mit Token-Pruefung
//!
//! `GET /ws?token=<jwt>[&userId=<id>]`
//!
//! Das Upgrade wird immer angenommen. Schlaegt die Pruefung fehl, wird die
//! Verbindung sofort mit einem Close-Code geschlossen, ohne dass ein
//! Registry-Eintrag entsteht. Das Client-Limit prueft `ClientConnection`
//! bei der Anmeldung.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    response::Response,
};
use klingel_auth::AuthError;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::connection::{close_code, ClientConnection};
use crate::server_state::SignalingState;

/// Query-Parameter des Upgrade-Requests
#[derive(Debug, Default, Deserialize)]
pub struct VerbindungsAnfrage {
    pub token: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// `GET /ws`
pub async fn ws_handler(
    State(state): State<Arc<SignalingState>>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    Query(anfrage): Query<VerbindungsAnfrage>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| verbindung_annehmen(state, socket, anfrage, Some(peer_addr)))
}

async fn verbindung_annehmen(
    state: Arc<SignalingState>,
    socket: WebSocket,
    anfrage: VerbindungsAnfrage,
    peer_addr: Option<SocketAddr>,
) {
    let identitaet = match state
        .pruefer
        .verbindung_pruefen(anfrage.token.as_deref(), anfrage.user_id.as_deref())
    {
        Ok(identitaet) => identitaet,
        Err(e) => {
            tracing::warn!(peer = ?peer_addr, fehler = %e, "Authentifizierung fehlgeschlagen");
            let grund = match e {
                AuthError::TokenAbgelaufen => "Token abgelaufen",
                _ => "Authentifizierung fehlgeschlagen",
            };
            schliessen(socket, e.close_code(), grund).await;
            return;
        }
    };

    if state.faehrt_herunter() {
        schliessen(socket, close_code::GOING_AWAY, "Server wird heruntergefahren").await;
        return;
    }

    let shutdown_rx = state.shutdown_abonnieren();
    ClientConnection::neu(state, identitaet, peer_addr)
        .verarbeiten(socket, shutdown_rx)
        .await;
}

async fn schliessen(mut socket: WebSocket, code: u16, grund: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: grund.into(),
        })))
        .await;
}

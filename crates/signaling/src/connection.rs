//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede authentifizierte Verbindung bekommt eine `ClientConnection` in einem
//! eigenen tokio-Task. Eingehende Text-Frames gehen an den Dispatcher,
//! ausgehende Events kommen ueber die Send-Queue der Verbindung.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Jedes empfangene Frame (Pong oder Nachricht) schiebt die Frist auf
//!   `jetzt + keepalive_sek + pong_timeout_sek`; laeuft sie ab, wird die
//!   Verbindung mit 4008 getrennt
//!
//! ## Ende der Verbindung
//! Client schliesst, Timeout, Shutdown oder Ersetzung durch eine neuere
//! Verbindung. In jedem Fall laeuft danach `client_cleanup`.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use klingel_auth::Identitaet;
use klingel_core::types::VerbindungsId;
use klingel_protocol::{ErrorCode, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use crate::broadcast::ClientSender;
use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::server_state::SignalingState;

/// Close-Codes der Verbindung
pub mod close_code {
    /// Normale Trennung
    pub const NORMAL: u16 = 1000;
    /// Server faehrt herunter
    pub const GOING_AWAY: u16 = 1001;
    /// Verbindung wurde durch eine neuere desselben Benutzers ersetzt
    pub const SESSION_ERSETZT: u16 = 4000;
    /// Token abgelaufen
    pub const TOKEN_ABGELAUFEN: u16 = 4001;
    /// Token fehlt oder ist ungueltig
    pub const TOKEN_UNGUELTIG: u16 = 4002;
    /// Server ist voll
    pub const SERVER_VOLL: u16 = 4003;
    /// Keepalive-Timeout
    pub const TIMEOUT: u16 = 4008;
}

type WsSender = SplitSink<WebSocket, Message>;

/// Warum die Schleife beendet wurde
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ende {
    ClientGetrennt,
    Timeout,
    Ersetzt,
    Shutdown,
    SendeFehler,
}

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne authentifizierte WebSocket-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    identitaet: Identitaet,
    peer_addr: Option<SocketAddr>,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection
    pub fn neu(
        state: Arc<SignalingState>,
        identitaet: Identitaet,
        peer_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            state,
            identitaet,
            peer_addr,
        }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird oder ein Shutdown-Signal
    /// eingeht.
    pub async fn verarbeiten(self, socket: WebSocket, mut shutdown_rx: watch::Receiver<bool>) {
        let user_id = self.identitaet.user_id.clone();
        let keepalive = Duration::from_secs(self.state.config.keepalive_sek.max(1));
        let timeout_dauer = keepalive + Duration::from_secs(self.state.config.pong_timeout_sek);

        let verbindungs_id = VerbindungsId::new();
        let (sende_tx, mut sende_rx) =
            mpsc::channel::<ServerEvent>(self.state.config.send_queue_groesse.max(1));
        let sender = ClientSender::neu(user_id.clone(), verbindungs_id, sende_tx);

        tracing::info!(
            user_id = %user_id,
            verbindung = %verbindungs_id,
            peer = ?self.peer_addr,
            "Neue Verbindung"
        );

        let (mut ws_tx, mut ws_rx) = socket.split();

        // Erst registrieren, dann bestaetigen: online-users liegt schon in der Queue
        if let Err(e) = self.state.client_anmelden(&self.identitaet, sender.clone()) {
            tracing::warn!(user_id = %user_id, fehler = %e, "Verbindung abgelehnt");
            let _ = ws_tx
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::SERVER_VOLL,
                    reason: "Server ist voll".into(),
                })))
                .await;
            return;
        }
        self.state.broadcaster.direkt_senden(
            &sender,
            ServerEvent::ConnectionConfirmed {
                user_id: user_id.clone(),
                username: self.identitaet.anzeigename.clone(),
                timestamp: Utc::now(),
            },
        );

        let ctx = DispatcherContext {
            user_id: user_id.clone(),
            anzeigename: self.identitaet.anzeigename.clone(),
            verbindungs_id,
            sender: sender.clone(),
        };
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        let frist = sleep_until(Instant::now() + timeout_dauer);
        tokio::pin!(frist);
        let mut ping_intervall = interval_at(Instant::now() + keepalive, keepalive);
        ping_intervall.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ende = loop {
            tokio::select! {
                // Eingehendes Frame vom Client
                frame = ws_rx.next() => {
                    let nachricht = match frame {
                        Some(Ok(nachricht)) => nachricht,
                        Some(Err(e)) => {
                            tracing::warn!(user_id = %user_id, fehler = %e, "Lesefehler");
                            break Ende::ClientGetrennt;
                        }
                        None => break Ende::ClientGetrennt,
                    };
                    frist.as_mut().reset(Instant::now() + timeout_dauer);

                    match nachricht {
                        Message::Text(text) => dispatcher.frame_verarbeiten(&text, &ctx),
                        Message::Binary(_) => {
                            self.state.broadcaster.direkt_senden(
                                &sender,
                                ServerEvent::fehler(
                                    ErrorCode::InvalidRequest,
                                    "Binaer-Frames werden nicht unterstuetzt",
                                ),
                            );
                        }
                        Message::Ping(_) | Message::Pong(_) => {}
                        Message::Close(_) => break Ende::ClientGetrennt,
                    }
                }

                // Ausgehendes Event aus der Send-Queue
                Some(event) = sende_rx.recv() => {
                    if !event_schreiben(&mut ws_tx, &event).await {
                        break Ende::SendeFehler;
                    }
                }

                // Keepalive-Ping
                _ = ping_intervall.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                        break Ende::SendeFehler;
                    }
                }

                // Seit keepalive + pong_timeout nichts empfangen
                _ = &mut frist => {
                    tracing::warn!(user_id = %user_id, "Keepalive-Timeout");
                    break Ende::Timeout;
                }

                // Neuere Verbindung desselben Benutzers
                _ = sender.trennung_angefordert() => break Ende::Ersetzt,

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break Ende::Shutdown;
                    }
                }
            }
        };

        // Was schon in der Queue liegt (z.B. session-replaced) noch zustellen
        if matches!(ende, Ende::Ersetzt | Ende::Shutdown) {
            while let Ok(event) = sende_rx.try_recv() {
                if !event_schreiben(&mut ws_tx, &event).await {
                    break;
                }
            }
        }

        let (code, grund) = match ende {
            Ende::ClientGetrennt | Ende::SendeFehler => (close_code::NORMAL, ""),
            Ende::Timeout => (close_code::TIMEOUT, "Keepalive-Timeout"),
            Ende::Ersetzt => (close_code::SESSION_ERSETZT, "Sitzung ersetzt"),
            Ende::Shutdown => (close_code::GOING_AWAY, "Server wird heruntergefahren"),
        };
        if ende != Ende::SendeFehler {
            let _ = ws_tx
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: grund.into(),
                })))
                .await;
        }

        dispatcher.client_cleanup(&ctx);
        tracing::info!(user_id = %user_id, verbindung = %verbindungs_id, grund = ?ende, "Verbindung beendet");
    }
}

/// Serialisiert ein Event und schreibt es als Text-Frame
///
/// Gibt `false` zurueck wenn der Socket nicht mehr beschreibbar ist.
async fn event_schreiben(ws_tx: &mut WsSender, event: &ServerEvent) -> bool {
    match event.to_json() {
        Ok(text) => ws_tx.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            tracing::error!(event = event.name(), fehler = %e, "Event-Serialisierung fehlgeschlagen");
            true
        }
    }
}

//! Message-Dispatcher – Routet Client-Events an die Relays
//!
//! Der Dispatcher parst ein Text-Frame, bestimmt den zustaendigen Relay und
//! meldet Fehler an den Absender:
//! - Unlesbare Frames -> `error` (Verbindung bleibt offen)
//! - Abgelehnte `call:offer` / `call:answer` -> `call:error`
//!
//! Alle anderen Fehlschlaege (Ziel offline, kein laufender Anruf) werden
//! still verworfen.

use klingel_core::types::{UserId, VerbindungsId};
use klingel_protocol::{ClientEvent, ServerEvent};
use std::sync::Arc;

use crate::broadcast::{ClientSender, Zustellung};
use crate::error::SignalingError;
use crate::server_state::SignalingState;

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
#[derive(Debug, Clone)]
pub struct DispatcherContext {
    /// Authentifizierte User-ID
    pub user_id: UserId,
    /// Anzeigename aus dem Token
    pub anzeigename: String,
    /// Id dieser Verbindung (Reconnect-Erkennung)
    pub verbindungs_id: VerbindungsId,
    /// Eigene Send-Queue fuer Fehlerantworten
    pub sender: ClientSender,
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet ein Text-Frame vom Client
    pub fn frame_verarbeiten(&self, text: &str, ctx: &DispatcherContext) {
        match ClientEvent::aus_json(text) {
            Ok(event) => {
                self.dispatch(event, ctx);
            }
            Err(e) => {
                tracing::warn!(user_id = %ctx.user_id, fehler = %e, "Ungueltiges Frame");
                self.state
                    .broadcaster
                    .direkt_senden(&ctx.sender, ServerEvent::fehler(e.code(), e.to_string()));
            }
        }
    }

    /// Leitet ein geparstes Event weiter
    pub fn dispatch(&self, event: ClientEvent, ctx: &DispatcherContext) -> Zustellung {
        let von = &ctx.user_id;
        let name = event.name();
        tracing::trace!(user_id = %von, event = name, "Event empfangen");

        let zustellung = match event {
            // -------------------------------------------------------------------
            // Anrufe
            // -------------------------------------------------------------------
            ClientEvent::CallOffer(daten) => {
                let to = daten.to.clone();
                let ergebnis = self.state.anrufe.angebot(von, daten);
                self.state.anruf_gauge_aktualisieren();
                self.anruf_ergebnis(ergebnis, to, ctx)
            }
            ClientEvent::CallAnswer(daten) => {
                let to = daten.to.clone();
                let ergebnis = self.state.anrufe.antwort(von, daten);
                self.anruf_ergebnis(ergebnis, to, ctx)
            }
            ClientEvent::CallIceCandidate(daten) => self.state.anrufe.ice(von, daten),
            ClientEvent::CallEnd(daten) => {
                let z = self.state.anrufe.ende(von, daten);
                self.state.anruf_gauge_aktualisieren();
                z
            }

            // -------------------------------------------------------------------
            // Screen-Share
            // -------------------------------------------------------------------
            ClientEvent::StartScreenShare => {
                if self.state.screen_share.starten(von) {
                    Zustellung::Verteilt(self.state.registry.online_anzahl().saturating_sub(1))
                } else {
                    Zustellung::Verworfen
                }
            }
            ClientEvent::StopScreenShare => {
                if self.state.screen_share.beenden(von) {
                    Zustellung::Verteilt(self.state.registry.online_anzahl().saturating_sub(1))
                } else {
                    Zustellung::Verworfen
                }
            }
            ClientEvent::ScreenShareOffer(daten) => {
                self.state.screen_share.angebot(von, &ctx.anzeigename, daten)
            }
            ClientEvent::ScreenShareAnswer(daten) => {
                self.state.screen_share.antwort(von, &ctx.anzeigename, daten)
            }
            ClientEvent::ScreenShareIce(daten) => {
                self.state.screen_share.ice(von, &ctx.anzeigename, daten)
            }

            // -------------------------------------------------------------------
            // Direktnachrichten & Typing
            // -------------------------------------------------------------------
            ClientEvent::SendMessage(nachricht) => self.state.direkt.nachricht(von, nachricht),
            ClientEvent::TypingStart(daten) => {
                self.state.direkt.tippen(von, &ctx.anzeigename, daten, true)
            }
            ClientEvent::TypingStop(daten) => {
                self.state.direkt.tippen(von, &ctx.anzeigename, daten, false)
            }
        };

        tracing::trace!(user_id = %von, event = name, ergebnis = ?zustellung, "Event verarbeitet");
        zustellung
    }

    /// Meldet abgelehnte Anruf-Nachrichten als `call:error` an den Absender
    fn anruf_ergebnis(
        &self,
        ergebnis: Result<Zustellung, SignalingError>,
        to: UserId,
        ctx: &DispatcherContext,
    ) -> Zustellung {
        match ergebnis {
            Ok(z) => z,
            Err(e) => {
                let code = e.code();
                tracing::info!(user_id = %ctx.user_id, an = %to, fehler = %e, "Anruf-Nachricht abgelehnt");
                self.state.metriken.anruf_abgelehnt(code.as_str());
                self.state.broadcaster.direkt_senden(
                    &ctx.sender,
                    ServerEvent::CallError {
                        to,
                        code,
                        message: e.to_string(),
                    },
                );
                Zustellung::Verworfen
            }
        }
    }

    /// Raeumt nach dem Ende einer Verbindung auf
    pub fn client_cleanup(&self, ctx: &DispatcherContext) {
        if self.state.client_abmelden(&ctx.user_id, ctx.verbindungs_id) {
            tracing::debug!(user_id = %ctx.user_id, "Client-Cleanup abgeschlossen");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_state::AnrufModus;
    use crate::server_state::test_hilfen::test_state;
    use crate::server_state::SignalingConfig;
    use klingel_auth::Identitaet;
    use klingel_protocol::ErrorCode;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Client {
        ctx: DispatcherContext,
        rx: mpsc::Receiver<ServerEvent>,
    }

    impl Client {
        fn events(&mut self) -> Vec<ServerEvent> {
            let mut v = Vec::new();
            while let Ok(e) = self.rx.try_recv() {
                v.push(e);
            }
            v
        }
    }

    fn verbinden(state: &Arc<SignalingState>, name: &str) -> Client {
        let (tx, rx) = mpsc::channel(32);
        let identitaet = Identitaet::neu(UserId::new(name), Some(name.to_uppercase()));
        let verbindungs_id = VerbindungsId::new();
        let sender = ClientSender::neu(identitaet.user_id.clone(), verbindungs_id, tx);
        state.client_anmelden(&identitaet, sender.clone()).unwrap();
        Client {
            ctx: DispatcherContext {
                user_id: identitaet.user_id,
                anzeigename: identitaet.anzeigename,
                verbindungs_id,
                sender,
            },
            rx,
        }
    }

    fn frame(event: &str, data: serde_json::Value) -> String {
        json!({"event": event, "data": data}).to_string()
    }

    fn aufbau(modus: AnrufModus) -> (Arc<SignalingState>, MessageDispatcher, Client, Client) {
        let state = test_state(SignalingConfig {
            anruf_modus: modus,
            ..Default::default()
        });
        let dispatcher = MessageDispatcher::neu(state.clone());
        let mut a = verbinden(&state, "a");
        let mut b = verbinden(&state, "b");
        a.events();
        b.events();
        (state, dispatcher, a, b)
    }

    #[test]
    fn ungueltiges_frame_meldet_fehler() {
        let (_state, d, mut a, _b) = aufbau(AnrufModus::Strict);
        d.frame_verarbeiten("{kein json", &a.ctx);
        d.frame_verarbeiten(&frame("gibt-es-nicht", json!({})), &a.ctx);

        let events = a.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            ServerEvent::Error {
                code: ErrorCode::InvalidRequest,
                ..
            }
        ));
        assert!(matches!(
            events[1],
            ServerEvent::Error {
                code: ErrorCode::UnknownEvent,
                ..
            }
        ));
    }

    #[test]
    fn absender_kommt_aus_der_identitaet() {
        let (_state, d, a, mut b) = aufbau(AnrufModus::Strict);
        d.frame_verarbeiten(
            &frame(
                "call:offer",
                json!({"to": "b", "from": "mallory", "offer": {}, "callType": "voice"}),
            ),
            &a.ctx,
        );

        match &b.events()[..] {
            [ServerEvent::CallIncoming { from, .. }] => assert_eq!(from, &UserId::new("a")),
            andere => panic!("unerwartet: {andere:?}"),
        }
    }

    #[test]
    fn abgelehnte_antwort_meldet_call_error() {
        let (state, d, mut a, mut b) = aufbau(AnrufModus::Strict);
        d.frame_verarbeiten(&frame("call:answer", json!({"to": "b", "answer": {}})), &a.ctx);

        assert!(b.events().is_empty());
        match &a.events()[..] {
            [ServerEvent::CallError { to, code, .. }] => {
                assert_eq!(to, &UserId::new("b"));
                assert_eq!(*code, ErrorCode::InvalidTransition);
            }
            andere => panic!("unerwartet: {andere:?}"),
        }
        assert_eq!(
            state
                .metriken
                .anruf_ablehnungen
                .with_label_values(&["INVALID_TRANSITION"])
                .get(),
            1
        );
    }

    #[test]
    fn permissive_leitet_antwort_ohne_angebot_weiter() {
        let (_state, d, a, mut b) = aufbau(AnrufModus::Permissive);
        d.frame_verarbeiten(&frame("call:answer", json!({"to": "b", "answer": {}})), &a.ctx);
        assert!(matches!(b.events()[..], [ServerEvent::CallAnswer { .. }]));
    }

    #[test]
    fn kompletter_anruf_ueber_dispatcher() {
        let (state, d, mut a, mut b) = aufbau(AnrufModus::Strict);

        d.frame_verarbeiten(
            &frame("call:offer", json!({"to": "b", "offer": {"sdp": 1}, "callType": "video"})),
            &a.ctx,
        );
        d.frame_verarbeiten(&frame("call:answer", json!({"to": "a", "answer": {"sdp": 2}})), &b.ctx);
        d.frame_verarbeiten(
            &frame("call:ice-candidate", json!({"to": "a", "candidate": {"c": 1}})),
            &b.ctx,
        );
        d.frame_verarbeiten(&frame("call:end", json!({"to": "b"})), &a.ctx);

        let bei_a = a.events();
        assert!(matches!(bei_a[0], ServerEvent::CallAnswer { .. }));
        assert!(matches!(bei_a[1], ServerEvent::CallIceCandidate { .. }));

        let bei_b = b.events();
        assert!(matches!(bei_b[0], ServerEvent::CallIncoming { .. }));
        match &bei_b[1] {
            ServerEvent::CallEnd { from, reason } => {
                assert_eq!(from, &UserId::new("a"));
                assert_eq!(reason, "ended");
            }
            andere => panic!("unerwartet: {andere:?}"),
        }
        assert_eq!(state.anrufe.tracker().anzahl(), 0);
    }

    #[test]
    fn screen_share_start_und_cleanup() {
        let (state, d, a, mut b) = aufbau(AnrufModus::Strict);
        d.frame_verarbeiten(&frame("start-screen-share", json!(null)), &a.ctx);
        assert!(state.registry.teilt_bildschirm(&UserId::new("a")));

        d.client_cleanup(&a.ctx);
        let events = b.events();
        assert!(matches!(events[0], ServerEvent::ScreenShareStarted { .. }));
        assert!(matches!(events[1], ServerEvent::ScreenShareStopped { .. }));
        assert!(matches!(events[2], ServerEvent::UserOffline { .. }));
        assert!(!state.registry.ist_online(&UserId::new("a")));
    }

    #[test]
    fn typing_und_nachricht() {
        let (_state, d, a, mut b) = aufbau(AnrufModus::Strict);
        d.frame_verarbeiten(&frame("typing-start", json!({"targetUserId": "b"})), &a.ctx);
        d.frame_verarbeiten(
            &frame("send-message", json!({"receiverId": "b", "text": "hi"})),
            &a.ctx,
        );

        let events = b.events();
        assert!(matches!(events[0], ServerEvent::UserTyping { .. }));
        assert!(matches!(events[1], ServerEvent::NewMessage(_)));
    }
}

//! Signaling-Protokoll (WebSocket, JSON)
//!
//! Definiert alle Events, die ueber die WebSocket-Verbindung zwischen
//! Client und Server ausgetauscht werden.
//!
//! ## Design
//! - Jedes Frame ist ein JSON-Objekt `{"event": "<name>", "data": <payload>}`
//! - Event-Namen und Feldnamen (camelCase) entsprechen dem Browser-Client
//! - SDP-Offers, Answers, ICE-Kandidaten und `callerInfo` sind opak und
//!   werden als `serde_json::Value` unveraendert weitergereicht
//! - `ClientEvent` wird manuell dispatcht, damit Events ohne Payload
//!   (`start-screen-share`) sowohl mit als auch ohne `data` akzeptiert werden

use chrono::{DateTime, Utc};
use klingel_core::types::{AnrufTyp, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Sentinel-Ziel fuer Screen-Share-Broadcasts
pub const ZIEL_ALLE: &str = "all";

/// Standard-Grund fuer `call:end` wenn der Client keinen mitschickt
pub const STANDARD_END_GRUND: &str = "ended";

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Fehler beim Parsen eines Client-Frames
#[derive(Debug, Error)]
pub enum ProtokollFehler {
    /// Frame ist kein gueltiges Envelope-JSON
    #[error("Ungueltiges JSON: {0}")]
    Json(#[source] serde_json::Error),

    /// Event-Name ist unbekannt
    #[error("Unbekanntes Event: {0}")]
    UnbekanntesEvent(String),

    /// Payload passt nicht zum Event
    #[error("Ungueltige Daten fuer '{event}': {quelle}")]
    UngueltigeDaten {
        event: String,
        #[source]
        quelle: serde_json::Error,
    },
}

impl ProtokollFehler {
    /// Fehler-Code fuer die `error`-Antwort an den Client
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnbekanntesEvent(_) => ErrorCode::UnknownEvent,
            Self::Json(_) | Self::UngueltigeDaten { .. } => ErrorCode::InvalidRequest,
        }
    }
}

/// Standardisierte Fehler-Codes fuer `error`- und `call:error`-Events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    UnknownEvent,
    /// Zwischen den beiden Teilnehmern laeuft bereits ein Anruf
    CallInProgress,
    /// Nachricht passt nicht zum aktuellen Anrufzustand
    InvalidTransition,
}

impl ErrorCode {
    /// Wire-Name, auch als Metrik-Label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::UnknownEvent => "UNKNOWN_EVENT",
            Self::CallInProgress => "CALL_IN_PROGRESS",
            Self::InvalidTransition => "INVALID_TRANSITION",
        }
    }
}

// ---------------------------------------------------------------------------
// Ziel-Adressierung
// ---------------------------------------------------------------------------

/// Ziel eines Screen-Share-Relays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ziel {
    /// Alle verbundenen Clients ausser dem Absender
    Alle,
    /// Genau ein Benutzer
    User(UserId),
}

impl Ziel {
    /// Fehlendes, leeres oder `"all"`-Ziel bedeutet Broadcast
    pub fn aus_feld(feld: Option<&str>) -> Self {
        match feld {
            None | Some("") | Some(ZIEL_ALLE) => Self::Alle,
            Some(id) => Self::User(UserId::new(id)),
        }
    }
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// `call:offer` – Anruf starten
///
/// Ein vom Client mitgeschicktes `from` wird ignoriert; der Absender ist
/// immer die authentifizierte Identitaet der Verbindung.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOfferDaten {
    pub to: UserId,
    pub offer: Value,
    pub call_type: AnrufTyp,
    #[serde(default)]
    pub caller_info: Option<Value>,
}

/// `call:answer`
#[derive(Debug, Clone, Deserialize)]
pub struct CallAnswerDaten {
    pub to: UserId,
    pub answer: Value,
}

/// `call:ice-candidate`
#[derive(Debug, Clone, Deserialize)]
pub struct CallIceDaten {
    pub to: UserId,
    pub candidate: Value,
}

/// `call:end` – Grund ist fuer den Relay opak
#[derive(Debug, Clone, Deserialize)]
pub struct CallEndDaten {
    pub to: UserId,
    #[serde(default = "standard_end_grund")]
    pub reason: String,
}

fn standard_end_grund() -> String {
    STANDARD_END_GRUND.to_string()
}

/// `screen-share-offer` – `userId` ist das Ziel (oder `"all"`)
#[derive(Debug, Clone, Deserialize)]
pub struct ScreenShareOfferDaten {
    #[serde(default, rename = "userId")]
    pub ziel: Option<String>,
    pub offer: Value,
}

impl ScreenShareOfferDaten {
    pub fn ziel(&self) -> Ziel {
        Ziel::aus_feld(self.ziel.as_deref())
    }
}

/// `screen-share-answer` – immer an genau einen Benutzer
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenShareAnswerDaten {
    pub user_id: UserId,
    pub answer: Value,
}

/// `ice-candidate` (Screen-Share) – `userId` ist das Ziel (oder `"all"`)
#[derive(Debug, Clone, Deserialize)]
pub struct ScreenShareIceDaten {
    #[serde(default, rename = "userId")]
    pub ziel: Option<String>,
    pub candidate: Value,
}

impl ScreenShareIceDaten {
    pub fn ziel(&self) -> Ziel {
        Ziel::aus_feld(self.ziel.as_deref())
    }
}

/// `typing-start` / `typing-stop`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingDaten {
    #[serde(default)]
    pub target_user_id: Option<UserId>,
}

/// `send-message` – Direktnachricht, Inhalt ist opak bis auf `receiverId`
#[derive(Debug, Clone)]
pub struct DirektNachricht {
    pub receiver_id: UserId,
    pub inhalt: Map<String, Value>,
}

impl DirektNachricht {
    fn aus_wert(event: &str, data: Value) -> Result<Self, ProtokollFehler> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Empfaenger {
            receiver_id: UserId,
        }

        let empfaenger: Empfaenger = daten(event, data.clone())?;
        let inhalt = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(Self {
            receiver_id: empfaenger.receiver_id,
            inhalt,
        })
    }
}

/// Alle Events, die ein Client senden kann
#[derive(Debug, Clone)]
pub enum ClientEvent {
    CallOffer(CallOfferDaten),
    CallAnswer(CallAnswerDaten),
    CallIceCandidate(CallIceDaten),
    CallEnd(CallEndDaten),
    StartScreenShare,
    StopScreenShare,
    ScreenShareOffer(ScreenShareOfferDaten),
    ScreenShareAnswer(ScreenShareAnswerDaten),
    ScreenShareIce(ScreenShareIceDaten),
    SendMessage(DirektNachricht),
    TypingStart(TypingDaten),
    TypingStop(TypingDaten),
}

#[derive(Debug, Deserialize)]
struct RohEnvelope {
    event: String,
    #[serde(default)]
    data: Value,
}

fn daten<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ProtokollFehler> {
    serde_json::from_value(data).map_err(|quelle| ProtokollFehler::UngueltigeDaten {
        event: event.to_string(),
        quelle,
    })
}

impl ClientEvent {
    /// Parst ein Text-Frame vom Client
    pub fn aus_json(text: &str) -> Result<Self, ProtokollFehler> {
        let roh: RohEnvelope = serde_json::from_str(text).map_err(ProtokollFehler::Json)?;
        Self::aus_envelope(&roh.event, roh.data)
    }

    fn aus_envelope(event: &str, data: Value) -> Result<Self, ProtokollFehler> {
        match event {
            "call:offer" => Ok(Self::CallOffer(daten(event, data)?)),
            "call:answer" => Ok(Self::CallAnswer(daten(event, data)?)),
            "call:ice-candidate" => Ok(Self::CallIceCandidate(daten(event, data)?)),
            "call:end" => Ok(Self::CallEnd(daten(event, data)?)),
            "start-screen-share" => Ok(Self::StartScreenShare),
            "stop-screen-share" => Ok(Self::StopScreenShare),
            "screen-share-offer" => Ok(Self::ScreenShareOffer(daten(event, data)?)),
            "screen-share-answer" => Ok(Self::ScreenShareAnswer(daten(event, data)?)),
            "ice-candidate" => Ok(Self::ScreenShareIce(daten(event, data)?)),
            "send-message" | "sendMessage" => {
                Ok(Self::SendMessage(DirektNachricht::aus_wert(event, data)?))
            }
            "typing-start" => Ok(Self::TypingStart(typing_daten(event, data)?)),
            "typing-stop" => Ok(Self::TypingStop(typing_daten(event, data)?)),
            unbekannt => Err(ProtokollFehler::UnbekanntesEvent(unbekannt.to_string())),
        }
    }

    /// Event-Name fuer Logs und Metriken
    pub fn name(&self) -> &'static str {
        match self {
            Self::CallOffer(_) => "call:offer",
            Self::CallAnswer(_) => "call:answer",
            Self::CallIceCandidate(_) => "call:ice-candidate",
            Self::CallEnd(_) => "call:end",
            Self::StartScreenShare => "start-screen-share",
            Self::StopScreenShare => "stop-screen-share",
            Self::ScreenShareOffer(_) => "screen-share-offer",
            Self::ScreenShareAnswer(_) => "screen-share-answer",
            Self::ScreenShareIce(_) => "ice-candidate",
            Self::SendMessage(_) => "send-message",
            Self::TypingStart(_) => "typing-start",
            Self::TypingStop(_) => "typing-stop",
        }
    }
}

// Typing-Events duerfen ohne Payload kommen
fn typing_daten(event: &str, data: Value) -> Result<TypingDaten, ProtokollFehler> {
    if data.is_null() {
        return Ok(TypingDaten::default());
    }
    daten(event, data)
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Eintrag im `online-users`-Snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: UserId,
    pub username: String,
    pub is_screen_sharing: bool,
}

/// Alle Events, die der Server an Clients sendet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    // --- Anruf-Signaling ---
    #[serde(rename = "call:incoming")]
    CallIncoming {
        from: UserId,
        offer: Value,
        call_type: AnrufTyp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caller_info: Option<Value>,
    },
    #[serde(rename = "call:answer")]
    CallAnswer { from: UserId, answer: Value },
    #[serde(rename = "call:ice-candidate")]
    CallIceCandidate { from: UserId, candidate: Value },
    #[serde(rename = "call:end")]
    CallEnd { from: UserId, reason: String },
    #[serde(rename = "call:user-offline")]
    CallUserOffline { user_id: UserId },
    #[serde(rename = "call:error")]
    CallError {
        to: UserId,
        code: ErrorCode,
        message: String,
    },

    // --- Presence ---
    #[serde(rename = "user-online")]
    UserOnline { user_id: UserId, username: String },
    #[serde(rename = "user-offline")]
    UserOffline { user_id: UserId, username: String },
    #[serde(rename = "online-users")]
    OnlineUsers(Vec<OnlineUser>),

    // --- Screen-Share ---
    #[serde(rename = "screen-share-started")]
    ScreenShareStarted { user_id: UserId, username: String },
    #[serde(rename = "screen-share-stopped")]
    ScreenShareStopped { user_id: UserId, username: String },
    #[serde(rename = "screen-share-offer")]
    ScreenShareOffer {
        user_id: UserId,
        username: String,
        offer: Value,
    },
    #[serde(rename = "screen-share-answer")]
    ScreenShareAnswer {
        user_id: UserId,
        username: String,
        answer: Value,
    },
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        user_id: UserId,
        username: String,
        candidate: Value,
    },

    // --- Direktnachrichten & Typing ---
    #[serde(rename = "new-message")]
    NewMessage(Map<String, Value>),
    #[serde(rename = "user-typing")]
    UserTyping { user_id: UserId, username: String },
    #[serde(rename = "user-stopped-typing")]
    UserStoppedTyping { user_id: UserId },

    // --- Verbindung ---
    #[serde(rename = "connection-confirmed")]
    ConnectionConfirmed {
        user_id: UserId,
        username: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "session-replaced")]
    SessionReplaced { user_id: UserId },
    #[serde(rename = "error")]
    Error { code: ErrorCode, message: String },
}

impl ServerEvent {
    /// Erstellt ein `error`-Event
    pub fn fehler(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Event-Name fuer Logs und Metriken
    pub fn name(&self) -> &'static str {
        match self {
            Self::CallIncoming { .. } => "call:incoming",
            Self::CallAnswer { .. } => "call:answer",
            Self::CallIceCandidate { .. } => "call:ice-candidate",
            Self::CallEnd { .. } => "call:end",
            Self::CallUserOffline { .. } => "call:user-offline",
            Self::CallError { .. } => "call:error",
            Self::UserOnline { .. } => "user-online",
            Self::UserOffline { .. } => "user-offline",
            Self::OnlineUsers(_) => "online-users",
            Self::ScreenShareStarted { .. } => "screen-share-started",
            Self::ScreenShareStopped { .. } => "screen-share-stopped",
            Self::ScreenShareOffer { .. } => "screen-share-offer",
            Self::ScreenShareAnswer { .. } => "screen-share-answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::NewMessage(_) => "new-message",
            Self::UserTyping { .. } => "user-typing",
            Self::UserStoppedTyping { .. } => "user-stopped-typing",
            Self::ConnectionConfirmed { .. } => "connection-confirmed",
            Self::SessionReplaced { .. } => "session-replaced",
            Self::Error { .. } => "error",
        }
    }

    /// Serialisiert das Event als Text-Frame
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert ein Event (Client-Seite, Tests)
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_offer_parsen_ignoriert_from() {
        let frame = json!({
            "event": "call:offer",
            "data": {
                "to": "bob",
                "from": "mallory",
                "offer": {"type": "offer", "sdp": "v=0"},
                "callType": "video",
                "callerInfo": {"_id": "alice", "fullName": "Alice"}
            }
        });
        let event = ClientEvent::aus_json(&frame.to_string()).unwrap();
        match event {
            ClientEvent::CallOffer(d) => {
                assert_eq!(d.to, UserId::new("bob"));
                assert_eq!(d.call_type, AnrufTyp::Video);
                assert_eq!(d.offer["sdp"], "v=0");
                assert!(d.caller_info.is_some());
            }
            anderes => panic!("Erwartet CallOffer, erhalten {anderes:?}"),
        }
    }

    #[test]
    fn call_end_ohne_grund_bekommt_standard() {
        let event =
            ClientEvent::aus_json(r#"{"event":"call:end","data":{"to":"bob"}}"#).unwrap();
        match event {
            ClientEvent::CallEnd(d) => assert_eq!(d.reason, STANDARD_END_GRUND),
            anderes => panic!("Erwartet CallEnd, erhalten {anderes:?}"),
        }
    }

    #[test]
    fn screen_share_start_mit_und_ohne_daten() {
        let ohne = ClientEvent::aus_json(r#"{"event":"start-screen-share"}"#).unwrap();
        let mit = ClientEvent::aus_json(r#"{"event":"start-screen-share","data":{}}"#).unwrap();
        assert!(matches!(ohne, ClientEvent::StartScreenShare));
        assert!(matches!(mit, ClientEvent::StartScreenShare));
    }

    #[test]
    fn screen_share_ziel_aufloesung() {
        assert_eq!(Ziel::aus_feld(None), Ziel::Alle);
        assert_eq!(Ziel::aus_feld(Some("")), Ziel::Alle);
        assert_eq!(Ziel::aus_feld(Some("all")), Ziel::Alle);
        assert_eq!(
            Ziel::aus_feld(Some("carol")),
            Ziel::User(UserId::new("carol"))
        );

        let event = ClientEvent::aus_json(
            r#"{"event":"ice-candidate","data":{"candidate":{"candidate":"a=1"}}}"#,
        )
        .unwrap();
        match event {
            ClientEvent::ScreenShareIce(d) => assert_eq!(d.ziel(), Ziel::Alle),
            anderes => panic!("Erwartet ScreenShareIce, erhalten {anderes:?}"),
        }
    }

    #[test]
    fn direktnachricht_behaelt_inhalt() {
        let event = ClientEvent::aus_json(
            r#"{"event":"sendMessage","data":{"receiverId":"bob","text":"hallo"}}"#,
        )
        .unwrap();
        match event {
            ClientEvent::SendMessage(n) => {
                assert_eq!(n.receiver_id, UserId::new("bob"));
                assert_eq!(n.inhalt["text"], "hallo");
            }
            anderes => panic!("Erwartet SendMessage, erhalten {anderes:?}"),
        }
    }

    #[test]
    fn unbekanntes_event_und_kaputte_daten() {
        let e = ClientEvent::aus_json(r#"{"event":"call:teleport","data":{}}"#).unwrap_err();
        assert_eq!(e.code(), ErrorCode::UnknownEvent);

        let e = ClientEvent::aus_json(r#"{"event":"call:answer","data":{"answer":{}}}"#)
            .unwrap_err();
        assert!(matches!(e, ProtokollFehler::UngueltigeDaten { .. }));
        assert_eq!(e.code(), ErrorCode::InvalidRequest);

        let e = ClientEvent::aus_json("kein json").unwrap_err();
        assert!(matches!(e, ProtokollFehler::Json(_)));
    }

    #[test]
    fn server_event_feldnamen_camel_case() {
        let event = ServerEvent::OnlineUsers(vec![OnlineUser {
            user_id: UserId::new("bob"),
            username: "Bob".into(),
            is_screen_sharing: true,
        }]);
        let wert: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(wert["event"], "online-users");
        assert_eq!(wert["data"][0]["userId"], "bob");
        assert_eq!(wert["data"][0]["isScreenSharing"], true);

        let event = ServerEvent::CallIncoming {
            from: UserId::new("alice"),
            offer: json!({"sdp": "x"}),
            call_type: AnrufTyp::Voice,
            caller_info: None,
        };
        let wert: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(wert["event"], "call:incoming");
        assert_eq!(wert["data"]["callType"], "voice");
        assert!(wert["data"].get("callerInfo").is_none());
    }

    #[test]
    fn call_user_offline_format() {
        let event = ServerEvent::CallUserOffline {
            user_id: UserId::new("bob"),
        };
        assert_eq!(
            event.to_json().unwrap(),
            r#"{"event":"call:user-offline","data":{"userId":"bob"}}"#
        );
        assert_eq!(ServerEvent::from_json(&event.to_json().unwrap()).unwrap(), event);
    }
}

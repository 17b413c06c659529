//! Anrufzustand pro Teilnehmerpaar
//!
//! Im Modus `strict` verfolgt der Tracker fuer jedes ungeordnete Paar von
//! Benutzern, in welcher Phase sich ein Anruf befindet, und lehnt
//! Nachrichten ab, die nicht zur Phase passen:
//!
//! ```text
//! Frei --offer--> Angeboten --answer (Angerufener)--> Angenommen
//!                     |                                   |
//!                     |                              erstes ICE
//!                     |                                   v
//!                     +------------- end ----------->  Aktiv --end--> Frei
//! ```
//!
//! Im Modus `permissive` wird nichts verfolgt und alles weitergeleitet.

use klingel_core::types::{AnrufTyp, UserId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{SignalingError, SignalingResult};

/// Wie streng der Relay Anruf-Nachrichten prueft
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnrufModus {
    #[default]
    Strict,
    Permissive,
}

/// Ungeordnetes Benutzerpaar (kleinere Id zuerst)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnrufPaar(UserId, UserId);

impl AnrufPaar {
    pub fn neu(a: &UserId, b: &UserId) -> Self {
        if a <= b {
            Self(a.clone(), b.clone())
        } else {
            Self(b.clone(), a.clone())
        }
    }

    pub fn enthaelt(&self, user_id: &UserId) -> bool {
        &self.0 == user_id || &self.1 == user_id
    }
}

/// Phase eines Anrufs zwischen zwei Benutzern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnrufZustand {
    Frei,
    Angeboten { anrufer: UserId, typ: AnrufTyp },
    Angenommen { anrufer: UserId, typ: AnrufTyp },
    Aktiv { anrufer: UserId, typ: AnrufTyp },
    Beendet,
}

impl AnrufZustand {
    /// Name fuer Fehlermeldungen und Logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Frei => "idle",
            Self::Angeboten { .. } => "offered",
            Self::Angenommen { .. } => "answered",
            Self::Aktiv { .. } => "active",
            Self::Beendet => "ended",
        }
    }
}

/// Verfolgt Anrufzustaende aller Paare
pub struct CallTracker {
    modus: AnrufModus,
    paare: Mutex<HashMap<AnrufPaar, AnrufZustand>>,
}

impl CallTracker {
    pub fn neu(modus: AnrufModus) -> Self {
        Self {
            modus,
            paare: Mutex::new(HashMap::new()),
        }
    }

    pub fn modus(&self) -> AnrufModus {
        self.modus
    }

    /// Aktueller Zustand eines Paares (`Frei` wenn nicht verfolgt)
    pub fn zustand(&self, a: &UserId, b: &UserId) -> AnrufZustand {
        self.paare
            .lock()
            .get(&AnrufPaar::neu(a, b))
            .cloned()
            .unwrap_or(AnrufZustand::Frei)
    }

    /// `call:offer` von `von` an `an`
    pub fn angebot(&self, von: &UserId, an: &UserId, typ: AnrufTyp) -> SignalingResult<()> {
        if self.modus == AnrufModus::Permissive {
            return Ok(());
        }

        let mut paare = self.paare.lock();
        let paar = AnrufPaar::neu(von, an);
        match paare.get(&paar) {
            None | Some(AnrufZustand::Frei) | Some(AnrufZustand::Beendet) => {
                paare.insert(
                    paar,
                    AnrufZustand::Angeboten {
                        anrufer: von.clone(),
                        typ,
                    },
                );
                Ok(())
            }
            Some(laufend) => Err(SignalingError::AnrufLaeuftBereits {
                a: von.clone(),
                b: an.clone(),
                zustand: laufend.name(),
            }),
        }
    }

    /// `call:answer` von `von` an `an`; nur der Angerufene darf annehmen
    pub fn antwort(&self, von: &UserId, an: &UserId) -> SignalingResult<()> {
        if self.modus == AnrufModus::Permissive {
            return Ok(());
        }

        let mut paare = self.paare.lock();
        let paar = AnrufPaar::neu(von, an);
        let zustand = paare.get(&paar).cloned().unwrap_or(AnrufZustand::Frei);
        match zustand {
            AnrufZustand::Angeboten { anrufer, typ } if &anrufer == an => {
                paare.insert(paar, AnrufZustand::Angenommen { anrufer, typ });
                Ok(())
            }
            andere => Err(SignalingError::UngueltigerUebergang {
                event: "call:answer",
                zustand: andere.name(),
            }),
        }
    }

    /// `call:ice-candidate`: gibt zurueck ob der Kandidat weitergeleitet wird
    ///
    /// Der erste Kandidat nach der Annahme macht den Anruf aktiv.
    pub fn ice(&self, von: &UserId, an: &UserId) -> bool {
        if self.modus == AnrufModus::Permissive {
            return true;
        }

        let mut paare = self.paare.lock();
        let Some(zustand) = paare.get_mut(&AnrufPaar::neu(von, an)) else {
            return false;
        };
        match zustand {
            AnrufZustand::Angeboten { .. } | AnrufZustand::Aktiv { .. } => true,
            AnrufZustand::Angenommen { anrufer, typ } => {
                *zustand = AnrufZustand::Aktiv {
                    anrufer: anrufer.clone(),
                    typ: *typ,
                };
                true
            }
            AnrufZustand::Frei | AnrufZustand::Beendet => false,
        }
    }

    /// `call:end`: gibt den Zustand vor dem Ende zurueck
    ///
    /// `None` heisst: kein laufender Anruf, Nachricht wird verworfen.
    pub fn ende(&self, von: &UserId, an: &UserId) -> Option<AnrufZustand> {
        let vorher = self.paare.lock().remove(&AnrufPaar::neu(von, an));
        match self.modus {
            AnrufModus::Permissive => Some(vorher.unwrap_or(AnrufZustand::Frei)),
            AnrufModus::Strict => vorher,
        }
    }

    /// Vergisst alle Anrufe eines Benutzers (Verbindung getrennt)
    pub fn teilnehmer_entfernen(&self, user_id: &UserId) -> usize {
        let mut paare = self.paare.lock();
        let vorher = paare.len();
        paare.retain(|paar, _| !paar.enthaelt(user_id));
        vorher - paare.len()
    }

    /// Anzahl verfolgter Anrufe
    pub fn anzahl(&self) -> usize {
        self.paare.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (UserId, UserId) {
        (UserId::new("alice"), UserId::new("bob"))
    }

    #[test]
    fn paar_ist_ungeordnet() {
        let (a, b) = ids();
        assert_eq!(AnrufPaar::neu(&a, &b), AnrufPaar::neu(&b, &a));
        assert!(AnrufPaar::neu(&a, &b).enthaelt(&b));
        assert!(!AnrufPaar::neu(&a, &b).enthaelt(&UserId::new("carol")));
    }

    #[test]
    fn kompletter_anruf() {
        let t = CallTracker::neu(AnrufModus::Strict);
        let (a, b) = ids();

        t.angebot(&a, &b, AnrufTyp::Video).unwrap();
        assert_eq!(t.zustand(&b, &a).name(), "offered");
        assert!(t.ice(&a, &b), "ICE waehrend des Angebots erlaubt");

        t.antwort(&b, &a).unwrap();
        assert_eq!(t.zustand(&a, &b).name(), "answered");

        assert!(t.ice(&b, &a));
        assert_eq!(
            t.zustand(&a, &b),
            AnrufZustand::Aktiv {
                anrufer: a.clone(),
                typ: AnrufTyp::Video
            }
        );

        assert_eq!(t.ende(&a, &b).map(|z| z.name()), Some("active"));
        assert_eq!(t.zustand(&a, &b), AnrufZustand::Frei);
        assert_eq!(t.anzahl(), 0);
    }

    #[test]
    fn doppeltes_angebot_abgelehnt() {
        let t = CallTracker::neu(AnrufModus::Strict);
        let (a, b) = ids();
        t.angebot(&a, &b, AnrufTyp::Voice).unwrap();

        let fehler = t.angebot(&b, &a, AnrufTyp::Voice).unwrap_err();
        assert!(matches!(
            fehler,
            SignalingError::AnrufLaeuftBereits {
                zustand: "offered",
                ..
            }
        ));
    }

    #[test]
    fn antwort_ohne_angebot_abgelehnt() {
        let t = CallTracker::neu(AnrufModus::Strict);
        let (a, b) = ids();
        let fehler = t.antwort(&b, &a).unwrap_err();
        assert!(matches!(
            fehler,
            SignalingError::UngueltigerUebergang {
                event: "call:answer",
                zustand: "idle"
            }
        ));
    }

    #[test]
    fn anrufer_kann_nicht_selbst_annehmen() {
        let t = CallTracker::neu(AnrufModus::Strict);
        let (a, b) = ids();
        t.angebot(&a, &b, AnrufTyp::Voice).unwrap();
        assert!(t.antwort(&a, &b).is_err());
        assert_eq!(t.zustand(&a, &b).name(), "offered");
    }

    #[test]
    fn ice_und_ende_ohne_anruf_verworfen() {
        let t = CallTracker::neu(AnrufModus::Strict);
        let (a, b) = ids();
        assert!(!t.ice(&a, &b));
        assert!(t.ende(&a, &b).is_none());
    }

    #[test]
    fn neues_angebot_nach_ende() {
        let t = CallTracker::neu(AnrufModus::Strict);
        let (a, b) = ids();
        t.angebot(&a, &b, AnrufTyp::Voice).unwrap();
        t.ende(&b, &a);
        t.angebot(&b, &a, AnrufTyp::Video).unwrap();
    }

    #[test]
    fn paare_sind_unabhaengig() {
        let t = CallTracker::neu(AnrufModus::Strict);
        let (a, b) = ids();
        let c = UserId::new("carol");
        t.angebot(&a, &b, AnrufTyp::Voice).unwrap();
        t.angebot(&a, &c, AnrufTyp::Voice).unwrap();
        assert_eq!(t.anzahl(), 2);

        assert_eq!(t.teilnehmer_entfernen(&a), 2);
        assert_eq!(t.anzahl(), 0);
    }

    #[test]
    fn permissive_leitet_alles_weiter() {
        let t = CallTracker::neu(AnrufModus::Permissive);
        let (a, b) = ids();
        t.antwort(&b, &a).unwrap();
        assert!(t.ice(&a, &b));
        t.angebot(&a, &b, AnrufTyp::Voice).unwrap();
        t.angebot(&a, &b, AnrufTyp::Voice).unwrap();
        assert!(t.ende(&a, &b).is_some());
        assert_eq!(t.anzahl(), 0);
    }

    #[test]
    fn modus_aus_toml_text() {
        #[derive(Deserialize)]
        struct Huelle {
            modus: AnrufModus,
        }
        let h: Huelle = serde_json::from_str(r#"{"modus":"permissive"}"#).unwrap();
        assert_eq!(h.modus, AnrufModus::Permissive);
        assert_eq!(AnrufModus::default(), AnrufModus::Strict);
    }
}

//! Connection-Registry – Wer ist verbunden, wer teilt den Bildschirm
//!
//! Genau ein Eintrag pro `UserId`. Ein neuer Verbindungsaufbau desselben
//! Benutzers ersetzt den alten Eintrag. Die Menge der Screen-Sharer ist
//! immer eine Teilmenge der registrierten Benutzer.
//!
//! Zusammengesetzte Operationen (Verbinden, Trennen, Screen-Share) laufen
//! unter `schreibsperre()` und damit ohne Verschraenkung.

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use klingel_core::types::{UserId, VerbindungsId};
use klingel_protocol::OnlineUser;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

use crate::broadcast::ClientSender;

/// Eintrag eines verbundenen Benutzers
#[derive(Debug, Clone)]
pub struct VerbindungsEintrag {
    pub user_id: UserId,
    pub sender: ClientSender,
    pub anzeigename: String,
    pub verbunden_seit: DateTime<Utc>,
}

impl VerbindungsEintrag {
    pub fn verbindungs_id(&self) -> VerbindungsId {
        self.sender.verbindungs_id
    }
}

struct RegistryInner {
    verbindungen: DashMap<UserId, VerbindungsEintrag>,
    teilende: DashSet<UserId>,
    schreibsperre: Mutex<()>,
}

/// Thread-sichere Registry aller verbundenen Benutzer
///
/// Clone teilt den Zustand.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                verbindungen: DashMap::new(),
                teilende: DashSet::new(),
                schreibsperre: Mutex::new(()),
            }),
        }
    }

    /// Sperre fuer zusammengesetzte Zustandsaenderungen
    pub fn schreibsperre(&self) -> MutexGuard<'_, ()> {
        self.inner.schreibsperre.lock()
    }

    // -----------------------------------------------------------------------
    // Verbindungen
    // -----------------------------------------------------------------------

    /// Registriert (oder ersetzt) die Verbindung eines Benutzers
    ///
    /// Gibt den ersetzten Eintrag zurueck, falls der Benutzer schon
    /// verbunden war.
    pub fn registrieren(
        &self,
        user_id: UserId,
        sender: ClientSender,
        anzeigename: String,
    ) -> Option<VerbindungsEintrag> {
        debug_assert_eq!(user_id, sender.user_id, "Handle gehoert zu anderem Benutzer");
        let eintrag = VerbindungsEintrag {
            user_id: user_id.clone(),
            sender,
            anzeigename,
            verbunden_seit: Utc::now(),
        };
        self.inner.verbindungen.insert(user_id, eintrag)
    }

    /// Entfernt einen Benutzer samt Screen-Share-Markierung
    ///
    /// Gibt `false` zurueck wenn der Benutzer nicht registriert war.
    pub fn entfernen(&self, user_id: &UserId) -> bool {
        self.inner.teilende.remove(user_id);
        self.inner.verbindungen.remove(user_id).is_some()
    }

    /// Entfernt den Benutzer nur, wenn der Eintrag zu dieser Verbindung gehoert
    ///
    /// Eine ersetzte Verbindung darf ihren Nachfolger nicht austragen.
    pub fn entfernen_wenn_verbindung(
        &self,
        user_id: &UserId,
        verbindungs_id: VerbindungsId,
    ) -> Option<VerbindungsEintrag> {
        let (_, eintrag) = self
            .inner
            .verbindungen
            .remove_if(user_id, |_, e| e.verbindungs_id() == verbindungs_id)?;
        self.inner.teilende.remove(user_id);
        Some(eintrag)
    }

    pub fn nachschlagen(&self, user_id: &UserId) -> Option<VerbindungsEintrag> {
        self.inner.verbindungen.get(user_id).map(|e| e.clone())
    }

    pub fn sender_von(&self, user_id: &UserId) -> Option<ClientSender> {
        self.inner.verbindungen.get(user_id).map(|e| e.sender.clone())
    }

    /// Prueft ob der Eintrag des Benutzers zu dieser Verbindung gehoert
    pub fn ist_aktuelle_verbindung(&self, user_id: &UserId, verbindungs_id: VerbindungsId) -> bool {
        self.inner
            .verbindungen
            .get(user_id)
            .map(|e| e.verbindungs_id() == verbindungs_id)
            .unwrap_or(false)
    }

    pub fn ist_online(&self, user_id: &UserId) -> bool {
        self.inner.verbindungen.contains_key(user_id)
    }

    pub fn online_anzahl(&self) -> usize {
        self.inner.verbindungen.len()
    }

    /// Kopiert alle Sender-Handles, damit ohne gehaltene Shard-Locks gesendet wird
    pub fn alle_sender(&self, ausser: Option<&UserId>) -> Vec<ClientSender> {
        self.inner
            .verbindungen
            .iter()
            .filter(|e| Some(e.key()) != ausser)
            .map(|e| e.sender.clone())
            .collect()
    }

    /// Online-Snapshot, optional ohne einen Benutzer
    ///
    /// Sortiert nach Verbindungszeitpunkt.
    pub fn snapshot(&self, ausser: Option<&UserId>) -> Vec<OnlineUser> {
        let mut eintraege: Vec<_> = self
            .inner
            .verbindungen
            .iter()
            .filter(|e| Some(e.key()) != ausser)
            .map(|e| {
                (
                    e.verbunden_seit,
                    OnlineUser {
                        user_id: e.user_id.clone(),
                        username: e.anzeigename.clone(),
                        is_screen_sharing: self.inner.teilende.contains(e.key()),
                    },
                )
            })
            .collect();
        eintraege.sort_by(|a, b| a.0.cmp(&b.0));
        eintraege.into_iter().map(|(_, u)| u).collect()
    }

    // -----------------------------------------------------------------------
    // Screen-Sharing
    // -----------------------------------------------------------------------

    /// Markiert den Benutzer als Screen-Sharer
    ///
    /// Gibt `false` zurueck wenn er nicht online ist oder schon teilt.
    pub fn freigabe_starten(&self, user_id: &UserId) -> bool {
        if !self.ist_online(user_id) {
            return false;
        }
        self.inner.teilende.insert(user_id.clone())
    }

    /// Gibt `false` zurueck wenn der Benutzer nicht geteilt hat
    pub fn freigabe_beenden(&self, user_id: &UserId) -> bool {
        self.inner.teilende.remove(user_id).is_some()
    }

    pub fn teilt_bildschirm(&self, user_id: &UserId) -> bool {
        self.inner.teilende.contains(user_id)
    }

    pub fn teilende_anzahl(&self) -> usize {
        self.inner.teilende.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn sender(name: &str) -> ClientSender {
        let (tx, _rx) = mpsc::channel(4);
        ClientSender::neu(UserId::new(name), VerbindungsId::new(), tx)
    }

    fn anmelden(registry: &ConnectionRegistry, name: &str) -> ClientSender {
        let s = sender(name);
        registry.registrieren(UserId::new(name), s.clone(), name.to_uppercase());
        s
    }

    #[test]
    fn registrieren_und_nachschlagen() {
        let registry = ConnectionRegistry::neu();
        anmelden(&registry, "alice");

        let eintrag = registry.nachschlagen(&UserId::new("alice")).unwrap();
        assert_eq!(eintrag.anzeigename, "ALICE");
        assert!(registry.ist_online(&UserId::new("alice")));
        assert!(registry.nachschlagen(&UserId::new("bob")).is_none());
        assert_eq!(registry.online_anzahl(), 1);
    }

    #[test]
    fn erneutes_registrieren_ersetzt() {
        let registry = ConnectionRegistry::neu();
        let alt = anmelden(&registry, "alice");
        let neu = sender("alice");

        let ersetzt = registry
            .registrieren(UserId::new("alice"), neu.clone(), "Alice".into())
            .expect("alter Eintrag muss zurueckkommen");
        assert_eq!(ersetzt.verbindungs_id(), alt.verbindungs_id);
        assert_eq!(registry.online_anzahl(), 1);
        assert_eq!(
            registry.sender_von(&UserId::new("alice")).unwrap().verbindungs_id,
            neu.verbindungs_id
        );
    }

    #[test]
    fn entfernen_zweimal() {
        let registry = ConnectionRegistry::neu();
        anmelden(&registry, "alice");
        assert!(registry.entfernen(&UserId::new("alice")));
        assert!(!registry.entfernen(&UserId::new("alice")));
        assert_eq!(registry.online_anzahl(), 0);
    }

    #[test]
    fn veraltete_verbindung_entfernt_nachfolger_nicht() {
        let registry = ConnectionRegistry::neu();
        let alt = anmelden(&registry, "alice");
        let neu = anmelden(&registry, "alice");
        let uid = UserId::new("alice");

        assert!(registry.entfernen_wenn_verbindung(&uid, alt.verbindungs_id).is_none());
        assert!(registry.ist_online(&uid));
        assert!(!registry.ist_aktuelle_verbindung(&uid, alt.verbindungs_id));
        assert!(registry.ist_aktuelle_verbindung(&uid, neu.verbindungs_id));

        assert!(registry.entfernen_wenn_verbindung(&uid, neu.verbindungs_id).is_some());
        assert!(!registry.ist_online(&uid));
    }

    #[test]
    fn snapshot_ohne_ausgeschlossenen() {
        let registry = ConnectionRegistry::neu();
        anmelden(&registry, "a");
        anmelden(&registry, "b");
        anmelden(&registry, "c");
        registry.freigabe_starten(&UserId::new("b"));

        let snapshot = registry.snapshot(Some(&UserId::new("a")));
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|u| u.user_id != UserId::new("a")));

        let b = snapshot.iter().find(|u| u.user_id == UserId::new("b")).unwrap();
        assert!(b.is_screen_sharing);
        let c = snapshot.iter().find(|u| u.user_id == UserId::new("c")).unwrap();
        assert!(!c.is_screen_sharing);

        assert_eq!(registry.snapshot(None).len(), 3);
    }

    #[test]
    fn freigabe_nur_fuer_online_benutzer() {
        let registry = ConnectionRegistry::neu();
        assert!(!registry.freigabe_starten(&UserId::new("geist")));
        assert_eq!(registry.teilende_anzahl(), 0);

        anmelden(&registry, "alice");
        let uid = UserId::new("alice");
        assert!(registry.freigabe_starten(&uid));
        assert!(!registry.freigabe_starten(&uid), "zweiter Start ist kein Uebergang");
        assert!(registry.teilt_bildschirm(&uid));

        assert!(registry.freigabe_beenden(&uid));
        assert!(!registry.freigabe_beenden(&uid));
    }

    #[test]
    fn entfernen_raeumt_freigabe_auf() {
        let registry = ConnectionRegistry::neu();
        anmelden(&registry, "alice");
        let uid = UserId::new("alice");
        registry.freigabe_starten(&uid);

        registry.entfernen(&uid);
        assert!(!registry.teilt_bildschirm(&uid));
        assert_eq!(registry.teilende_anzahl(), 0);
    }

    #[test]
    fn alle_sender_ohne_ausgeschlossenen() {
        let registry = ConnectionRegistry::neu();
        anmelden(&registry, "a");
        anmelden(&registry, "b");

        let sender = registry.alle_sender(Some(&UserId::new("a")));
        assert_eq!(sender.len(), 1);
        assert_eq!(sender[0].user_id, UserId::new("b"));
        assert_eq!(registry.alle_sender(None).len(), 2);
    }
}

//! Verifizierte Identitaet einer Verbindung

use klingel_core::types::UserId;

use crate::error::{AuthError, AuthResult};

/// Ergebnis einer erfolgreichen Token-Pruefung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identitaet {
    pub user_id: UserId,
    pub anzeigename: String,
}

impl Identitaet {
    /// Anzeigename aus dem Token, sonst `User_<id>`
    pub fn neu(user_id: UserId, anzeigename: Option<String>) -> Self {
        let anzeigename = anzeigename
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("User_{}", user_id));
        Self {
            user_id,
            anzeigename,
        }
    }
}

/// Naht zum externen Auth-Service
///
/// Der Relay fuehrt keine Registry-Operation aus, bevor eine Verbindung
/// ueber diesen Trait eine verifizierte `UserId` bekommen hat.
pub trait TokenPruefer: Send + Sync + 'static {
    /// Prueft ein Token und liefert die Identitaet
    fn pruefen(&self, token: &str) -> AuthResult<Identitaet>;

    /// Prueft ein Token und gleicht eine optional angegebene userId ab
    fn verbindung_pruefen(
        &self,
        token: Option<&str>,
        angegebene_id: Option<&str>,
    ) -> AuthResult<Identitaet> {
        let token = token.filter(|t| !t.is_empty()).ok_or(AuthError::TokenFehlt)?;
        let identitaet = self.pruefen(token)?;

        if let Some(angegeben) = angegebene_id.filter(|id| !id.is_empty()) {
            if angegeben != identitaet.user_id.as_str() {
                return Err(AuthError::IdentitaetAbweichend {
                    angegeben: angegeben.to_string(),
                    token: identitaet.user_id.to_string(),
                });
            }
        }

        Ok(identitaet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FesterPruefer;

    impl TokenPruefer for FesterPruefer {
        fn pruefen(&self, token: &str) -> AuthResult<Identitaet> {
            match token {
                "gut" => Ok(Identitaet::neu(UserId::new("alice"), Some("Alice".into()))),
                _ => Err(AuthError::TokenUngueltig("unbekannt".into())),
            }
        }
    }

    #[test]
    fn anzeigename_fallback() {
        let id = Identitaet::neu(UserId::new("42"), None);
        assert_eq!(id.anzeigename, "User_42");

        let id = Identitaet::neu(UserId::new("42"), Some("  ".into()));
        assert_eq!(id.anzeigename, "User_42");
    }

    #[test]
    fn verbindung_ohne_token_abgelehnt() {
        let ergebnis = FesterPruefer.verbindung_pruefen(None, Some("alice"));
        assert!(matches!(ergebnis, Err(AuthError::TokenFehlt)));

        let ergebnis = FesterPruefer.verbindung_pruefen(Some(""), None);
        assert!(matches!(ergebnis, Err(AuthError::TokenFehlt)));
    }

    #[test]
    fn abweichende_user_id_abgelehnt() {
        let ergebnis = FesterPruefer.verbindung_pruefen(Some("gut"), Some("mallory"));
        assert!(matches!(
            ergebnis,
            Err(AuthError::IdentitaetAbweichend { .. })
        ));
    }

    #[test]
    fn passende_oder_fehlende_user_id_akzeptiert() {
        let a = FesterPruefer
            .verbindung_pruefen(Some("gut"), Some("alice"))
            .unwrap();
        let b = FesterPruefer.verbindung_pruefen(Some("gut"), None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.anzeigename, "Alice");
    }
}

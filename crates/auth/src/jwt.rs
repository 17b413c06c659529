//! JWT-Pruefung fuer Tokens des Auth-Service
//!
//! Der Auth-Service signiert Tokens mit HS256 und einem geteilten Secret.
//! Claims: `userId` (oder `sub`), optional `username`, `exp`.

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use klingel_core::types::UserId;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};
use crate::identitaet::{Identitaet, TokenPruefer};

/// Claims im Token des Auth-Service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId", alias = "sub")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

/// Prueft HS256-signierte Tokens
#[derive(Clone)]
pub struct JwtPruefer {
    schluessel: DecodingKey,
    validation: Validation,
}

impl JwtPruefer {
    /// Erstellt einen Pruefer fuer das geteilte Secret
    pub fn neu(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 5;
        Self {
            schluessel: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl TokenPruefer for JwtPruefer {
    fn pruefen(&self, token: &str) -> AuthResult<Identitaet> {
        let daten = decode::<Claims>(token, &self.schluessel, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenAbgelaufen,
                _ => AuthError::TokenUngueltig(e.to_string()),
            }
        })?;

        let claims = daten.claims;
        if claims.user_id.trim().is_empty() {
            return Err(AuthError::TokenUngueltig("userId-Claim ist leer".into()));
        }

        tracing::trace!(user_id = %claims.user_id, "Token verifiziert");
        Ok(Identitaet::neu(UserId::new(claims.user_id), claims.username))
    }
}

/// Stellt ein Token aus, wie es der Auth-Service tun wuerde
///
/// Fuer Integrationstests und lokale Entwicklung.
pub fn token_ausstellen(
    secret: &[u8],
    user_id: &str,
    username: Option<&str>,
    gueltig_sek: i64,
) -> AuthResult<String> {
    let jetzt = Utc::now().timestamp();
    let claims = Claims {
        user_id: user_id.to_string(),
        username: username.map(str::to_string),
        iat: jetzt,
        exp: jetzt + gueltig_sek,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::Ausstellung(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-nicht-produktiv";

    #[test]
    fn gueltiges_token_liefert_identitaet() {
        let token = token_ausstellen(SECRET, "65f1aa", Some("Alice"), 3600).unwrap();
        let identitaet = JwtPruefer::neu(SECRET).pruefen(&token).unwrap();
        assert_eq!(identitaet.user_id, UserId::new("65f1aa"));
        assert_eq!(identitaet.anzeigename, "Alice");
    }

    #[test]
    fn token_ohne_username_bekommt_fallback() {
        let token = token_ausstellen(SECRET, "65f1bb", None, 3600).unwrap();
        let identitaet = JwtPruefer::neu(SECRET).pruefen(&token).unwrap();
        assert_eq!(identitaet.anzeigename, "User_65f1bb");
    }

    #[test]
    fn abgelaufenes_token() {
        let token = token_ausstellen(SECRET, "65f1cc", None, -3600).unwrap();
        let ergebnis = JwtPruefer::neu(SECRET).pruefen(&token);
        assert!(matches!(ergebnis, Err(AuthError::TokenAbgelaufen)));
    }

    #[test]
    fn falsches_secret() {
        let token = token_ausstellen(b"anderes-secret", "65f1dd", None, 3600).unwrap();
        let ergebnis = JwtPruefer::neu(SECRET).pruefen(&token);
        assert!(matches!(ergebnis, Err(AuthError::TokenUngueltig(_))));
    }

    #[test]
    fn muell_token() {
        let ergebnis = JwtPruefer::neu(SECRET).pruefen("kein.jwt.token");
        assert!(matches!(ergebnis, Err(AuthError::TokenUngueltig(_))));
    }

    #[test]
    fn sub_claim_wird_akzeptiert() {
        #[derive(Serialize)]
        struct SubClaims {
            sub: String,
            exp: i64,
        }
        let token = encode(
            &Header::new(Algorithm::HS256),
            &SubClaims {
                sub: "65f1ee".into(),
                exp: Utc::now().timestamp() + 60,
            },
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        let identitaet = JwtPruefer::neu(SECRET).pruefen(&token).unwrap();
        assert_eq!(identitaet.user_id, UserId::new("65f1ee"));
    }
}

//! klingel-auth – Identitaetspruefung
//!
//! Login, Passwort-Reset und OTP gehoeren dem externen Auth-Service. Dieses
//! Crate prueft nur das von ihm ausgestellte Token beim Verbindungsaufbau:
//! - `TokenPruefer`-Trait als Naht zum Auth-Service
//! - `JwtPruefer` (HS256 mit geteiltem Secret)
//! - `token_ausstellen` fuer Tests und lokale Entwicklung

pub mod error;
pub mod identitaet;
pub mod jwt;

// Bequeme Re-Exporte
pub use error::{AuthError, AuthResult};
pub use identitaet::{Identitaet, TokenPruefer};
pub use jwt::{token_ausstellen, Claims, JwtPruefer};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::protocol::SessionToken;
use uuid::Uuid;

/// bcrypt work factor for newly hashed admin passwords.
pub const HASH_COST: u32 = 10;
const SESSION_SUBJECT: &str = "admin";

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// bcrypt hash (`$2b$...`); empty disables admin login.
    pub password_hash: String,
    /// HS256 key for session tokens; empty disables admin login.
    pub session_secret: String,
    pub session_ttl_seconds: i64,
}

impl AuthConfig {
    /// Admin access needs both a password hash and a signing secret.
    pub fn admin_enabled(&self) -> bool {
        !self.password_hash.trim().is_empty() && !self.session_secret.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
    jti: String,
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

/// Malformed hashes never verify.
pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    let stored_hash = stored_hash.trim();
    if stored_hash.is_empty() {
        return false;
    }
    bcrypt::verify(password, stored_hash).unwrap_or(false)
}

pub fn mint_session_token(
    cfg: &AuthConfig,
    now: DateTime<Utc>,
) -> Result<SessionToken, jsonwebtoken::errors::Error> {
    let expires_at = now + Duration::seconds(cfg.session_ttl_seconds);
    let claims = Claims {
        sub: SESSION_SUBJECT.to_string(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.session_secret.as_bytes()),
    )?;
    Ok(SessionToken { token, expires_at })
}

pub fn verify_session_token(
    cfg: &AuthConfig,
    token: &str,
) -> Result<(), jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.sub = Some(SESSION_SUBJECT.to_string());
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.session_secret.as_bytes()),
        &validation,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            password_hash: hash_password("hunter2", 4).expect("hash"),
            session_secret: "test-secret".into(),
            session_ttl_seconds: 3600,
        }
    }

    #[test]
    fn hashed_password_verifies() {
        let cfg = config();
        assert!(cfg.password_hash.starts_with("$2"));
        assert!(verify_password(&cfg.password_hash, "hunter2"));
        assert!(!verify_password(&cfg.password_hash, "hunter3"));
    }

    #[test]
    fn malformed_or_empty_hash_never_verifies() {
        assert!(!verify_password("", ""));
        assert!(!verify_password("sha256$salt$abcd", "x"));
        assert!(!verify_password("$2b$10$short", "x"));
    }

    #[test]
    fn admin_needs_hash_and_secret() {
        assert!(config().admin_enabled());
        let no_hash = AuthConfig {
            password_hash: "  ".into(),
            ..config()
        };
        assert!(!no_hash.admin_enabled());
        let no_secret = AuthConfig {
            session_secret: String::new(),
            ..config()
        };
        assert!(!no_secret.admin_enabled());
    }

    #[test]
    fn minted_token_round_trips() {
        let cfg = config();
        let session = mint_session_token(&cfg, Utc::now()).expect("token");
        verify_session_token(&cfg, &session.token).expect("valid");
    }

    #[test]
    fn expired_token_is_rejected() {
        let cfg = config();
        let session =
            mint_session_token(&cfg, Utc::now() - Duration::seconds(7200)).expect("token");
        assert!(verify_session_token(&cfg, &session.token).is_err());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let cfg = config();
        let other = AuthConfig {
            session_secret: "other".into(),
            ..config()
        };
        let session = mint_session_token(&other, Utc::now()).expect("token");
        assert!(verify_session_token(&cfg, &session.token).is_err());
    }
}

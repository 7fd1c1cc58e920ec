//! Admin sessions
//!
//! A successful login yields an opaque random token that the api layer puts
//! in an HTTP-only cookie. Tokens are looked up in a server-side table with
//! an expiry; expired entries are removed on lookup and by `purge_expired`.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sha3::{Digest, Sha3_256};
use uuid::Uuid;

use crate::core::config::AdminConfig;
use crate::core::error::{Error, Result};

/// One live admin session
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque cookie value
    pub token: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time after which the session is rejected
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session is expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha3_256::digest(value.as_bytes()));
    out
}

fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Server-side session table
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    password_digest: Option<[u8; 32]>,
    ttl: Duration,
}

impl SessionStore {
    /// Build from admin configuration. An empty password disables login.
    pub fn new(config: &AdminConfig) -> Self {
        let password_digest = (!config.password.is_empty()).then(|| digest(&config.password));
        if password_digest.is_none() {
            tracing::warn!("Admin password not configured, admin login is disabled");
        }

        let ttl = Duration::from_std(config.session_ttl).unwrap_or_else(|_| Duration::hours(12));

        Self {
            sessions: DashMap::new(),
            password_digest,
            ttl,
        }
    }

    /// Check the password and open a new session
    pub fn login(&self, password: &str) -> Result<Session> {
        self.login_at(password, Utc::now())
    }

    /// `login` with an explicit clock
    pub fn login_at(&self, password: &str, now: DateTime<Utc>) -> Result<Session> {
        let expected = self
            .password_digest
            .as_ref()
            .ok_or_else(|| Error::auth("admin login is disabled"))?;

        if !digests_match(expected, &digest(password)) {
            tracing::warn!("Admin login rejected: bad password");
            return Err(Error::auth("invalid credentials"));
        }

        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| Error::config("admin session ttl is out of range"))?;
        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            created_at: now,
            expires_at,
        };
        self.sessions.insert(session.token.clone(), session.clone());
        tracing::info!("Admin session opened, expires at {}", session.expires_at);
        Ok(session)
    }

    /// Accept a token only if it names a live session
    pub fn validate(&self, token: Option<&str>) -> Result<Session> {
        self.validate_at(token, Utc::now())
    }

    /// `validate` with an explicit clock
    pub fn validate_at(&self, token: Option<&str>, now: DateTime<Utc>) -> Result<Session> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::auth("missing session"))?;

        let session = self
            .sessions
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::auth("invalid session"))?;

        if session.is_expired_at(now) {
            self.sessions.remove(token);
            return Err(Error::auth("session expired"));
        }

        Ok(session)
    }

    /// Drop a session; unknown tokens are ignored
    pub fn logout(&self, token: &str) {
        if self.sessions.remove(token).is_some() {
            tracing::info!("Admin session closed");
        }
    }

    /// Remove every expired session, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    /// `purge_expired` with an explicit clock
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            tracing::debug!("Purged {} expired sessions", purged);
        }
        purged
    }

    /// Number of sessions currently stored
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are stored
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(password: &str) -> SessionStore {
        SessionStore::new(&AdminConfig {
            password: password.to_string(),
            session_ttl: std::time::Duration::from_secs(60),
            ..AdminConfig::default()
        })
    }

    #[test]
    fn test_login_and_validate() {
        let sessions = store("hunter2");
        let session = sessions.login("hunter2").unwrap();
        assert_eq!(session.token.len(), 32);
        assert!(sessions.validate(Some(&session.token)).is_ok());
    }

    #[test]
    fn test_out_of_range_ttl_fails_login_without_panicking() {
        let sessions = SessionStore::new(&AdminConfig {
            password: "hunter2".to_string(),
            session_ttl: std::time::Duration::from_secs(9_000_000_000_000_000),
            ..AdminConfig::default()
        });
        let result = sessions.login_at("hunter2", Utc::now());
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_wrong_password_is_auth_error() {
        let sessions = store("hunter2");
        assert!(matches!(sessions.login("hunter3"), Err(Error::Auth(_))));
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_login_disabled_without_password() {
        let sessions = store("");
        assert!(matches!(sessions.login(""), Err(Error::Auth(_))));
    }

    #[test]
    fn test_missing_and_unknown_tokens_rejected() {
        let sessions = store("pw");
        assert!(matches!(sessions.validate(None), Err(Error::Auth(_))));
        assert!(matches!(sessions.validate(Some("")), Err(Error::Auth(_))));
        assert!(matches!(sessions.validate(Some("nope")), Err(Error::Auth(_))));
    }

    #[test]
    fn test_expired_session_is_rejected_and_removed() {
        let sessions = store("pw");
        let now = Utc::now();
        let session = sessions.login_at("pw", now).unwrap();

        assert!(sessions
            .validate_at(Some(&session.token), now + Duration::seconds(59))
            .is_ok());
        assert!(matches!(
            sessions.validate_at(Some(&session.token), now + Duration::seconds(60)),
            Err(Error::Auth(_))
        ));
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_logout_invalidates() {
        let sessions = store("pw");
        let session = sessions.login("pw").unwrap();
        sessions.logout(&session.token);
        assert!(sessions.validate(Some(&session.token)).is_err());
    }

    #[test]
    fn test_purge_expired() {
        let sessions = store("pw");
        let now = Utc::now();
        sessions.login_at("pw", now - Duration::seconds(120)).unwrap();
        sessions.login_at("pw", now).unwrap();

        assert_eq!(sessions.purge_expired_at(now), 1);
        assert_eq!(sessions.len(), 1);
    }
}

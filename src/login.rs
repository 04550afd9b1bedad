//! Privileged-mode gate.
//!
//! One shared secret unlocks every mutating operation. This is a coarse
//! capability switch for a trusted team, not a security boundary: anyone who
//! holds the secret can edit everything, and nothing here authenticates an
//! individual. Real access control belongs on the remote write endpoint.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::error::{LedgerError, Result};

const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds

/// Proof that the shared secret was presented. Only [`AdminGate`] creates one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Privilege {
    _sealed: (),
}

/// Admin session
#[derive(Debug, Clone)]
pub struct Session {
    pub expires_at: SystemTime,
}

pub struct AdminGate {
    password_hash: Option<String>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl AdminGate {
    /// Gate for `secret`, hashed with Argon2 here. `None` makes the gate
    /// permanently closed.
    pub fn new(secret: Option<&str>) -> Result<Self> {
        let password_hash = match secret {
            Some(secret) if !secret.is_empty() => Some(hash_password(secret)?),
            _ => None,
        };
        Ok(AdminGate {
            password_hash,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Check `password` against the shared secret.
    pub fn unlock(&self, password: &str) -> Option<Privilege> {
        let hash = self.password_hash.as_deref()?;
        match verify_password(password, hash) {
            Ok(true) => {
                log::info!("privileged mode unlocked");
                Some(Privilege { _sealed: () })
            }
            Ok(false) => {
                log::warn!("rejected privileged unlock attempt");
                None
            }
            Err(e) => {
                log::error!("privileged unlock failed: {}", e);
                None
            }
        }
    }

    /// Unlock and open a session, returning its id.
    pub fn open_session(&self, password: &str) -> Option<String> {
        self.unlock(password)?;

        let session_id = Uuid::new_v4().to_string();
        let session = Session {
            expires_at: SystemTime::now() + Duration::from_secs(SESSION_DURATION),
        };

        if let Ok(mut sessions) = self.sessions.write() {
            sessions.retain(|_, s| s.expires_at > SystemTime::now());
            sessions.insert(session_id.clone(), session);
        }
        Some(session_id)
    }

    /// The privilege carried by a live session.
    pub fn privilege_for(&self, session_id: &str) -> Option<Privilege> {
        let sessions = self.sessions.read().ok()?;
        match sessions.get(session_id) {
            Some(session) if session.expires_at > SystemTime::now() => {
                Some(Privilege { _sealed: () })
            }
            _ => None,
        }
    }

    pub fn close_session(&self, session_id: &str) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(session_id);
        }
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err(LedgerError::InvalidInput("password hashing failed".to_string())),
    }
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => return Err(LedgerError::InvalidInput("invalid password hash format".to_string())),
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

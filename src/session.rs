//! # Session State
//!
//! The authenticated identity attached to one facade instance.
//!
//! ## Invariants
//! - At most one active session per facade instance
//! - A session is replaced wholesale, never mutated field by field
//! - Readers never observe a half-written session (single pointer swap)

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identity of the signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Set once the email address has been confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_confirmed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Caller-editable metadata
    #[serde(default)]
    pub user_metadata: Value,

    /// Server-managed metadata (provider, roles)
    #[serde(default)]
    pub app_metadata: Value,

    /// Any other fields the backend returned
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Bearer token pair plus the identity it belongs to
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,

    pub refresh_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Access token lifetime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Access token expiry as unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Build a session from raw tokens, reading expiry from the JWT
    pub fn from_tokens(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        let expires_at = jwt_expiry(&access_token);
        Self {
            access_token,
            refresh_token: refresh_token.into(),
            token_type: default_token_type(),
            expires_in: None,
            expires_at,
            user: None,
        }
    }

    /// Fill `expires_at` from `expires_in` or the token itself
    pub fn normalized(mut self, now: DateTime<Utc>) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = self
                .expires_in
                .map(|secs| now.timestamp() + secs)
                .or_else(|| jwt_expiry(&self.access_token));
        }
        self
    }

    pub fn expires_at_time(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    /// Whether the access token has expired at `now` (unknown expiry never expires)
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|exp| exp <= now.timestamp())
            .unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("user", &self.user.as_ref().map(|u| u.id))
            .finish()
    }
}

/// `exp` claim of a JWT, without verifying the signature
pub fn jwt_expiry(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp").and_then(Value::as_i64)
}

/// Split an auth response into the user and session it carries
///
/// Token endpoints answer with a session object (user nested); signup with
/// pending confirmation answers with the bare user.
pub fn split_auth_payload(
    payload: Value,
    now: DateTime<Utc>,
) -> Result<(Option<User>, Option<Session>), serde_json::Error> {
    if payload.get("access_token").is_some() {
        let session: Session = serde_json::from_value(payload)?;
        let session = session.normalized(now);
        return Ok((session.user.clone(), Some(session)));
    }

    if let Some(user) = payload.get("user").filter(|u| u.is_object()) {
        return Ok((Some(serde_json::from_value(user.clone())?), None));
    }

    if payload.get("id").is_some() {
        return Ok((Some(serde_json::from_value(payload)?), None));
    }

    Ok((None, None))
}

/// Atomic holder for the current session
#[derive(Default)]
pub struct SessionStore {
    current: ArcSwapOption<Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the active session
    pub fn get(&self) -> Option<Arc<Session>> {
        self.current.load_full()
    }

    /// Replace the active session
    pub fn replace(&self, session: Session) {
        self.current.store(Some(Arc::new(session)));
    }

    pub fn clear(&self) {
        self.current.store(None);
    }

    /// Rewrite whatever session is current when the swap happens.
    ///
    /// `f` returns `None` to leave the session untouched. Nothing happens
    /// when no session is set. Returns whether a new session was stored.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: Fn(&Session) -> Option<Session>,
    {
        let mut applied = false;
        let _ = self.current.rcu(|current| {
            match current.as_deref().and_then(|session| f(session)) {
                Some(next) => {
                    applied = true;
                    Some(Arc::new(next))
                }
                None => {
                    applied = false;
                    current.clone()
                }
            }
        });
        applied
    }

    pub fn is_active(&self) -> bool {
        self.current.load().is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.current.load().as_ref().map(|s| s.access_token.clone())
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("active", &self.is_active())
            .finish()
    }
}

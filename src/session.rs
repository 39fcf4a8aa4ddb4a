//! Persisted authorization state for the paired thermostat.

use chrono::{DateTime, TimeDelta, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::models::ecobee::{AuthorizeResponse, TokenResponse};

/// Current on-disk layout of [`SessionRecord`].
pub const SESSION_FORMAT_VERSION: i32 = 1;

/// Where the token lifecycle stands for a device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No session stored for the device yet.
    Unauthorized,
    /// A PIN must be requested and confirmed by a human.
    Authorizing,
    /// The grant is in hand but has not been exchanged for tokens.
    TokenPending,
    /// Commands can be issued.
    Active,
}

impl AuthState {
    pub fn resolve(record: Option<&SessionRecord>, now: DateTime<Utc>) -> Self {
        match record {
            None => AuthState::Unauthorized,
            Some(r) => r.auth_state(now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub device_name: String,
    pub application_key: String,
    pub scope: String,
    /// Grant returned by PIN authorization.
    pub authorization_code: Option<String>,
    pub authorization_expires_at: Option<DateTime<Utc>>,
    pub access_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    pub tokens_issued_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn new(device_name: impl Into<String>, application_key: impl Into<String>, scope: impl Into<String>) -> Self {
        SessionRecord {
            device_name: device_name.into(),
            application_key: application_key.into(),
            scope: scope.into(),
            authorization_code: None,
            authorization_expires_at: None,
            access_token: None,
            access_token_expires_at: None,
            refresh_token: None,
            tokens_issued_at: None,
        }
    }

    pub fn auth_state(&self, now: DateTime<Utc>) -> AuthState {
        match (&self.authorization_code, &self.access_token) {
            (None, _) => AuthState::Authorizing,
            (Some(_), Some(_)) => AuthState::Active,
            (Some(_), None) if self.authorization_expired(now) => AuthState::Authorizing,
            (Some(_), None) => AuthState::TokenPending,
        }
    }

    /// A pending grant the vendor will no longer accept.
    pub fn authorization_expired(&self, now: DateTime<Utc>) -> bool {
        self.access_token.is_none() && self.authorization_expires_at.is_some_and(|at| at <= now)
    }

    /// Records a fresh grant. Any previous tokens belong to the old pairing and are dropped.
    pub fn apply_authorization(&mut self, resp: &AuthorizeResponse, now: DateTime<Utc>) {
        self.authorization_code = Some(resp.code.clone());
        self.authorization_expires_at = expiry_hint(now, TimeDelta::try_minutes(resp.expires_in), "authorization code");
        self.scope = resp.scope.clone();
        self.access_token = None;
        self.access_token_expires_at = None;
        self.refresh_token = None;
        self.tokens_issued_at = None;
    }

    pub fn apply_tokens(&mut self, resp: &TokenResponse, now: DateTime<Utc>) {
        self.access_token = Some(resp.access_token.clone());
        self.access_token_expires_at = expiry_hint(now, TimeDelta::try_seconds(resp.expires_in), "access token");
        self.refresh_token = Some(resp.refresh_token.clone());
        self.tokens_issued_at = Some(now);
        if let Some(scope) = &resp.scope {
            self.scope = scope.clone();
        }
    }
}

/// `None` when the vendor's `expires_in` does not fit a timestamp; the hint is then unknown.
fn expiry_hint(now: DateTime<Utc>, lifetime: Option<TimeDelta>, what: &str) -> Option<DateTime<Utc>> {
    let at = lifetime.and_then(|d| now.checked_add_signed(d));
    if at.is_none() {
        warn!("Ignoring out-of-range expiry for {}", what);
    }
    at
}

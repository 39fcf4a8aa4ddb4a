//! Token lifecycle: pairing, token exchange and refresh-on-expiry for the stored session.
//!
//! `Unauthorized -> Authorizing -> TokenPending -> Active`, with `Active -> Active` on refresh.
//! Every transition that changes the record persists it before moving on.

use crate::client::{EcobeeApi, EcobeeClientError};
use crate::console::Console;
use crate::services::credentials::{CredentialStore, StoreError};
use crate::session::{AuthState, SessionRecord};
use crate::utils::mask_secret;
use chrono::Utc;
use core::fmt;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

#[derive(Debug)]
pub enum LifecycleError {
    Api(EcobeeClientError),
    Store(StoreError),
    Console(io::Error),
    EmptyApplicationKey,
    MissingAuthorizationCode,
    MissingRefreshToken,
    /// A command was attempted without an access token.
    NotActive(AuthState),
}

impl Display for LifecycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::Api(e) => write!(f, "api error: {}", e),
            LifecycleError::Store(e) => write!(f, "store error: {}", e),
            LifecycleError::Console(e) => write!(f, "console error: {}", e),
            LifecycleError::EmptyApplicationKey => write!(f, "application key must not be empty"),
            LifecycleError::MissingAuthorizationCode => write!(f, "no authorization code to exchange for tokens"),
            LifecycleError::MissingRefreshToken => write!(f, "no refresh token stored; pair the device again"),
            LifecycleError::NotActive(state) => write!(f, "session is not active (state {:?})", state),
        }
    }
}

impl Error for LifecycleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LifecycleError::Api(e) => Some(e),
            LifecycleError::Store(e) => Some(e),
            LifecycleError::Console(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EcobeeClientError> for LifecycleError {
    fn from(value: EcobeeClientError) -> Self {
        LifecycleError::Api(value)
    }
}

impl From<StoreError> for LifecycleError {
    fn from(value: StoreError) -> Self {
        LifecycleError::Store(value)
    }
}

impl From<io::Error> for LifecycleError {
    fn from(value: io::Error) -> Self {
        LifecycleError::Console(value)
    }
}

/// Result of a command issued through [`Session::call`].
#[derive(Debug)]
pub enum CallOutcome<T> {
    Completed(T),
    /// The token had expired; it was refreshed but the command was not re-issued.
    Refreshed,
    /// Any other API failure, left for the caller to report.
    Failed(EcobeeClientError),
}

/// The live session: vendor API, store and the current record travel together.
pub struct Session<'a, A: EcobeeApi> {
    api: &'a A,
    store: &'a CredentialStore,
    record: SessionRecord,
}

/// Loads the stored session for `device_name`, pairing the device first when needed,
/// and returns once it is `Active`.
pub fn bootstrap<'a, A: EcobeeApi, C: Console>(
    api: &'a A,
    store: &'a CredentialStore,
    console: &mut C,
    device_name: &str,
    scope: &str,
) -> Result<Session<'a, A>, LifecycleError> {
    let stored = store.load(device_name)?;
    let record = match stored {
        Some(record) => {
            info!("Loaded stored session for {} from {}", device_name, store.path().display());
            record
        }
        None => {
            info!(
                "No stored session for {} ({:?}); starting device pairing",
                device_name,
                AuthState::Unauthorized
            );
            let key = console.prompt("Please enter the API key of your ecobee app: ")?;
            let key = key.trim();
            if key.is_empty() {
                return Err(LifecycleError::EmptyApplicationKey);
            }
            SessionRecord::new(device_name, key, scope)
        }
    };

    let mut session = Session { api, store, record };
    loop {
        let state = session.state();
        info!("Session for {} is {:?}", device_name, state);
        match state {
            AuthState::Active => return Ok(session),
            AuthState::Authorizing => {
                // confirmation may arrive after the PIN window; exchange the grant regardless
                session.authorize(console)?;
                session.request_tokens()?;
            }
            AuthState::TokenPending => session.request_tokens()?,
            AuthState::Unauthorized => return Err(LifecycleError::NotActive(state)),
        }
    }
}

impl<'a, A: EcobeeApi> Session<'a, A> {
    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn state(&self) -> AuthState {
        self.record.auth_state(Utc::now())
    }

    fn persist(&self) -> Result<(), LifecycleError> {
        self.store.save(&self.record.device_name, &self.record)?;
        Ok(())
    }

    /// Requests a PIN, persists the grant, then waits for a human to confirm the pairing.
    fn authorize<C: Console>(&mut self, console: &mut C) -> Result<(), LifecycleError> {
        if self.record.authorization_expired(Utc::now()) {
            warn!("Stored authorization code for {} expired before tokens were issued", self.record.device_name);
        }
        let resp = self.api.authorize(&self.record.application_key, &self.record.scope)?;
        info!(
            "Authorization started: pin={}, scope={}, valid for {} minute(s)",
            resp.ecobee_pin, resp.scope, resp.expires_in
        );
        self.record.apply_authorization(&resp, Utc::now());
        self.persist()?;

        warn!(
            "Log in to ecobee.com, open the My Apps section of the settings tab and enter PIN \"{}\" under \
             \"Add Application\". Confirm the requested permissions with \"Authorize\", then press Enter here.",
            resp.ecobee_pin
        );
        console.prompt("Press Enter once the app is authorized: ")?;
        Ok(())
    }

    /// Exchanges the stored grant for tokens.
    fn request_tokens(&mut self) -> Result<(), LifecycleError> {
        let code = self
            .record
            .authorization_code
            .clone()
            .ok_or(LifecycleError::MissingAuthorizationCode)?;
        let resp = self.api.request_tokens(&self.record.application_key, &code)?;
        self.record.apply_tokens(&resp, Utc::now());
        self.persist()?;
        info!(
            "Tokens issued: access token {} valid for {}s",
            mask_secret(&resp.access_token),
            resp.expires_in
        );
        Ok(())
    }

    /// Trades the refresh token for a new token pair. Failure is not retried.
    pub fn refresh(&mut self) -> Result<(), LifecycleError> {
        let refresh_token = self.record.refresh_token.clone().ok_or(LifecycleError::MissingRefreshToken)?;
        let resp = self.api.refresh_tokens(&self.record.application_key, &refresh_token)?;
        self.record.apply_tokens(&resp, Utc::now());
        self.persist()?;
        info!(
            "Tokens refreshed: access token {} valid for {}s",
            mask_secret(&resp.access_token),
            resp.expires_in
        );
        Ok(())
    }

    /// Runs `op` with the current access token.
    ///
    /// An expired token triggers exactly one refresh and yields [`CallOutcome::Refreshed`];
    /// other API errors come back as [`CallOutcome::Failed`]. Only lifecycle faults
    /// (refresh or store failures) are returned as `Err`.
    pub fn call<T>(
        &mut self,
        op: impl FnOnce(&A, &str) -> Result<T, EcobeeClientError>,
    ) -> Result<CallOutcome<T>, LifecycleError> {
        let Some(access_token) = self.record.access_token.as_deref() else {
            return Err(LifecycleError::NotActive(self.state()));
        };
        match op(self.api, access_token) {
            Ok(v) => Ok(CallOutcome::Completed(v)),
            Err(e) if e.is_token_expired() => {
                warn!("Access token expired ({}); refreshing", e);
                self.refresh()?;
                Ok(CallOutcome::Refreshed)
            }
            Err(e) => Ok(CallOutcome::Failed(e)),
        }
    }
}

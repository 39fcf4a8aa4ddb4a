//! Blocking HTTP client for the ecobee API (PIN authorization, tokens, thermostat read/update).
//!
//! - Blocking client using `ureq` (no async).
//! - Uses the models in `crate::models::ecobee`.
//! - Never refreshes on its own; expiry is reported as an error and handled by the caller.
//!
//! Errors
//! - Non-2xx bodies are classified into vendor status errors (`{"status": {...}}`),
//!   OAuth errors (`{"error": ...}`) or plain HTTP errors.

use http::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::models::ecobee::*;

#[derive(Debug)]
pub enum EcobeeClientError {
    Transport(String),
    Http { status: u16, message: String },
    /// Vendor status code carried in a `{"status": {...}}` body.
    Api { http_status: u16, code: i64, message: String },
    /// OAuth error from `/authorize` or `/token`.
    Auth {
        http_status: u16,
        error: String,
        description: Option<String>,
    },
    Json { path: String, message: String },
}

impl EcobeeClientError {
    /// True when the vendor reports that the access token must be refreshed.
    pub fn is_token_expired(&self) -> bool {
        matches!(self, EcobeeClientError::Api { code, .. } if *code == TOKEN_EXPIRED_CODE)
    }
}

impl core::fmt::Display for EcobeeClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EcobeeClientError::Transport(s) => write!(f, "transport error: {}", s),
            EcobeeClientError::Http { status, message } => write!(f, "http {}: {}", status, message),
            EcobeeClientError::Api {
                http_status,
                code,
                message,
            } => write!(f, "api status {} (http {}): {}", code, http_status, message),
            EcobeeClientError::Auth {
                http_status,
                error,
                description,
            } => match description {
                Some(d) => write!(f, "auth error {} (http {}): {}", error, http_status, d),
                None => write!(f, "auth error {} (http {})", error, http_status),
            },
            EcobeeClientError::Json { path, message } => write!(f, "json error at {}: {}", path, message),
        }
    }
}

impl std::error::Error for EcobeeClientError {}

/// The vendor operations the token lifecycle and the duty cycle depend on.
pub trait EcobeeApi {
    /// Starts PIN authorization for the application key.
    fn authorize(&self, application_key: &str, scope: &str) -> Result<AuthorizeResponse, EcobeeClientError>;

    /// Exchanges an authorization grant for an access/refresh token pair.
    fn request_tokens(
        &self,
        application_key: &str,
        authorization_code: &str,
    ) -> Result<TokenResponse, EcobeeClientError>;

    fn refresh_tokens(&self, application_key: &str, refresh_token: &str) -> Result<TokenResponse, EcobeeClientError>;

    fn request_thermostats(
        &self,
        access_token: &str,
        selection: &Selection,
    ) -> Result<ThermostatResponse, EcobeeClientError>;

    fn update_thermostats(
        &self,
        access_token: &str,
        request: &UpdateThermostatRequest,
    ) -> Result<UpdateThermostatResponse, EcobeeClientError>;
}

pub struct EcobeeClient {
    agent: ureq::Agent,
    base_url: String,
}

impl EcobeeClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            // error bodies carry the vendor status code, so read them instead of failing early
            .http_status_as_error(false)
            .build();

        EcobeeClient {
            agent: config.into(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    fn read_response<T: DeserializeOwned>(
        resp: Result<http::Response<ureq::Body>, ureq::Error>,
    ) -> Result<T, EcobeeClientError> {
        let mut resp = resp.map_err(|e| EcobeeClientError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| EcobeeClientError::Transport(e.to_string()))?;
        if status.is_success() {
            decode_body(&body)
        } else {
            Err(classify_error(status, &body))
        }
    }
}

impl EcobeeApi for EcobeeClient {
    fn authorize(&self, application_key: &str, scope: &str) -> Result<AuthorizeResponse, EcobeeClientError> {
        let resp = self
            .agent
            .get(self.url("/authorize"))
            .header("Accept", "application/json")
            .query("response_type", "ecobeePin")
            .query("client_id", application_key)
            .query("scope", scope)
            .call();
        Self::read_response(resp)
    }

    fn request_tokens(
        &self,
        application_key: &str,
        authorization_code: &str,
    ) -> Result<TokenResponse, EcobeeClientError> {
        let resp = self
            .agent
            .post(self.url("/token"))
            .header("Accept", "application/json")
            .query("grant_type", "ecobeePin")
            .query("code", authorization_code)
            .query("client_id", application_key)
            .send_empty();
        Self::read_response(resp)
    }

    fn refresh_tokens(&self, application_key: &str, refresh_token: &str) -> Result<TokenResponse, EcobeeClientError> {
        let resp = self
            .agent
            .post(self.url("/token"))
            .header("Accept", "application/json")
            .query("grant_type", "refresh_token")
            .query("refresh_token", refresh_token)
            .query("client_id", application_key)
            .send_empty();
        Self::read_response(resp)
    }

    fn request_thermostats(
        &self,
        access_token: &str,
        selection: &Selection,
    ) -> Result<ThermostatResponse, EcobeeClientError> {
        #[derive(Serialize)]
        struct Body<'a> {
            selection: &'a Selection,
        }
        let body = serde_json::to_string(&Body { selection }).map_err(|e| EcobeeClientError::Json {
            path: ".".to_string(),
            message: e.to_string(),
        })?;

        let resp = self
            .agent
            .get(self.url("/1/thermostat"))
            .header("Accept", "application/json")
            .header("Authorization", format!("Bearer {}", access_token))
            .query("format", "json")
            .query("body", body)
            .call();
        let res: ThermostatResponse = Self::read_response(resp)?;
        ensure_status_ok(&res.status)?;
        Ok(res)
    }

    fn update_thermostats(
        &self,
        access_token: &str,
        request: &UpdateThermostatRequest,
    ) -> Result<UpdateThermostatResponse, EcobeeClientError> {
        let resp = self
            .agent
            .post(self.url("/1/thermostat"))
            .header("Accept", "application/json")
            .header("Authorization", format!("Bearer {}", access_token))
            .query("format", "json")
            .send_json(request);
        let res: UpdateThermostatResponse = Self::read_response(resp)?;
        ensure_status_ok(&res.status)?;
        Ok(res)
    }
}

/// A 2xx body can still carry a vendor status; treat it like the non-2xx case so that
/// an expired token is recognised on every endpoint.
fn ensure_status_ok(status: &Status) -> Result<(), EcobeeClientError> {
    if status.is_ok() {
        return Ok(());
    }
    Err(EcobeeClientError::Api {
        http_status: StatusCode::OK.as_u16(),
        code: status.code,
        message: status.message.clone(),
    })
}

fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T, EcobeeClientError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|e| EcobeeClientError::Json {
        path: e.path().to_string(),
        message: e.inner().to_string(),
    })
}

/// Maps a non-2xx response body onto the matching error variant.
fn classify_error(status: StatusCode, body: &str) -> EcobeeClientError {
    let http_status = status.as_u16();
    if let Ok(StatusBody { status: s }) = serde_json::from_str::<StatusBody>(body) {
        return EcobeeClientError::Api {
            http_status,
            code: s.code,
            message: s.message,
        };
    }
    if let Ok(o) = serde_json::from_str::<OAuthErrorBody>(body) {
        return EcobeeClientError::Auth {
            http_status,
            error: o.error,
            description: o.error_description,
        };
    }
    let message = match body.trim() {
        "" => String::from("<no body>"),
        s => s.to_string(),
    };
    EcobeeClientError::Http {
        status: http_status,
        message,
    }
}

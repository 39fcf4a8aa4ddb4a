//! In-memory stand-ins for the vendor API, the console and the duty-cycle pause.

use crate::client::{EcobeeApi, EcobeeClientError};
use crate::console::Console;
use crate::models::ecobee::*;
use crate::services::credentials::CredentialStore;
use crate::services::duty_cycle::{Pause, Resume};
use crate::session::SessionRecord;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Authorize { application_key: String },
    RequestTokens { authorization_code: String },
    RefreshTokens { refresh_token: String },
    RequestThermostats { access_token: String },
    UpdateThermostats { access_token: String, settings: Settings },
}

pub fn expired_error() -> EcobeeClientError {
    EcobeeClientError::Api {
        http_status: 500,
        code: TOKEN_EXPIRED_CODE,
        message: "Authentication token has expired. Refresh your tokens.".into(),
    }
}

/// Records every call. Reads and updates pop scripted results and succeed by default;
/// each token issuance hands out `access-N`/`refresh-N` with an increasing `N`.
#[derive(Default)]
pub struct FakeApi {
    calls: RefCell<Vec<ApiCall>>,
    issued: Cell<u32>,
    pairing_window: Cell<Option<i64>>,
    last_update: RefCell<Option<UpdateThermostatRequest>>,
    refresh_fails: Cell<bool>,
    read_results: RefCell<VecDeque<Result<ThermostatResponse, EcobeeClientError>>>,
    update_results: RefCell<VecDeque<Result<UpdateThermostatResponse, EcobeeClientError>>>,
}

impl FakeApi {
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.borrow().clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, ApiCall::RefreshTokens { .. }))
            .count()
    }

    pub fn push_read_result(&self, result: Result<ThermostatResponse, EcobeeClientError>) {
        self.read_results.borrow_mut().push_back(result);
    }

    pub fn push_update_result(&self, result: Result<UpdateThermostatResponse, EcobeeClientError>) {
        self.update_results.borrow_mut().push_back(result);
    }

    /// Minutes the issued PIN stays valid (9 unless set).
    pub fn set_pairing_window(&self, minutes: i64) {
        self.pairing_window.set(Some(minutes));
    }

    pub fn last_update(&self) -> Option<UpdateThermostatRequest> {
        self.last_update.borrow().clone()
    }

    pub fn fail_refresh(&self) {
        self.refresh_fails.set(true);
    }

    fn issue_tokens(&self) -> TokenResponse {
        let n = self.issued.get() + 1;
        self.issued.set(n);
        TokenResponse {
            access_token: format!("access-{n}"),
            token_type: Some("Bearer".into()),
            expires_in: 3599,
            refresh_token: format!("refresh-{n}"),
            scope: Some("smartWrite".into()),
        }
    }
}

pub fn thermostat_response(mode: HvacMode, fan_min_on_time: u32) -> ThermostatResponse {
    ThermostatResponse {
        page: None,
        thermostat_list: vec![Thermostat {
            identifier: Some("318324702718".into()),
            name: Some("Home".into()),
            thermostat_rev: None,
            settings: Some(Settings {
                hvac_mode: Some(mode),
                fan_min_on_time: Some(fan_min_on_time),
            }),
        }],
        status: Status {
            code: 0,
            message: String::new(),
        },
    }
}

impl EcobeeApi for FakeApi {
    fn authorize(&self, application_key: &str, scope: &str) -> Result<AuthorizeResponse, EcobeeClientError> {
        self.calls.borrow_mut().push(ApiCall::Authorize {
            application_key: application_key.into(),
        });
        Ok(AuthorizeResponse {
            ecobee_pin: "bv29".into(),
            code: "grant-1".into(),
            scope: scope.into(),
            expires_in: self.pairing_window.get().unwrap_or(9),
            interval: Some(30),
        })
    }

    fn request_tokens(
        &self,
        _application_key: &str,
        authorization_code: &str,
    ) -> Result<TokenResponse, EcobeeClientError> {
        self.calls.borrow_mut().push(ApiCall::RequestTokens {
            authorization_code: authorization_code.into(),
        });
        Ok(self.issue_tokens())
    }

    fn refresh_tokens(&self, _application_key: &str, refresh_token: &str) -> Result<TokenResponse, EcobeeClientError> {
        self.calls.borrow_mut().push(ApiCall::RefreshTokens {
            refresh_token: refresh_token.into(),
        });
        if self.refresh_fails.get() {
            return Err(EcobeeClientError::Auth {
                http_status: 400,
                error: "invalid_grant".into(),
                description: Some("The refresh token has been revoked.".into()),
            });
        }
        Ok(self.issue_tokens())
    }

    fn request_thermostats(
        &self,
        access_token: &str,
        _selection: &Selection,
    ) -> Result<ThermostatResponse, EcobeeClientError> {
        self.calls.borrow_mut().push(ApiCall::RequestThermostats {
            access_token: access_token.into(),
        });
        self.read_results
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(thermostat_response(HvacMode::Off, 60)))
    }

    fn update_thermostats(
        &self,
        access_token: &str,
        request: &UpdateThermostatRequest,
    ) -> Result<UpdateThermostatResponse, EcobeeClientError> {
        self.calls.borrow_mut().push(ApiCall::UpdateThermostats {
            access_token: access_token.into(),
            settings: request.thermostat.settings.clone().unwrap_or_default(),
        });
        *self.last_update.borrow_mut() = Some(request.clone());
        self.update_results.borrow_mut().pop_front().unwrap_or_else(|| {
            Ok(UpdateThermostatResponse {
                status: Status {
                    code: 0,
                    message: String::new(),
                },
            })
        })
    }
}

/// Answers prompts from a script; optionally snapshots the stored session at each prompt.
pub struct ScriptedConsole<'s> {
    answers: VecDeque<String>,
    pub prompts: Vec<String>,
    observe: Option<(&'s CredentialStore, String)>,
    pub observed: Vec<Option<SessionRecord>>,
}

impl<'s> ScriptedConsole<'s> {
    pub fn new(answers: &[&str]) -> Self {
        ScriptedConsole {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            prompts: Vec::new(),
            observe: None,
            observed: Vec::new(),
        }
    }

    pub fn observing(mut self, store: &'s CredentialStore, device_name: &str) -> Self {
        self.observe = Some((store, device_name.to_string()));
        self
    }
}

impl Console for ScriptedConsole<'_> {
    fn prompt(&mut self, message: &str) -> io::Result<String> {
        self.prompts.push(message.to_string());
        if let Some((store, device_name)) = &self.observe {
            let snapshot = store.load(device_name).map_err(io::Error::other)?;
            self.observed.push(snapshot);
        }
        self.answers
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
    }
}

/// Records requested pauses and stops the loop after `limit` of them.
pub struct RecordingPause {
    limit: usize,
    pub pauses: Vec<Duration>,
}

impl RecordingPause {
    pub fn stop_after(limit: usize) -> Self {
        RecordingPause {
            limit,
            pauses: Vec::new(),
        }
    }
}

impl Pause for RecordingPause {
    fn pause(&mut self, duration: Duration) -> Resume {
        self.pauses.push(duration);
        if self.pauses.len() >= self.limit {
            Resume::Stop
        } else {
            Resume::Continue
        }
    }
}

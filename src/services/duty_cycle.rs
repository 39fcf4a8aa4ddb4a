//! Two-phase duty cycle: alternate the thermostat between cooling and an "off" thaw period.
//!
//! Each phase sends one settings update, reads the settings back for the log and then
//! pauses for the phase's dwell time. The loop only ends when the pause reports an interrupt.

use crate::client::EcobeeApi;
use crate::models::ecobee::{HvacMode, Selection, Settings, UpdateThermostatRequest};
use crate::services::lifecycle::{CallOutcome, LifecycleError, Session};
use crate::utils::serde_enum_name;
use core::fmt;
use log::{error, info, warn};
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

pub const THAW_FAN_MIN_ON_TIME: u32 = 60;
pub const COOL_FAN_MIN_ON_TIME: u32 = 30;
pub const THAW_DWELL: Duration = Duration::from_secs(3000);
pub const COOL_DWELL: Duration = Duration::from_secs(600);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DutyPhase {
    Thawing,
    Cooling,
}

impl DutyPhase {
    /// Every process start begins here; phase state is never persisted.
    pub const INITIAL: DutyPhase = DutyPhase::Thawing;

    pub fn next(self) -> Self {
        match self {
            DutyPhase::Thawing => DutyPhase::Cooling,
            DutyPhase::Cooling => DutyPhase::Thawing,
        }
    }

    pub fn hvac_mode(self) -> HvacMode {
        match self {
            DutyPhase::Thawing => HvacMode::Off,
            DutyPhase::Cooling => HvacMode::Cool,
        }
    }

    pub fn fan_min_on_time(self) -> u32 {
        match self {
            DutyPhase::Thawing => THAW_FAN_MIN_ON_TIME,
            DutyPhase::Cooling => COOL_FAN_MIN_ON_TIME,
        }
    }

    pub fn dwell(self) -> Duration {
        match self {
            DutyPhase::Thawing => THAW_DWELL,
            DutyPhase::Cooling => COOL_DWELL,
        }
    }
}

impl Display for DutyPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DutyPhase::Thawing => write!(f, "thawing"),
            DutyPhase::Cooling => write!(f, "cooling"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Resume {
    Continue,
    Stop,
}

/// The single suspension point of each phase.
pub trait Pause {
    fn pause(&mut self, duration: Duration) -> Resume;
}

/// Sleeps for the full duration unless a message arrives on `interrupts` first.
pub struct InterruptiblePause {
    interrupts: Receiver<()>,
}

impl InterruptiblePause {
    pub fn new(interrupts: Receiver<()>) -> Self {
        InterruptiblePause { interrupts }
    }
}

impl Pause for InterruptiblePause {
    fn pause(&mut self, duration: Duration) -> Resume {
        match self.interrupts.recv_timeout(duration) {
            Ok(()) => Resume::Stop,
            Err(RecvTimeoutError::Timeout) => Resume::Continue,
            Err(RecvTimeoutError::Disconnected) => {
                // nobody can interrupt anymore
                thread::sleep(duration);
                Resume::Continue
            }
        }
    }
}

pub struct DutyCycle<'a, A: EcobeeApi> {
    session: Session<'a, A>,
    selection: Selection,
}

impl<'a, A: EcobeeApi> DutyCycle<'a, A> {
    pub fn new(session: Session<'a, A>) -> Self {
        DutyCycle {
            session,
            selection: Selection::registered_with_settings(),
        }
    }

    pub fn session(&self) -> &Session<'a, A> {
        &self.session
    }

    pub fn run<P: Pause>(&mut self, pause: &mut P) -> Result<(), LifecycleError> {
        self.run_from(DutyPhase::INITIAL, pause)
    }

    /// Only lifecycle faults (failed refresh, store errors) end the loop with an error.
    pub fn run_from<P: Pause>(&mut self, initial: DutyPhase, pause: &mut P) -> Result<(), LifecycleError> {
        let mut phase = initial;
        loop {
            info!(
                "Duty cycle: entering {} phase (dwell {}s)",
                phase,
                phase.dwell().as_secs()
            );
            self.enter(phase)?;

            if pause.pause(phase.dwell()) == Resume::Stop {
                info!("Duty cycle interrupted during {} phase; stopping", phase);
                return Ok(());
            }
            phase = phase.next();
        }
    }

    /// Applies the phase's settings and logs what the thermostat reports back.
    pub fn enter(&mut self, phase: DutyPhase) -> Result<(), LifecycleError> {
        match phase {
            DutyPhase::Thawing => self.thaw()?,
            DutyPhase::Cooling => self.cool()?,
        }
        self.log_current_settings()?;
        Ok(())
    }

    pub fn cool(&mut self) -> Result<(), LifecycleError> {
        self.update_thermostat(DutyPhase::Cooling.hvac_mode(), DutyPhase::Cooling.fan_min_on_time())
    }

    pub fn thaw(&mut self) -> Result<(), LifecycleError> {
        self.update_thermostat(DutyPhase::Thawing.hvac_mode(), DutyPhase::Thawing.fan_min_on_time())
    }

    fn update_thermostat(&mut self, hvac_mode: HvacMode, fan_min_on_time: u32) -> Result<(), LifecycleError> {
        let mode_name = serde_enum_name(&hvac_mode).unwrap_or_else(|| format!("{:?}", hvac_mode));
        let request = UpdateThermostatRequest::settings(
            self.selection.clone(),
            self.session.record().device_name.clone(),
            Settings {
                hvac_mode: Some(hvac_mode),
                fan_min_on_time: Some(fan_min_on_time),
            },
        );

        match self.session.call(|api, token| api.update_thermostats(token, &request))? {
            CallOutcome::Completed(resp) if resp.status.is_ok() => {
                info!("Thermostat updated: hvacMode={}, fanMinOnTime={}", mode_name, fan_min_on_time);
            }
            CallOutcome::Completed(resp) => {
                error!(
                    "Failed to update thermostat to hvacMode={}: status {} {}",
                    mode_name, resp.status.code, resp.status.message
                );
            }
            CallOutcome::Refreshed => {
                // not re-sent; the next phase issues its own update
                warn!("Thermostat update to hvacMode={} dropped after token refresh", mode_name);
            }
            CallOutcome::Failed(e) => {
                error!("Failed to update thermostat to hvacMode={}: {}", mode_name, e);
            }
        }
        Ok(())
    }

    /// Returns the first thermostat's settings, if the read succeeded.
    pub fn log_current_settings(&mut self) -> Result<Option<Settings>, LifecycleError> {
        let selection = &self.selection;
        let outcome = self.session.call(|api, token| api.request_thermostats(token, selection))?;
        let res = match outcome {
            CallOutcome::Completed(res) => res,
            CallOutcome::Refreshed => {
                warn!("Thermostat settings not read: tokens were refreshed");
                return Ok(None);
            }
            CallOutcome::Failed(e) => {
                error!("Failed to read thermostat settings: {}", e);
                return Ok(None);
            }
        };

        let Some(settings) = res.thermostat_list.into_iter().next().and_then(|t| t.settings) else {
            warn!("Thermostat response contained no settings");
            return Ok(None);
        };
        info!(
            "Current thermostat config - hvacMode={}, fanMinOnTime={}",
            settings
                .hvac_mode
                .as_ref()
                .and_then(serde_enum_name)
                .unwrap_or_else(|| "-".to_string()),
            settings
                .fan_min_on_time
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        Ok(Some(settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EcobeeClientError;
    use crate::models::ecobee::{Status, UpdateThermostatResponse};
    use crate::services::credentials::CredentialStore;
    use crate::services::fakes::{ApiCall, FakeApi, RecordingPause, ScriptedConsole, expired_error, thermostat_response};
    use crate::services::lifecycle::bootstrap;
    use crate::session::SessionRecord;
    use std::sync::mpsc;

    fn store_with_active_session() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path().join("sessions.sqlite3"));
        let mut record = SessionRecord::new("Home", "ABC123", "smartWrite");
        record.authorization_code = Some("grant-0".into());
        record.access_token = Some("access-0".into());
        record.refresh_token = Some("refresh-0".into());
        store.save("Home", &record).expect("save");
        (dir, store)
    }

    fn updates(api: &FakeApi) -> Vec<Settings> {
        api.calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::UpdateThermostats { settings, .. } => Some(settings),
                _ => None,
            })
            .collect()
    }

    fn settings(mode: HvacMode, fan: u32) -> Settings {
        Settings {
            hvac_mode: Some(mode),
            fan_min_on_time: Some(fan),
        }
    }

    #[test]
    fn phases_alternate_with_their_parameters() {
        assert_eq!(DutyPhase::INITIAL, DutyPhase::Thawing);
        assert_eq!(DutyPhase::Thawing.next(), DutyPhase::Cooling);
        assert_eq!(DutyPhase::Cooling.next(), DutyPhase::Thawing);
        assert_eq!(DutyPhase::Thawing.hvac_mode(), HvacMode::Off);
        assert_eq!(DutyPhase::Thawing.fan_min_on_time(), 60);
        assert_eq!(DutyPhase::Thawing.dwell(), Duration::from_secs(3000));
        assert_eq!(DutyPhase::Cooling.hvac_mode(), HvacMode::Cool);
        assert_eq!(DutyPhase::Cooling.fan_min_on_time(), 30);
        assert_eq!(DutyPhase::Cooling.dwell(), Duration::from_secs(600));
    }

    #[test]
    fn cool_and_thaw_request_fixed_settings() {
        let (_dir, store) = store_with_active_session();
        let api = FakeApi::default();
        let session = bootstrap(&api, &store, &mut ScriptedConsole::new(&[]), "Home", "smartWrite").expect("bootstrap");
        let mut cycle = DutyCycle::new(session);

        cycle.cool().expect("cool");
        cycle.cool().expect("cool again");
        cycle.thaw().expect("thaw");

        assert_eq!(
            updates(&api),
            vec![
                settings(HvacMode::Cool, 30),
                settings(HvacMode::Cool, 30),
                settings(HvacMode::Off, 60),
            ]
        );
    }

    #[test]
    fn updates_name_the_configured_thermostat() {
        let (_dir, store) = store_with_active_session();
        let api = FakeApi::default();
        let session = bootstrap(&api, &store, &mut ScriptedConsole::new(&[]), "Home", "smartWrite").expect("bootstrap");

        DutyCycle::new(session).thaw().expect("thaw");

        let request = api.last_update().expect("update sent");
        assert_eq!(request.thermostat.identifier.as_deref(), Some("Home"));
        assert_eq!(request.selection, Selection::registered_with_settings());
    }

    #[test]
    fn fresh_pairing_then_first_phase_thaws() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path().join("sessions.sqlite3"));
        let api = FakeApi::default();
        let mut console = ScriptedConsole::new(&["ABC123", ""]);
        let session = bootstrap(&api, &store, &mut console, "Home", "smartWrite").expect("bootstrap");
        let mut pause = RecordingPause::stop_after(1);

        DutyCycle::new(session).run(&mut pause).expect("run");

        let stored = store.load("Home").expect("load").expect("present");
        assert_eq!(stored.application_key, "ABC123");
        assert_eq!(stored.authorization_code.as_deref(), Some("grant-1"));
        assert_eq!(stored.access_token.as_deref(), Some("access-1"));
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(
            api.calls(),
            vec![
                ApiCall::Authorize { application_key: "ABC123".into() },
                ApiCall::RequestTokens { authorization_code: "grant-1".into() },
                ApiCall::UpdateThermostats {
                    access_token: "access-1".into(),
                    settings: settings(HvacMode::Off, 60),
                },
                ApiCall::RequestThermostats { access_token: "access-1".into() },
            ]
        );
        assert_eq!(pause.pauses, vec![THAW_DWELL]);
    }

    #[test]
    fn loop_starts_thawing_and_alternates() {
        let (_dir, store) = store_with_active_session();
        let api = FakeApi::default();
        let session = bootstrap(&api, &store, &mut ScriptedConsole::new(&[]), "Home", "smartWrite").expect("bootstrap");
        let mut pause = RecordingPause::stop_after(3);

        DutyCycle::new(session).run(&mut pause).expect("run");

        assert_eq!(pause.pauses, vec![THAW_DWELL, COOL_DWELL, THAW_DWELL]);
        assert_eq!(
            updates(&api),
            vec![
                settings(HvacMode::Off, 60),
                settings(HvacMode::Cool, 30),
                settings(HvacMode::Off, 60),
            ]
        );
        // each update is followed by a settings read
        let reads = api
            .calls()
            .iter()
            .filter(|c| matches!(c, ApiCall::RequestThermostats { .. }))
            .count();
        assert_eq!(reads, 3);
    }

    #[test]
    fn expired_update_in_cooling_refreshes_and_moves_on() {
        let (_dir, store) = store_with_active_session();
        let api = FakeApi::default();
        api.push_update_result(Err(expired_error()));
        let session = bootstrap(&api, &store, &mut ScriptedConsole::new(&[]), "Home", "smartWrite").expect("bootstrap");
        let mut pause = RecordingPause::stop_after(2);

        DutyCycle::new(session)
            .run_from(DutyPhase::Cooling, &mut pause)
            .expect("run");

        assert_eq!(
            api.calls(),
            vec![
                ApiCall::UpdateThermostats {
                    access_token: "access-0".into(),
                    settings: settings(HvacMode::Cool, 30),
                },
                ApiCall::RefreshTokens {
                    refresh_token: "refresh-0".into()
                },
                ApiCall::RequestThermostats {
                    access_token: "access-1".into()
                },
                ApiCall::UpdateThermostats {
                    access_token: "access-1".into(),
                    settings: settings(HvacMode::Off, 60),
                },
                ApiCall::RequestThermostats {
                    access_token: "access-1".into()
                },
            ]
        );
        assert_eq!(pause.pauses, vec![COOL_DWELL, THAW_DWELL]);
        let stored = store.load("Home").expect("load").expect("present");
        assert_eq!(stored.access_token.as_deref(), Some("access-1"));
    }

    #[test]
    fn non_expiry_failures_do_not_stop_the_cycle() {
        let (_dir, store) = store_with_active_session();
        let api = FakeApi::default();
        api.push_update_result(Ok(UpdateThermostatResponse {
            status: Status {
                code: 8,
                message: "communication error".into(),
            },
        }));
        api.push_read_result(Err(EcobeeClientError::Transport("timed out".into())));
        api.push_update_result(Err(EcobeeClientError::Http {
            status: 503,
            message: "unavailable".into(),
        }));
        let session = bootstrap(&api, &store, &mut ScriptedConsole::new(&[]), "Home", "smartWrite").expect("bootstrap");
        let mut pause = RecordingPause::stop_after(2);

        DutyCycle::new(session).run(&mut pause).expect("run");

        assert_eq!(pause.pauses, vec![THAW_DWELL, COOL_DWELL]);
        assert_eq!(api.refresh_count(), 0);
    }

    #[test]
    fn failed_refresh_ends_the_loop_with_an_error() {
        let (_dir, store) = store_with_active_session();
        let api = FakeApi::default();
        api.push_update_result(Err(expired_error()));
        api.fail_refresh();
        let session = bootstrap(&api, &store, &mut ScriptedConsole::new(&[]), "Home", "smartWrite").expect("bootstrap");
        let mut pause = RecordingPause::stop_after(5);

        let err = DutyCycle::new(session).run(&mut pause).expect_err("fatal");

        assert!(matches!(err, LifecycleError::Api(_)));
        assert!(pause.pauses.is_empty());
    }

    #[test]
    fn settings_read_returns_first_thermostat() {
        let (_dir, store) = store_with_active_session();
        let api = FakeApi::default();
        api.push_read_result(Ok(thermostat_response(HvacMode::Cool, 30)));
        let session = bootstrap(&api, &store, &mut ScriptedConsole::new(&[]), "Home", "smartWrite").expect("bootstrap");
        let mut cycle = DutyCycle::new(session);

        let read = cycle.log_current_settings().expect("read");
        assert_eq!(read, Some(settings(HvacMode::Cool, 30)));
        assert_eq!(cycle.session().record().access_token.as_deref(), Some("access-0"));
    }

    #[test]
    fn interruptible_pause_stops_on_signal() {
        let (tx, rx) = mpsc::channel();
        let mut pause = InterruptiblePause::new(rx);
        assert_eq!(pause.pause(Duration::from_millis(5)), Resume::Continue);
        tx.send(()).expect("send");
        assert_eq!(pause.pause(Duration::from_secs(60)), Resume::Stop);
    }
}

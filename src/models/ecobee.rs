//! Models for the subset of the ecobee API this daemon talks to.
//!
//! Scope: types only, no HTTP code.
//!
//! Notes
//! - Field names follow the API's camelCase JSON, except the OAuth endpoints which use snake_case.
//! - Unknown fields are ignored so that API additions do not break decoding.

use serde::{Deserialize, Serialize};

/// Vendor status code meaning the access token has expired and must be refreshed.
pub const TOKEN_EXPIRED_CODE: i64 = 14;

// =====================
// OAuth (PIN authorization)
// =====================

/// Response of `GET /authorize?response_type=ecobeePin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    /// Short code the user types into the ecobee web portal.
    #[serde(rename = "ecobeePin")]
    pub ecobee_pin: String,
    /// Authorization grant, exchanged for tokens once the PIN is accepted.
    pub code: String,
    pub scope: String,
    /// Minutes until the PIN and grant expire.
    pub expires_in: i64,
    /// Minimum seconds between token polls.
    #[serde(default)]
    pub interval: Option<i64>,
}

/// Response of `POST /token` for both the PIN exchange and the refresh grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    pub refresh_token: String,
    #[serde(default)]
    pub scope: Option<String>,
}

/// OAuth style error body returned by `/authorize` and `/token`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_uri: Option<String>,
}

// =====================
// Thermostat API
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionType {
    Registered,
    Thermostats,
    ManagementSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub selection_type: SelectionType,
    pub selection_match: String,
    #[serde(default)]
    pub include_settings: bool,
}

impl Selection {
    /// Every thermostat registered to the authorized account, with settings included.
    pub fn registered_with_settings() -> Self {
        Selection {
            selection_type: SelectionType::Registered,
            selection_match: String::new(),
            include_settings: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HvacMode {
    Auto,
    AuxHeatOnly,
    Cool,
    Heat,
    Off,
}

/// Thermostat settings. Only the fields this daemon reads or writes are modelled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hvac_mode: Option<HvacMode>,
    /// Minimum minutes per hour the fan runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_min_on_time: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thermostat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thermostat_rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Error body returned by the `/1/*` endpoints on non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusBody {
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page: i64,
    pub total_pages: i64,
    pub page_size: i64,
    pub total: i64,
}

/// Response of `GET /1/thermostat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermostatResponse {
    #[serde(default)]
    pub page: Option<Page>,
    #[serde(default)]
    pub thermostat_list: Vec<Thermostat>,
    pub status: Status,
}

/// Body of `POST /1/thermostat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateThermostatRequest {
    pub selection: Selection,
    pub thermostat: Thermostat,
}

impl UpdateThermostatRequest {
    pub fn settings(selection: Selection, identifier: impl Into<String>, settings: Settings) -> Self {
        UpdateThermostatRequest {
            selection,
            thermostat: Thermostat {
                identifier: Some(identifier.into()),
                settings: Some(settings),
                ..Thermostat::default()
            },
        }
    }
}

/// Response of `POST /1/thermostat`; a non-zero status code means the update was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateThermostatResponse {
    pub status: Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/data/{name}")).expect("fixture present")
    }

    #[test]
    fn parses_thermostat_list_with_settings() {
        let res: ThermostatResponse = serde_json::from_str(&fixture("thermostat-response.json")).expect("parse");
        assert!(res.status.is_ok());
        assert_eq!(res.thermostat_list.len(), 1);
        let settings = res.thermostat_list[0].settings.as_ref().expect("settings included");
        assert_eq!(settings.hvac_mode, Some(HvacMode::Cool));
        assert_eq!(settings.fan_min_on_time, Some(30));
        assert_eq!(res.thermostat_list[0].name.as_deref(), Some("Home"));
    }

    #[test]
    fn update_request_serializes_only_changed_settings() {
        let req = UpdateThermostatRequest::settings(
            Selection::registered_with_settings(),
            "Home",
            Settings {
                hvac_mode: Some(HvacMode::Off),
                fan_min_on_time: Some(60),
            },
        );
        let json = serde_json::to_value(&req).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "selection": {"selectionType": "registered", "selectionMatch": "", "includeSettings": true},
                "thermostat": {"identifier": "Home", "settings": {"hvacMode": "off", "fanMinOnTime": 60}}
            })
        );
    }

    #[test]
    fn parses_authorize_response() {
        let res: AuthorizeResponse = serde_json::from_str(&fixture("authorize-response.json")).expect("parse");
        assert_eq!(res.ecobee_pin, "bv29");
        assert_eq!(res.expires_in, 9);
        assert_eq!(res.interval, Some(30));
    }
}

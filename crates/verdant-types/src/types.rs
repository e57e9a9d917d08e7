//! Telemetry and actuator control types.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::error::ParseError;

/// Aggregation granularity for historical metric queries.
///
/// Serialized lowercase, matching the backend's `scope` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Hourly buckets for a single day.
    Day,
    /// Daily buckets for a single month.
    #[default]
    Month,
    /// Monthly buckets for a single year.
    Year,
}

impl Scope {
    /// Wire name used in query strings.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Day => "day",
            Scope::Month => "month",
            Scope::Year => "year",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Scope::Day),
            "month" => Ok(Scope::Month),
            "year" => Ok(Scope::Year),
            other => Err(ParseError::InvalidValue(format!("unknown scope '{}'", other))),
        }
    }
}

/// Per-cell operating mode.
///
/// The server is authoritative; clients mirror it after every successful
/// mutation. Only `Manual` accepts user-issued actuator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Actuators are driven by the user.
    Manual,
    /// Actuators are driven by the backend's automation.
    Automatic,
}

impl Mode {
    /// Interpret the `mode` field returned by `GET /cells/:id/mode`.
    ///
    /// Anything other than `manual` is treated as automatic.
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        if value == "manual" {
            Mode::Manual
        } else {
            Mode::Automatic
        }
    }

    /// Value sent in the body of `POST /cells/:id/mode`.
    #[must_use]
    pub fn as_wire(&self) -> &'static str {
        match self {
            Mode::Manual => "manual",
            Mode::Automatic => "auto",
        }
    }

    /// The opposite mode.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Mode::Manual => Mode::Automatic,
            Mode::Automatic => Mode::Manual,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Manual => write!(f, "Manual"),
            Mode::Automatic => write!(f, "Automatic"),
        }
    }
}

impl FromStr for Mode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Mode::Manual),
            "auto" | "automatic" => Ok(Mode::Automatic),
            other => Err(ParseError::InvalidValue(format!("unknown mode '{}'", other))),
        }
    }
}

/// On/Off position of a single actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Switch {
    /// Powered.
    On,
    /// Not powered.
    #[default]
    Off,
}

impl Switch {
    /// Whether the switch is on.
    #[must_use]
    pub fn is_on(&self) -> bool {
        matches!(self, Switch::On)
    }

    /// The opposite position.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Switch::On => Switch::Off,
            Switch::Off => Switch::On,
        }
    }
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on { Switch::On } else { Switch::Off }
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Switch::On => write!(f, "On"),
            Switch::Off => write!(f, "Off"),
        }
    }
}

impl FromStr for Switch {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "1" | "true" => Ok(Switch::On),
            "off" | "0" | "false" => Ok(Switch::Off),
            other => Err(ParseError::InvalidValue(format!("unknown switch position '{}'", other))),
        }
    }
}

/// A controllable device inside a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Actuator {
    /// Grow light.
    Light,
    /// Air pump.
    AirPump,
    /// Water pump.
    WaterPump,
    /// Heater.
    Heater,
}

impl Actuator {
    /// Every actuator, in display order.
    pub const ALL: [Actuator; 4] = [
        Actuator::Light,
        Actuator::AirPump,
        Actuator::WaterPump,
        Actuator::Heater,
    ];

    /// Field name used on the wire (`light`, `airPump`, ...).
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            Actuator::Light => "light",
            Actuator::AirPump => "airPump",
            Actuator::WaterPump => "waterPump",
            Actuator::Heater => "heater",
        }
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actuator::Light => write!(f, "Light"),
            Actuator::AirPump => write!(f, "Air Pump"),
            Actuator::WaterPump => write!(f, "Water Pump"),
            Actuator::Heater => write!(f, "Heater"),
        }
    }
}

impl FromStr for Actuator {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "light" => Ok(Actuator::Light),
            "airpump" | "air" => Ok(Actuator::AirPump),
            "waterpump" | "water" => Ok(Actuator::WaterPump),
            "heater" => Ok(Actuator::Heater),
            _ => Err(ParseError::InvalidValue(format!("unknown actuator '{}'", s))),
        }
    }
}

/// Snapshot of a cell's four actuator switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActuatorState {
    pub light: Switch,
    pub air_pump: Switch,
    pub water_pump: Switch,
    pub heater: Switch,
}

impl ActuatorState {
    /// Position of one actuator.
    #[must_use]
    pub fn get(&self, actuator: Actuator) -> Switch {
        match actuator {
            Actuator::Light => self.light,
            Actuator::AirPump => self.air_pump,
            Actuator::WaterPump => self.water_pump,
            Actuator::Heater => self.heater,
        }
    }

    /// Set one actuator in place.
    pub fn set(&mut self, actuator: Actuator, switch: Switch) {
        match actuator {
            Actuator::Light => self.light = switch,
            Actuator::AirPump => self.air_pump = switch,
            Actuator::WaterPump => self.water_pump = switch,
            Actuator::Heater => self.heater = switch,
        }
    }

    /// Copy of this state with one actuator changed.
    #[must_use]
    pub fn with(mut self, actuator: Actuator, switch: Switch) -> Self {
        self.set(actuator, switch);
        self
    }

    /// Full command payload carrying all four flags.
    #[must_use]
    pub fn to_command(&self) -> CommandPayload {
        CommandPayload {
            light: self.light.is_on(),
            air_pump: self.air_pump.is_on(),
            water_pump: self.water_pump.is_on(),
            heater: self.heater.is_on(),
        }
    }

    /// Mirror the actuator flags carried by a live `metrics` event.
    ///
    /// A missing flag reads as `Off`.
    #[must_use]
    pub fn from_live(metric: &LiveMetric) -> Self {
        Self {
            light: Switch::from(FlagValue::is_set(metric.light.as_ref())),
            air_pump: Switch::from(FlagValue::is_set(metric.air_pump.as_ref())),
            water_pump: Switch::from(FlagValue::is_set(metric.water_pump.as_ref())),
            heater: Switch::from(FlagValue::is_set(metric.heater.as_ref())),
        }
    }
}

/// Body of `POST /cells/:id/command`.
///
/// Always carries every actuator, even when only one changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPayload {
    pub light: bool,
    pub air_pump: bool,
    pub water_pump: bool,
    pub heater: bool,
}

impl CommandPayload {
    /// Payload that changes only `actuator` relative to `current`.
    #[must_use]
    pub fn for_change(current: &ActuatorState, actuator: Actuator, switch: Switch) -> Self {
        current.with(actuator, switch).to_command()
    }
}

/// Actuator flag as sent by devices: either `0`/`1` or a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Number(f64),
}

impl FlagValue {
    /// Whether the flag reads as "on" (`true` or exactly `1`).
    #[must_use]
    pub fn is_on(&self) -> bool {
        match self {
            FlagValue::Bool(b) => *b,
            FlagValue::Number(n) => *n == 1.0,
        }
    }

    /// `is_on` for an optional flag; absent means off.
    #[must_use]
    pub fn is_set(flag: Option<&FlagValue>) -> bool {
        flag.is_some_and(FlagValue::is_on)
    }
}

/// Raw payload of a `metrics` event from the real-time channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveMetric {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub co2: Option<f64>,
    pub light_intensity: Option<f64>,
    pub moisture: Option<f64>,
    pub air_pump: Option<FlagValue>,
    pub water_pump: Option<FlagValue>,
    pub light: Option<FlagValue>,
    pub heater: Option<FlagValue>,
}

/// One entry of a chartable metric series.
///
/// Historical entries carry the year/month/day/hour components of their
/// aggregation bucket; live entries carry none. Both have a `date` label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metric {
    pub cell_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub co2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light_intensity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moisture: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub air: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hour: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub date: String,
}

impl Metric {
    /// Normalize a live event received at `received_at`.
    ///
    /// Actuator flags become booleans and the date label is the receipt
    /// time in RFC 3339.
    #[must_use]
    pub fn from_live(cell_id: &str, live: &LiveMetric, received_at: OffsetDateTime) -> Self {
        let date = received_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| received_at.to_string());
        Self {
            cell_id: cell_id.to_string(),
            temperature: live.temperature,
            humidity: live.humidity,
            co2: live.co2,
            light_intensity: live.light_intensity,
            moisture: live.moisture,
            air: Some(FlagValue::is_set(live.air_pump.as_ref())),
            water: Some(FlagValue::is_set(live.water_pump.as_ref())),
            light: Some(FlagValue::is_set(live.light.as_ref())),
            date,
            ..Default::default()
        }
    }

    /// Resolve the `date` label into a timestamp (UTC assumed).
    ///
    /// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS`, and `YYYY-MM-DD`.
    #[must_use]
    pub fn timestamp(&self) -> Option<OffsetDateTime> {
        if let Ok(ts) = OffsetDateTime::parse(&self.date, &Rfc3339) {
            return Some(ts);
        }
        let datetime = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
        if let Ok(ts) = PrimitiveDateTime::parse(&self.date, datetime) {
            return Some(ts.assume_utc());
        }
        let date = format_description!("[year]-[month]-[day]");
        Date::parse(&self.date, date)
            .ok()
            .map(|d| d.midnight().assume_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_mode_wire_mapping() {
        assert_eq!(Mode::from_wire("manual"), Mode::Manual);
        assert_eq!(Mode::from_wire("auto"), Mode::Automatic);
        // Anything unexpected falls back to automatic
        assert_eq!(Mode::from_wire("MANUAL"), Mode::Automatic);
        assert_eq!(Mode::Manual.as_wire(), "manual");
        assert_eq!(Mode::Automatic.as_wire(), "auto");
        assert_eq!(Mode::Manual.toggled(), Mode::Automatic);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("Automatic".parse::<Mode>().unwrap(), Mode::Automatic);
        assert_eq!("auto".parse::<Mode>().unwrap(), Mode::Automatic);
        assert_eq!("manual".parse::<Mode>().unwrap(), Mode::Manual);
        assert!("sometimes".parse::<Mode>().is_err());
    }

    #[test]
    fn test_scope_serialization() {
        assert_eq!(serde_json::to_string(&Scope::Day).unwrap(), "\"day\"");
        assert_eq!("YEAR".parse::<Scope>().unwrap(), Scope::Year);
        assert_eq!(Scope::default(), Scope::Month);
    }

    #[test]
    fn test_actuator_parsing() {
        assert_eq!("airPump".parse::<Actuator>().unwrap(), Actuator::AirPump);
        assert_eq!("air-pump".parse::<Actuator>().unwrap(), Actuator::AirPump);
        assert_eq!("water_pump".parse::<Actuator>().unwrap(), Actuator::WaterPump);
        assert_eq!("Heater".parse::<Actuator>().unwrap(), Actuator::Heater);
        assert!("sprinkler".parse::<Actuator>().is_err());
    }

    #[test]
    fn test_command_payload_changes_only_target() {
        let state = ActuatorState {
            light: Switch::On,
            air_pump: Switch::Off,
            water_pump: Switch::On,
            heater: Switch::Off,
        };

        let payload = CommandPayload::for_change(&state, Actuator::Heater, Switch::On);
        assert_eq!(
            payload,
            CommandPayload {
                light: true,
                air_pump: false,
                water_pump: true,
                heater: true,
            }
        );
    }

    #[test]
    fn test_command_payload_wire_names() {
        let json = serde_json::to_value(CommandPayload {
            light: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(json["light"], true);
        assert_eq!(json["airPump"], false);
        assert_eq!(json["waterPump"], false);
        assert_eq!(json["heater"], false);
    }

    #[test]
    fn test_live_metric_accepts_numeric_and_boolean_flags() {
        let json = r#"{"temperature":21.5,"co2":640,"light":1,"airPump":0,"waterPump":true}"#;
        let live: LiveMetric = serde_json::from_str(json).unwrap();

        let state = ActuatorState::from_live(&live);
        assert_eq!(state.light, Switch::On);
        assert_eq!(state.air_pump, Switch::Off);
        assert_eq!(state.water_pump, Switch::On);
        assert_eq!(state.heater, Switch::Off);
    }

    #[test]
    fn test_metric_from_live_normalizes_flags() {
        let live = LiveMetric {
            temperature: Some(22.0),
            air_pump: Some(FlagValue::Number(1.0)),
            water_pump: Some(FlagValue::Number(0.0)),
            ..Default::default()
        };
        let at = datetime!(2024-04-05 10:15:30 UTC);

        let metric = Metric::from_live("cell-1", &live, at);
        assert_eq!(metric.cell_id, "cell-1");
        assert_eq!(metric.temperature, Some(22.0));
        assert_eq!(metric.air, Some(true));
        assert_eq!(metric.water, Some(false));
        assert_eq!(metric.light, Some(false));
        assert_eq!(metric.date, "2024-04-05T10:15:30Z");
        assert_eq!(metric.timestamp(), Some(at));
    }

    #[test]
    fn test_metric_timestamp_formats() {
        let mut metric = Metric {
            date: "2024-04-05".to_string(),
            ..Default::default()
        };
        assert_eq!(metric.timestamp(), Some(datetime!(2024-04-05 00:00 UTC)));

        metric.date = "2024-04-05T07:00:00".to_string();
        assert_eq!(metric.timestamp(), Some(datetime!(2024-04-05 07:00 UTC)));

        metric.date = "not a date".to_string();
        assert!(metric.timestamp().is_none());
    }

    #[test]
    fn test_metric_deserializes_backend_bucket() {
        let json = r#"{"cellId":"c1","month":4,"day":5,"temperature":21}"#;
        let metric: Metric = serde_json::from_str(json).unwrap();
        assert_eq!(metric.month, Some(4));
        assert_eq!(metric.day, Some(5));
        assert_eq!(metric.temperature, Some(21.0));
        assert!(metric.date.is_empty());
    }
}

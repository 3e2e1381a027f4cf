//! Telemetry payload decoding.
//!
//! Gateways flatten device reports into a single JSON object whose keys carry
//! a short type sigil in front of the field name:
//!
//! | Sigil | Type      | Example          |
//! |-------|-----------|------------------|
//! | `_\|` | identifier| `_\|deviceHid`   |
//! | `s\|` | string    | `s\|msg_type`    |
//! | `f\|` | float     | `f\|voltage`     |
//! | `i\|` | integer   | `i\|rssi`        |
//! | `b\|` | boolean   | `b\|fail`        |

use super::RouteError;
use crate::backends::{FeedResult, SensorReport};
use serde_json::{Map, Value};
use tracing::debug;

const MSG_HEARTBEAT: &str = "hb";
const MSG_SENSOR: &str = "sensor";
const MSG_FEED_RESULT: &str = "feed_result";

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryReport {
    Heartbeat { device_id: String },
    Sensor(SensorReport),
    FeedResult(FeedResult),
    Other { device_id: String, message_type: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sigil {
    Id,
    Text,
    Float,
    Integer,
    Flag,
}

impl Sigil {
    pub fn prefix(self) -> &'static str {
        match self {
            Sigil::Id => "_|",
            Sigil::Text => "s|",
            Sigil::Float => "f|",
            Sigil::Integer => "i|",
            Sigil::Flag => "b|",
        }
    }

    pub fn key(self, name: &str) -> String {
        format!("{}{}", self.prefix(), name)
    }
}

/// Typed view over a sigil-tagged payload. `null` counts as absent.
pub struct SigilFields<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> SigilFields<'a> {
    pub fn new(fields: &'a Map<String, Value>) -> Self {
        Self { fields }
    }

    fn lookup(&self, sigil: Sigil, name: &str) -> Option<(String, &'a Value)> {
        let key = sigil.key(name);
        match self.fields.get(&key) {
            None | Some(Value::Null) => None,
            Some(value) => Some((key, value)),
        }
    }

    fn string(&self, sigil: Sigil, name: &str) -> Result<Option<String>, RouteError> {
        match self.lookup(sigil, name) {
            None => Ok(None),
            Some((_, Value::String(text))) => Ok(Some(text.clone())),
            Some((key, _)) => Err(RouteError::WrongType { field: key, expected: "string" }),
        }
    }

    pub fn id(&self, name: &str) -> Result<Option<String>, RouteError> {
        self.string(Sigil::Id, name)
    }

    pub fn text(&self, name: &str) -> Result<Option<String>, RouteError> {
        self.string(Sigil::Text, name)
    }

    pub fn float(&self, name: &str) -> Result<Option<f64>, RouteError> {
        match self.lookup(Sigil::Float, name) {
            None => Ok(None),
            Some((key, value)) => value
                .as_f64()
                .map(Some)
                .ok_or(RouteError::WrongType { field: key, expected: "number" }),
        }
    }

    /// Integers; whole floats such as `1700000000.0` are accepted.
    pub fn integer(&self, name: &str) -> Result<Option<i64>, RouteError> {
        match self.lookup(Sigil::Integer, name) {
            None => Ok(None),
            Some((key, value)) => value
                .as_i64()
                .or_else(|| whole_number(value))
                .map(Some)
                .ok_or(RouteError::WrongType { field: key, expected: "integer" }),
        }
    }

    /// An `i|` reading used as an on/off switch. Any non-zero number or `true`.
    pub fn switch(&self, name: &str) -> Result<Option<bool>, RouteError> {
        match self.lookup(Sigil::Integer, name) {
            None => Ok(None),
            Some((_, Value::Bool(on))) => Ok(Some(*on)),
            Some((key, value)) => value
                .as_f64()
                .map(|n| Some(n != 0.0))
                .ok_or(RouteError::WrongType { field: key, expected: "integer or boolean" }),
        }
    }

    /// Booleans; firmware sometimes sends `0`/`1` instead.
    pub fn flag(&self, name: &str) -> Result<Option<bool>, RouteError> {
        match self.lookup(Sigil::Flag, name) {
            None => Ok(None),
            Some((_, Value::Bool(flag))) => Ok(Some(*flag)),
            Some((key, value)) => value
                .as_i64()
                .map(|n| Some(n != 0))
                .ok_or(RouteError::WrongType { field: key, expected: "boolean" }),
        }
    }
}

fn whole_number(value: &Value) -> Option<i64> {
    value
        .as_f64()
        .filter(|n| n.fract() == 0.0 && *n >= i64::MIN as f64 && *n <= i64::MAX as f64)
        .map(|n| n as i64)
}

/// Optional fields never sink the whole report; a mistyped one reads as absent.
fn optional<T>(value: Result<Option<T>, RouteError>) -> Option<T> {
    value.unwrap_or_else(|e| {
        debug!("Ignoring optional field: {}", e);
        None
    })
}

fn required<T>(value: Option<T>, sigil: Sigil, name: &str) -> Result<T, RouteError> {
    value.ok_or_else(|| RouteError::MissingField(sigil.key(name)))
}

/// Decodes one telemetry object published by `gateway_id`.
pub fn parse_report(
    gateway_id: &str,
    payload: &Map<String, Value>,
) -> Result<TelemetryReport, RouteError> {
    let fields = SigilFields::new(payload);
    let device_id = required(fields.id("deviceHid")?, Sigil::Id, "deviceHid")?;
    let message_type = required(fields.text("msg_type")?, Sigil::Text, "msg_type")?;

    let report = match message_type.as_str() {
        MSG_HEARTBEAT => TelemetryReport::Heartbeat { device_id },
        MSG_SENSOR => {
            let millivolts = required(fields.float("voltage")?, Sigil::Float, "voltage")?;
            let usb_power = required(fields.switch("usb")?, Sigil::Integer, "usb")?;
            let charging = required(fields.switch("chg")?, Sigil::Integer, "chg")?;
            let ir = required(fields.switch("ir")?, Sigil::Integer, "ir")?;
            let rssi = required(fields.integer("rssi")?, Sigil::Integer, "rssi")?;
            TelemetryReport::Sensor(SensorReport {
                gateway_id: gateway_id.to_string(),
                device_id,
                voltage: millivolts / 1000.0,
                usb_power,
                charging,
                ir,
                rssi,
            })
        }
        MSG_FEED_RESULT => TelemetryReport::FeedResult(FeedResult {
            gateway_id: gateway_id.to_string(),
            device_id,
            start_time: optional(fields.integer("stime")),
            end_time: optional(fields.integer("etime")),
            pour: optional(fields.integer("pour")),
            full: optional(fields.integer("full")),
            grams_expected: optional(fields.float("e_g")),
            grams_actual: optional(fields.float("a_g")),
            hopper_start: optional(fields.float("h_s")),
            hopper_end: optional(fields.float("h_e")),
            source: optional(fields.integer("src")),
            fail: optional(fields.flag("fail")),
            trip: optional(fields.flag("trip")),
            lrg: optional(fields.flag("lrg")),
            vol: optional(fields.flag("vol")),
            bowl: optional(fields.flag("bowl")),
            recipe_id: optional(fields.text("rid")),
            error: optional(fields.text("err")),
        }),
        _ => TelemetryReport::Other {
            device_id,
            message_type,
        },
    };
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn sensor_voltage_is_converted_to_volts() {
        let payload = object(json!({
            "_|deviceHid": "dev-1",
            "s|msg_type": "sensor",
            "f|voltage": 5123.0,
            "i|usb": 1,
            "i|chg": 0,
            "i|ir": 1,
            "i|rssi": -67,
        }));

        let report = parse_report("gw-1", &payload).unwrap();
        let TelemetryReport::Sensor(sensor) = report else {
            panic!("expected sensor report, got {report:?}");
        };
        assert!((sensor.voltage - 5.123).abs() < 1e-9);
        assert!(sensor.usb_power);
        assert!(!sensor.charging);
        assert!(sensor.ir);
        assert_eq!(sensor.rssi, -67);
        assert_eq!(sensor.gateway_id, "gw-1");
    }

    #[test]
    fn sensor_requires_every_reading() {
        let payload = object(json!({
            "_|deviceHid": "dev-1",
            "s|msg_type": "sensor",
            "f|voltage": 5000,
            "i|usb": 1,
            "i|chg": 0,
            "i|ir": 1,
        }));
        assert!(matches!(
            parse_report("gw-1", &payload),
            Err(RouteError::MissingField(field)) if field == "i|rssi"
        ));
    }

    #[test]
    fn feed_result_fields_are_optional() {
        let payload = object(json!({
            "_|deviceHid": "dev-1",
            "s|msg_type": "feed_result",
            "i|stime": 1700000000,
            "f|a_g": 12.5,
            "b|fail": false,
            "b|bowl": 1,
            "s|rid": "E0000042",
            "s|err": null,
        }));

        let TelemetryReport::FeedResult(result) = parse_report("gw-1", &payload).unwrap() else {
            panic!("expected feed result");
        };
        assert_eq!(result.start_time, Some(1_700_000_000));
        assert_eq!(result.end_time, None);
        assert_eq!(result.grams_actual, Some(12.5));
        assert_eq!(result.fail, Some(false));
        assert_eq!(result.bowl, Some(true));
        assert_eq!(result.recipe_id.as_deref(), Some("E0000042"));
        assert_eq!(result.error, None);
    }

    #[test]
    fn sensor_switches_accept_booleans() {
        let payload = object(json!({
            "_|deviceHid": "dev-1",
            "s|msg_type": "sensor",
            "f|voltage": 5000,
            "i|usb": true,
            "i|chg": false,
            "i|ir": 2,
            "i|rssi": -60,
        }));

        let TelemetryReport::Sensor(sensor) = parse_report("gw-1", &payload).unwrap() else {
            panic!("expected sensor report");
        };
        assert!(sensor.usb_power);
        assert!(!sensor.charging);
        assert!(sensor.ir);
    }

    #[test]
    fn sensor_rssi_must_still_be_numeric() {
        let payload = object(json!({
            "_|deviceHid": "dev-1",
            "s|msg_type": "sensor",
            "f|voltage": 5000,
            "i|usb": 1,
            "i|chg": 0,
            "i|ir": 0,
            "i|rssi": "weak",
        }));
        assert!(matches!(
            parse_report("gw-1", &payload),
            Err(RouteError::WrongType { field, .. }) if field == "i|rssi"
        ));
    }

    #[test]
    fn mistyped_feed_result_fields_read_as_absent() {
        let payload = object(json!({
            "_|deviceHid": "dev-1",
            "s|msg_type": "feed_result",
            "i|stime": 1700000000.0,
            "i|etime": 1700000030.5,
            "f|a_g": "heavy",
            "b|fail": "no",
            "s|rid": 42,
        }));

        let TelemetryReport::FeedResult(result) = parse_report("gw-1", &payload).unwrap() else {
            panic!("expected feed result");
        };
        assert_eq!(result.start_time, Some(1_700_000_000));
        assert_eq!(result.end_time, None);
        assert_eq!(result.grams_actual, None);
        assert_eq!(result.fail, None);
        assert_eq!(result.recipe_id, None);
    }

    #[test]
    fn unknown_message_types_are_kept_as_other() {
        let payload = object(json!({"_|deviceHid": "dev-1", "s|msg_type": "diag"}));
        assert_eq!(
            parse_report("gw-1", &payload).unwrap(),
            TelemetryReport::Other {
                device_id: "dev-1".to_string(),
                message_type: "diag".to_string()
            }
        );
    }

    #[test]
    fn wrong_type_is_rejected() {
        let payload = object(json!({"_|deviceHid": 17, "s|msg_type": "hb"}));
        assert!(matches!(
            parse_report("gw-1", &payload),
            Err(RouteError::WrongType { .. })
        ));
    }
}

//! JSON documents carried inside an envelope.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const PAYLOAD_ON: &str = "ON";
pub const PAYLOAD_OFF: &str = "OFF";

/// Home-automation component id the gateway uses for lights.
pub const LIGHT_COMPONENT: u8 = 2;

/// Presence beacon.
///
/// Gateways fill in `bridge_online`; nodes send it empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeepAlive {
    pub bridge_online: Option<bool>,
}

#[derive(Deserialize, Serialize, Default)]
struct KeepAliveDocument {
    #[serde(rename = "bridgeOnline", default, skip_serializing_if = "Option::is_none")]
    bridge_online: Option<bool>,
    #[serde(rename = "MQTT", default, skip_serializing_if = "Option::is_none")]
    mqtt: Option<String>,
}

impl KeepAlive {
    pub fn empty() -> Self {
        KeepAlive { bridge_online: None }
    }

    pub fn from_gateway(bridge_online: bool) -> Self {
        KeepAlive {
            bridge_online: Some(bridge_online),
        }
    }

    /// Absent flag reads as offline.
    pub fn is_bridge_online(&self) -> bool {
        self.bridge_online.unwrap_or(false)
    }

    pub(crate) fn to_document(self) -> Result<Vec<u8>, serde_json::Error> {
        match self.bridge_online {
            None => Ok(Vec::new()),
            Some(online) => serde_json::to_vec(&KeepAliveDocument {
                bridge_online: None,
                mqtt: Some(if online { "online" } else { "offline" }.to_string()),
            }),
        }
    }

    pub(crate) fn from_document(document: &str) -> Result<Self, serde_json::Error> {
        if document.trim().is_empty() {
            return Ok(KeepAlive::empty());
        }
        let parsed: KeepAliveDocument = serde_json::from_str(document)?;
        let bridge_online = parsed
            .bridge_online
            .or_else(|| parsed.mqtt.map(|status| status.eq_ignore_ascii_case("online")));
        Ok(KeepAlive { bridge_online })
    }
}

/// Partial state update sent by the gateway. Missing keys leave the current
/// value untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_temperature: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rgb: Option<String>,
}

// Keys are read one by one so a single unusable value cannot void the rest.
impl<'de> Deserialize<'de> for SetCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let document = Value::deserialize(deserializer)?;
        Ok(SetCommand::from_json(&document))
    }
}

impl SetCommand {
    /// Builds a command from any JSON value. `power` wins over its legacy
    /// name `set`, `colorTemperature` over `temperature`. A key whose value
    /// cannot be read is treated as absent.
    pub fn from_json(document: &Value) -> Self {
        SetCommand {
            power: first_of(document, &["power", "set"], power_value),
            brightness: first_of(document, &["brightness"], integer_value),
            color_temperature: first_of(
                document,
                &["colorTemperature", "temperature"],
                integer_value,
            ),
            rgb: first_of(document, &["rgb"], |value| value.as_str().map(str::to_string)),
        }
    }

    pub fn power_on(&self) -> Option<bool> {
        self.power
            .as_deref()
            .map(|value| value.trim().eq_ignore_ascii_case("on"))
    }

    pub fn brightness_level(&self) -> Option<u8> {
        self.brightness.map(saturate_u8)
    }

    pub fn color_temperature_mireds(&self) -> Option<u16> {
        self.color_temperature
            .map(|value| value.clamp(0, u16::MAX as i64) as u16)
    }

    /// `"r,g,b"`; unparsable or missing components read as 0.
    pub fn rgb_components(&self) -> Option<(u8, u8, u8)> {
        let rgb = self.rgb.as_deref()?;
        let mut parts = rgb.split(',').map(|part| {
            part.trim()
                .parse::<i64>()
                .map(saturate_u8)
                .unwrap_or(0)
        });
        let mut next = || parts.next().unwrap_or(0);
        Some((next(), next(), next()))
    }
}

fn first_of<T>(document: &Value, keys: &[&str], read: impl Fn(&Value) -> Option<T>) -> Option<T> {
    keys.iter().find_map(|key| document.get(*key).and_then(&read))
}

fn power_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Bool(on) => Some(if *on { PAYLOAD_ON } else { PAYLOAD_OFF }.to_string()),
        _ => None,
    }
}

/// Integers as given, floats truncated, numeric strings parsed.
fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|f| f as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

fn saturate_u8(value: i64) -> u8 {
    value.clamp(0, u8::MAX as i64) as u8
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchState {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }
}

/// Current device state as reported to the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateReport {
    pub state: SwitchState,
    pub brightness: u8,
    pub temperature: u16,
    pub rgb: String,
}

/// Static identity plus uptime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(rename = "Type")]
    pub device_kind: String,
    #[serde(rename = "MCU")]
    pub mcu: String,
    #[serde(rename = "MAC")]
    pub mac: String,
    #[serde(rename = "Firmware")]
    pub firmware: String,
    #[serde(rename = "Library")]
    pub library: String,
    #[serde(rename = "Uptime")]
    pub uptime: String,
}

/// Discovery record the gateway turns into a home-automation entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigAnnouncement {
    pub name: String,
    pub unit: u8,
    #[serde(rename = "type")]
    pub component: u8,
    pub class: u8,
    pub payload_on: String,
    pub payload_off: String,
}

impl ConfigAnnouncement {
    pub fn light(name: impl Into<String>, class: u8) -> Self {
        ConfigAnnouncement {
            name: name.into(),
            unit: 1,
            component: LIGHT_COMPONENT,
            class,
            payload_on: PAYLOAD_ON.to_string(),
            payload_off: PAYLOAD_OFF.to_string(),
        }
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::endpoint::Endpoint;
use crate::types::{TemperatureUnit, ZoneMode};
use crate::{Error, Result};

pub const STATUS_OK: &str = "ok";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Put,
}

/// An outbound frame handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub endpoint: String,
    pub body: Option<Value>,
}

impl Request {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            endpoint: endpoint.into(),
            body: None,
        }
    }

    pub fn put(endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Put,
            endpoint: endpoint.into(),
            body: Some(body),
        }
    }
}

/// A device reply: `{ "id": "/zones/list", "value": ..., "status": "ok" }`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Response {
    pub id: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Response {
    pub fn parse(body: &Value) -> Result<Self> {
        Response::deserialize(body).map_err(|e| Error::Protocol(format!("malformed reply: {e}")))
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        Endpoint::parse(&self.id)
    }

    /// Bare write acknowledgements carry a status and nothing else.
    pub fn looks_like_ack(&self) -> bool {
        self.status.is_some() && self.value.is_null()
    }
}

/// A typed write, translated into its endpoint and `{"value": ...}` payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetTarget { zone_id: u8, temp: f64 },
    SetMode { zone_id: u8, mode: ZoneMode },
    SetAway(bool),
}

impl Command {
    pub fn action(&self) -> &'static str {
        match self {
            Command::SetTarget { .. } => "set_target",
            Command::SetMode { .. } => "set_mode",
            Command::SetAway(_) => "set_away",
        }
    }

    pub fn zone_id(&self) -> Option<u8> {
        match self {
            Command::SetTarget { zone_id, .. } | Command::SetMode { zone_id, .. } => Some(*zone_id),
            Command::SetAway(_) => None,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            Command::SetTarget { zone_id, .. } => Endpoint::ManualTemperature(*zone_id),
            Command::SetMode { zone_id, .. } => Endpoint::UserMode(*zone_id),
            Command::SetAway(_) => Endpoint::AwayMode,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Command::SetTarget { temp, .. } => json!({ "value": temp }),
            Command::SetMode { mode, .. } => json!({ "value": mode.as_device_str() }),
            Command::SetAway(away) => json!({ "value": if *away { "true" } else { "false" } }),
        }
    }
}

/// Only an explicit `"ok"` counts as an accepted write.
pub fn check_write_status(response: &Response) -> Result<()> {
    match response.status.as_deref() {
        Some(STATUS_OK) => Ok(()),
        other => Err(Error::WriteRejected {
            endpoint: response.id.clone(),
            status: other.unwrap_or("missing").to_string(),
        }),
    }
}

pub fn decode_temperature(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn decode_mode(value: &Value) -> Option<ZoneMode> {
    value.as_str().map(ZoneMode::from_device_str)
}

pub fn decode_unit(value: &Value) -> Option<TemperatureUnit> {
    value.as_str().map(TemperatureUnit::from_device_str)
}

/// Away comes back as the strings "true"/"false"; a bare bool is tolerated.
pub fn decode_away(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s == "true" => Some(true),
        Value::String(s) if s == "false" => Some(false),
        _ => None,
    }
}

/// One entry of the `/zones/list` array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZoneReading {
    pub id: u64,
    pub temp: f64,
    #[serde(default)]
    pub status: String,
}

/// Entries that fail to parse are skipped; the rest still apply.
pub fn decode_zone_list(value: &Value) -> Option<Vec<ZoneReading>> {
    let entries = value.as_array()?;
    Some(
        entries
            .iter()
            .filter_map(|entry| ZoneReading::deserialize(entry).ok())
            .collect(),
    )
}

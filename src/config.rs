//! Platform configuration, as found in the accessory host's JSON config block.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::transport::Credentials;
use crate::{Error, Result};

pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8124";
pub const DEFAULT_ZONE_INTERVAL_MINS: i64 = 2;
pub const DEFAULT_AUX_INTERVAL_MINS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZoneConfig {
    pub index: u8,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(deserialize_with = "string_or_number")]
    pub serial: String,
    pub access: String,
    pub password: String,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    /// Expose the away switch. On unless turned off.
    #[serde(default = "default_true")]
    pub away: bool,
    /// Minutes between zone list refreshes.
    #[serde(default = "default_zone_interval")]
    pub zone_interval: i64,
    /// Minutes between humidity and localization refreshes.
    #[serde(default = "default_aux_interval")]
    pub aux_interval: i64,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_zone_interval() -> i64 {
    DEFAULT_ZONE_INTERVAL_MINS
}

fn default_aux_interval() -> i64 {
    DEFAULT_AUX_INTERVAL_MINS
}

/// Serial numbers show up both quoted and bare.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(text).map_err(|e| Error::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("serial", &self.serial),
            ("access", &self.access),
            ("password", &self.password),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{field} is not set")));
            }
        }
        if self.zones.is_empty() {
            return Err(Error::Config("no zones defined".to_string()));
        }
        let mut seen = HashSet::new();
        for zone in &self.zones {
            if !seen.insert(zone.index) {
                return Err(Error::Config(format!("zone index {} listed twice", zone.index)));
            }
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            serial: self.serial.clone(),
            access_key: self.access.clone(),
            password: self.password.clone(),
        }
    }

    pub fn zone_interval(&self) -> Duration {
        minutes_at_least_one("zone", self.zone_interval)
    }

    pub fn aux_interval(&self) -> Duration {
        minutes_at_least_one("auxiliary", self.aux_interval)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn gateway_url(&self) -> &str {
        self.gateway.as_deref().unwrap_or(DEFAULT_GATEWAY_URL)
    }
}

const MAX_INTERVAL_MINUTES: i64 = 7 * 24 * 60;

fn minutes_at_least_one(what: &str, minutes: i64) -> Duration {
    let minutes = if minutes < 1 {
        warn!(requested = minutes, "{what} refresh interval can't be less than 1 minute, using 1");
        1
    } else if minutes > MAX_INTERVAL_MINUTES {
        warn!(requested = minutes, "{what} refresh interval capped at one week");
        MAX_INTERVAL_MINUTES
    } else {
        minutes
    };
    Duration::from_secs(minutes.unsigned_abs() * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"{
        "platform": "CT200",
        "serial": 101424242,
        "access": "abcd-efgh",
        "password": "secret",
        "zones": [{"index": 1, "name": "Living room"}, {"index": 2, "name": "Bedroom"}]
    }"#;

    #[test]
    fn defaults_applied() {
        let config = Config::from_json(BASIC).unwrap();
        assert_eq!(config.serial, "101424242");
        assert!(config.away);
        assert_eq!(config.zone_interval(), Duration::from_secs(120));
        assert_eq!(config.aux_interval(), Duration::from_secs(300));
        assert_eq!(config.gateway_url(), DEFAULT_GATEWAY_URL);
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.zones[1].name, "Bedroom");
    }

    #[test]
    fn intervals_floor_at_one_minute() {
        let text = r#"{"serial": "1", "access": "a", "password": "p",
            "zones": [{"index": 1, "name": "Z"}], "zoneInterval": 0, "auxInterval": -4, "away": false}"#;
        let config = Config::from_json(text).unwrap();
        assert_eq!(config.zone_interval(), Duration::from_secs(60));
        assert_eq!(config.aux_interval(), Duration::from_secs(60));
        assert!(!config.away);
    }

    #[test]
    fn huge_intervals_capped() {
        let text = format!(
            r#"{{"serial": "1", "access": "a", "password": "p",
            "zones": [{{"index": 1, "name": "Z"}}], "zoneInterval": {}, "auxInterval": 20000}}"#,
            i64::MAX
        );
        let config = Config::from_json(&text).unwrap();
        let week = Duration::from_secs(7 * 24 * 60 * 60);
        assert_eq!(config.zone_interval(), week);
        assert_eq!(config.aux_interval(), week);
    }

    #[test]
    fn missing_credentials_rejected() {
        let err = Config::from_json(r#"{"access": "a", "password": "p", "zones": []}"#).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("serial")));

        let err = Config::from_json(r#"{"serial": "1", "access": " ", "password": "p",
            "zones": [{"index": 1, "name": "Z"}]}"#)
        .unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("access")));
    }

    #[test]
    fn zones_required_and_unique() {
        let err = Config::from_json(r#"{"serial": "1", "access": "a", "password": "p"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("no zones")));

        let err = Config::from_json(r#"{"serial": "1", "access": "a", "password": "p",
            "zones": [{"index": 1, "name": "A"}, {"index": 1, "name": "B"}]}"#)
        .unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("twice")));
    }
}

use std::fmt;

pub const EP_ZONES: &str = "/zones/list";
pub const EP_LOCALIZATION: &str = "/gateway/localisation";
pub const EP_HUMIDITY: &str = "/system/sensors/humidity/indoor_h1";
pub const EP_AWAY: &str = "/system/awayMode/enabled";

const ZONE_PREFIX: &str = "/zones/zn";
const SUFFIX_SETPOINT: &str = "temperatureHeatingSetpoint";
const SUFFIX_MANUAL_TEMP: &str = "manualTemperatureHeating";
const SUFFIX_USER_MODE: &str = "userMode";
const SUFFIX_NEXT_SETPOINT: &str = "nextSetpoint";

/// Every device path the bridge reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ZoneList,
    Localization,
    Humidity,
    AwayMode,
    /// Read side of a zone's setpoint.
    TargetSetpoint(u8),
    /// Write side of a zone's setpoint.
    ManualTemperature(u8),
    UserMode(u8),
    /// Setpoint of the zone's next schedule switch point.
    NextSetpoint(u8),
}

impl Endpoint {
    pub fn parse(path: &str) -> Option<Self> {
        match path {
            EP_ZONES => return Some(Endpoint::ZoneList),
            EP_LOCALIZATION => return Some(Endpoint::Localization),
            EP_HUMIDITY => return Some(Endpoint::Humidity),
            EP_AWAY => return Some(Endpoint::AwayMode),
            _ => {}
        }

        let rest = path.strip_prefix(ZONE_PREFIX)?;
        let (digits, suffix) = rest.split_once('/')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let zone_id: u8 = digits.parse().ok()?;

        match suffix {
            SUFFIX_SETPOINT => Some(Endpoint::TargetSetpoint(zone_id)),
            SUFFIX_MANUAL_TEMP => Some(Endpoint::ManualTemperature(zone_id)),
            SUFFIX_USER_MODE => Some(Endpoint::UserMode(zone_id)),
            SUFFIX_NEXT_SETPOINT => Some(Endpoint::NextSetpoint(zone_id)),
            _ => None,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Endpoint::ZoneList => EP_ZONES.to_string(),
            Endpoint::Localization => EP_LOCALIZATION.to_string(),
            Endpoint::Humidity => EP_HUMIDITY.to_string(),
            Endpoint::AwayMode => EP_AWAY.to_string(),
            Endpoint::TargetSetpoint(id) => format!("{ZONE_PREFIX}{id}/{SUFFIX_SETPOINT}"),
            Endpoint::ManualTemperature(id) => format!("{ZONE_PREFIX}{id}/{SUFFIX_MANUAL_TEMP}"),
            Endpoint::UserMode(id) => format!("{ZONE_PREFIX}{id}/{SUFFIX_USER_MODE}"),
            Endpoint::NextSetpoint(id) => format!("{ZONE_PREFIX}{id}/{SUFFIX_NEXT_SETPOINT}"),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Readings above this are spurious; the device occasionally reports them.
pub const MAX_VALID_TEMPERATURE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeatingState {
    #[default]
    Off,
    Heat,
}

impl HeatingState {
    /// Derive from the free-text zone status, e.g. "heat request" or "idle".
    pub fn from_status(status: &str) -> Self {
        if status.contains("heat") {
            HeatingState::Heat
        } else {
            HeatingState::Off
        }
    }

    pub fn as_characteristic(&self) -> u8 {
        match self {
            HeatingState::Off => 0,
            HeatingState::Heat => 1,
        }
    }
}

/// Zone operating mode. The discriminants are the accessory characteristic
/// values; 2 (cool) has no device counterpart and is never produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneMode {
    #[default]
    Manual = 1,
    Auto = 3,
}

impl ZoneMode {
    pub fn as_device_str(&self) -> &'static str {
        match self {
            ZoneMode::Manual => "manual",
            ZoneMode::Auto => "clock",
        }
    }

    /// The device speaks two words: "clock" is the schedule, anything else manual.
    pub fn from_device_str(s: &str) -> Self {
        if s == "clock" {
            ZoneMode::Auto
        } else {
            ZoneMode::Manual
        }
    }

    pub fn as_characteristic(&self) -> u8 {
        *self as u8
    }

    /// Off has no device equivalent and falls back to the schedule;
    /// cool falls back to manual heating.
    pub fn from_characteristic(value: u8) -> Self {
        match value {
            0 | 3 => ZoneMode::Auto,
            _ => ZoneMode::Manual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn from_device_str(s: &str) -> Self {
        if s == "Celsius" {
            TemperatureUnit::Celsius
        } else {
            TemperatureUnit::Fahrenheit
        }
    }

    pub fn as_characteristic(&self) -> u8 {
        match self {
            TemperatureUnit::Celsius => 0,
            TemperatureUnit::Fahrenheit => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneState {
    pub id: u8,
    pub name: String,
    pub current_temp: f64,
    pub wanted_temp: f64,
    pub heating: HeatingState,
    pub mode: ZoneMode,
    pub display_unit: TemperatureUnit,
}

impl ZoneState {
    pub fn new(id: u8, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            current_temp: 0.0,
            wanted_temp: 10.0,
            heating: HeatingState::Off,
            mode: ZoneMode::Manual,
            display_unit: TemperatureUnit::Celsius,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlobalState {
    pub humidity: f64,
    pub localization: TemperatureUnit,
    pub away: bool,
}

/// Which global value an on-demand refresh targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalKind {
    Humidity,
    Localization,
    AwayMode,
}

/// Changes emitted by the router, one per bound characteristic.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ZoneTemperatureChanged { zone_id: u8, temp: f64 },
    ZoneHeatingChanged { zone_id: u8, state: HeatingState },
    ZoneTargetChanged { zone_id: u8, temp: f64 },
    ZoneModeChanged { zone_id: u8, mode: ZoneMode },
    DisplayUnitChanged { zone_id: u8, unit: TemperatureUnit },
    HumidityChanged { zone_id: u8, humidity: f64 },
    AwayModeChanged { away: bool },
}

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::cache::{CacheInner, StateCache};
use crate::endpoint::Endpoint;
use crate::protocol::{
    Response, decode_away, decode_mode, decode_temperature, decode_unit, decode_zone_list,
};
use crate::types::*;

pub type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;
pub type SnapshotCallback = Box<dyn Fn(&ZoneState) + Send + Sync>;

/// Applies device replies to the cache. Dispatch looks only at the id the
/// reply carries, so awaited replies and pushed notifications take the same
/// path.
pub struct ResponseRouter {
    cache: Arc<StateCache>,
    away_enabled: bool,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
}

impl ResponseRouter {
    pub fn new(cache: Arc<StateCache>, away_enabled: bool) -> Self {
        Self {
            cache,
            away_enabled,
            event_callbacks: Vec::new(),
            snapshot_callbacks: Vec::new(),
        }
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn on_snapshot(mut self, f: impl Fn(&ZoneState) + Send + Sync + 'static) -> Self {
        self.snapshot_callbacks.push(Box::new(f));
        self
    }

    pub(crate) fn with_callbacks(
        mut self,
        events: Vec<EventCallback>,
        snapshots: Vec<SnapshotCallback>,
    ) -> Self {
        self.event_callbacks.extend(events);
        self.snapshot_callbacks.extend(snapshots);
        self
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    /// Returns whether the reply changed anything the cache tracks.
    pub fn route(&self, response: &Response) -> bool {
        let Some(endpoint) = response.endpoint() else {
            debug!(id = %response.id, "ignoring reply for unknown endpoint");
            return false;
        };
        trace!(endpoint = %endpoint, "routing reply");

        let mut events = Vec::new();
        let mut touched = BTreeSet::new();
        let applied = self.cache.update(|inner| match endpoint {
            Endpoint::ZoneList => apply_zone_list(inner, response, &mut events, &mut touched),
            Endpoint::Localization => apply_localization(inner, response, &mut events, &mut touched),
            Endpoint::Humidity => apply_humidity(inner, response, &mut events),
            Endpoint::AwayMode => self.apply_away(inner, response, &mut events),
            Endpoint::TargetSetpoint(id) => {
                apply_setpoint(inner, id, response, &mut events, &mut touched)
            }
            Endpoint::UserMode(id) => apply_mode(inner, id, response, &mut events, &mut touched),
            Endpoint::ManualTemperature(id) => {
                // Write-only endpoint; its replies are acknowledgements.
                trace!(zone = id, "ignoring setpoint write acknowledgement");
                false
            }
            // Only read when advancing the schedule, which writes it back as the target.
            Endpoint::NextSetpoint(_) => false,
        });

        self.emit(&events, &touched);
        applied
    }

    fn apply_away(&self, inner: &mut CacheInner, response: &Response, events: &mut Vec<Event>) -> bool {
        let Some(away) = decode_away(&response.value) else {
            warn!(value = %response.value, "unrecognised away mode value");
            return false;
        };
        inner.global.away = away;
        if self.away_enabled {
            events.push(Event::AwayModeChanged { away });
        }
        true
    }

    fn emit(&self, events: &[Event], touched: &BTreeSet<u8>) {
        for event in events {
            for cb in &self.event_callbacks {
                cb(event);
            }
        }
        if self.snapshot_callbacks.is_empty() {
            return;
        }
        for id in touched {
            if let Some(zone) = self.cache.zone(*id) {
                for cb in &self.snapshot_callbacks {
                    cb(&zone);
                }
            }
        }
    }
}

fn apply_zone_list(
    inner: &mut CacheInner,
    response: &Response,
    events: &mut Vec<Event>,
    touched: &mut BTreeSet<u8>,
) -> bool {
    let Some(readings) = decode_zone_list(&response.value) else {
        warn!("zone list reply is not an array");
        return false;
    };

    let mut applied = false;
    for reading in readings {
        let Some(zone) = u8::try_from(reading.id)
            .ok()
            .and_then(|id| inner.zones.get_mut(&id))
        else {
            trace!(zone = reading.id, "zone not configured, skipping");
            continue;
        };

        if reading.temp <= MAX_VALID_TEMPERATURE {
            zone.current_temp = reading.temp;
        } else {
            debug!(zone = zone.id, temp = reading.temp, "ignoring out-of-range temperature");
        }
        zone.heating = HeatingState::from_status(&reading.status);

        events.push(Event::ZoneTemperatureChanged { zone_id: zone.id, temp: zone.current_temp });
        events.push(Event::ZoneHeatingChanged { zone_id: zone.id, state: zone.heating });
        touched.insert(zone.id);
        applied = true;
    }
    applied
}

fn apply_localization(
    inner: &mut CacheInner,
    response: &Response,
    events: &mut Vec<Event>,
    touched: &mut BTreeSet<u8>,
) -> bool {
    let Some(unit) = decode_unit(&response.value) else {
        warn!(value = %response.value, "unrecognised localization value");
        return false;
    };
    inner.global.localization = unit;
    for zone in inner.zones.values_mut() {
        zone.display_unit = unit;
        events.push(Event::DisplayUnitChanged { zone_id: zone.id, unit });
        touched.insert(zone.id);
    }
    true
}

fn apply_humidity(inner: &mut CacheInner, response: &Response, events: &mut Vec<Event>) -> bool {
    let Some(humidity) = response.value.as_f64() else {
        warn!(value = %response.value, "unrecognised humidity value");
        return false;
    };
    inner.global.humidity = humidity;
    for zone_id in inner.zones.keys() {
        events.push(Event::HumidityChanged { zone_id: *zone_id, humidity });
    }
    true
}

fn apply_setpoint(
    inner: &mut CacheInner,
    zone_id: u8,
    response: &Response,
    events: &mut Vec<Event>,
    touched: &mut BTreeSet<u8>,
) -> bool {
    let Some(zone) = inner.zones.get_mut(&zone_id) else {
        debug!(zone = zone_id, "setpoint for unconfigured zone, discarding");
        return false;
    };
    let Some(temp) = decode_temperature(&response.value) else {
        warn!(zone = zone_id, value = %response.value, "unrecognised setpoint value");
        return false;
    };
    zone.wanted_temp = temp;
    events.push(Event::ZoneTargetChanged { zone_id, temp });
    touched.insert(zone_id);
    true
}

fn apply_mode(
    inner: &mut CacheInner,
    zone_id: u8,
    response: &Response,
    events: &mut Vec<Event>,
    touched: &mut BTreeSet<u8>,
) -> bool {
    let Some(zone) = inner.zones.get_mut(&zone_id) else {
        debug!(zone = zone_id, "mode for unconfigured zone, discarding");
        return false;
    };
    let Some(mode) = decode_mode(&response.value) else {
        warn!(zone = zone_id, value = %response.value, "unrecognised mode value");
        return false;
    };
    zone.mode = mode;
    events.push(Event::ZoneModeChanged { zone_id, mode });
    touched.insert(zone_id);
    true
}

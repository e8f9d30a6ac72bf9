use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::cache::StateCache;
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::endpoint::Endpoint;
use crate::engine::Engine;
use crate::logger::{MessageLogMode, MessageLogger};
use crate::poller::{DEFAULT_AUX_INTERVAL, DEFAULT_ZONE_INTERVAL, Poller, RefreshClass};
use crate::protocol::{Command, check_write_status, decode_temperature};
use crate::router::{EventCallback, ResponseRouter, SnapshotCallback};
use crate::transport::{Credentials, GatewayTransport, Transport};
use crate::types::*;
use crate::{Error, Result};

pub struct BridgeBuilder<T: Transport = GatewayTransport> {
    transport: T,
    credentials: Credentials,
    zones: Vec<ZoneState>,
    away_enabled: bool,
    zone_interval: Duration,
    aux_interval: Duration,
    request_timeout: Option<Duration>,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl BridgeBuilder<GatewayTransport> {
    /// Gateway transport plus every setting the config carries.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = GatewayTransport::new(config.gateway_url())?;
        let mut builder = BridgeBuilder::new(transport, config.credentials())
            .away_enabled(config.away)
            .zone_interval(config.zone_interval())
            .aux_interval(config.aux_interval());
        for zone in &config.zones {
            builder = builder.zone(zone.index, zone.name.clone());
        }
        if let Some(timeout) = config.request_timeout() {
            builder = builder.request_timeout(timeout);
        }
        Ok(builder)
    }
}

impl<T: Transport> BridgeBuilder<T> {
    pub fn new(transport: T, credentials: Credentials) -> Self {
        Self {
            transport,
            credentials,
            zones: Vec::new(),
            away_enabled: true,
            zone_interval: DEFAULT_ZONE_INTERVAL,
            aux_interval: DEFAULT_AUX_INTERVAL,
            request_timeout: None,
            event_callbacks: Vec::new(),
            snapshot_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    /// Registers a zone. Re-registering an id replaces its name.
    pub fn zone(mut self, id: u8, name: impl Into<String>) -> Self {
        self.zones.retain(|z| z.id != id);
        self.zones.push(ZoneState::new(id, name));
        self
    }

    pub fn away_enabled(mut self, enabled: bool) -> Self {
        self.away_enabled = enabled;
        self
    }

    pub fn zone_interval(mut self, interval: Duration) -> Self {
        self.zone_interval = interval;
        self
    }

    pub fn aux_interval(mut self, interval: Duration) -> Self {
        self.aux_interval = interval;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn on_snapshot(mut self, f: impl Fn(&ZoneState) + Send + Sync + 'static) -> Self {
        self.snapshot_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Bridge<T>> {
        let cache = Arc::new(StateCache::new(self.zones));
        let router = ResponseRouter::new(cache.clone(), self.away_enabled)
            .with_callbacks(self.event_callbacks, self.snapshot_callbacks);

        let mut connection = ConnectionManager::new(self.transport, self.credentials);
        if let Some(timeout) = self.request_timeout {
            connection = connection.request_timeout(timeout);
        }
        if let (Some(mode), Some(path)) = (self.log_mode, self.log_path) {
            connection = connection.message_logger(MessageLogger::new(mode, &path)?);
        }

        let engine = Arc::new(Engine::new(connection, router));
        let poller = Poller::new(engine.clone(), self.zone_interval, self.aux_interval);

        Ok(Bridge {
            engine,
            poller,
            cache,
            away_enabled: self.away_enabled,
            pump: Mutex::new(None),
        })
    }
}

/// The accessory-facing side of the bridge. Getters answer from the cache
/// immediately; setters go to the device and report rejection.
pub struct Bridge<T: Transport = GatewayTransport> {
    engine: Arc<Engine<T>>,
    poller: Poller<T>,
    cache: Arc<StateCache>,
    away_enabled: bool,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> Bridge<T> {
    pub fn builder(transport: T, credentials: Credentials) -> BridgeBuilder<T> {
        BridgeBuilder::new(transport, credentials)
    }

    pub async fn connect(&self) -> Result<()> {
        self.engine.connection.connect().await?;
        self.engine.bind_runtime(Handle::current());

        if let Some(mut rx) = self.engine.connection.take_unsolicited() {
            let engine = self.engine.clone();
            let pump = tokio::spawn(async move {
                while let Some(response) = rx.recv().await {
                    engine.router.route(&response);
                }
            });
            *self.pump.lock() = Some(pump);
        }
        Ok(())
    }

    /// Rebuilds the cache from a full query, then starts the periodic timers.
    pub async fn start(&self) -> Result<()> {
        if !self.engine.connection.is_connected() {
            return Err(Error::NotConnected);
        }
        let failed = self.engine.refresh_all(self.startup_endpoints()).await;
        if failed > 0 {
            warn!(failed, "initial refresh incomplete, timers will retry");
        }
        self.poller.start();
        Ok(())
    }

    pub fn shutdown(&self) {
        self.poller.stop();
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    pub fn poll_interval(&self, class: RefreshClass) -> Duration {
        self.poller.interval(class)
    }

    fn startup_endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints = vec![Endpoint::ZoneList, Endpoint::Humidity, Endpoint::Localization];
        if self.away_enabled {
            endpoints.push(Endpoint::AwayMode);
        }
        for id in self.cache.zone_ids() {
            endpoints.push(Endpoint::TargetSetpoint(id));
            endpoints.push(Endpoint::UserMode(id));
        }
        endpoints
    }

    // -- Snapshots --

    pub fn zone_snapshot(&self, id: u8) -> Option<ZoneState> {
        self.cache.zone(id)
    }

    pub fn zones(&self) -> Vec<ZoneState> {
        self.cache.zones()
    }

    pub fn global_snapshot(&self) -> GlobalState {
        self.cache.global()
    }

    // -- On-demand refresh --

    pub fn request_zone_refresh(&self, id: u8) -> Result<()> {
        self.require_zone(id)?;
        self.poller.refresh_now(Endpoint::TargetSetpoint(id));
        self.poller.refresh_now(Endpoint::UserMode(id));
        Ok(())
    }

    pub fn request_global_refresh(&self, kind: GlobalKind) {
        let endpoint = match kind {
            GlobalKind::Humidity => Endpoint::Humidity,
            GlobalKind::Localization => Endpoint::Localization,
            GlobalKind::AwayMode => Endpoint::AwayMode,
        };
        self.poller.refresh_now(endpoint);
    }

    // -- Characteristic getters --

    pub fn current_temperature(&self, id: u8) -> Result<f64> {
        Ok(self.require_zone(id)?.current_temp)
    }

    pub fn heating_state(&self, id: u8) -> Result<HeatingState> {
        Ok(self.require_zone(id)?.heating)
    }

    /// Returns the cached setpoint and asks the device for a fresh one; the
    /// fresh value shows up on a later read.
    pub fn target_temperature(&self, id: u8) -> Result<f64> {
        let zone = self.require_zone(id)?;
        self.poller.refresh_now(Endpoint::TargetSetpoint(id));
        Ok(zone.wanted_temp)
    }

    pub fn target_mode(&self, id: u8) -> Result<ZoneMode> {
        let zone = self.require_zone(id)?;
        self.poller.refresh_now(Endpoint::UserMode(id));
        Ok(zone.mode)
    }

    pub fn humidity(&self) -> f64 {
        self.cache.global().humidity
    }

    pub fn display_unit(&self) -> TemperatureUnit {
        self.cache.global().localization
    }

    pub fn away_mode(&self) -> bool {
        let away = self.cache.global().away;
        self.poller.refresh_now(Endpoint::AwayMode);
        away
    }

    // -- Commands --

    pub async fn set_zone_target(&self, id: u8, temp: f64) -> Result<()> {
        self.require_zone(id)?;
        self.write(Command::SetTarget { zone_id: id, temp }).await?;
        self.poller.refresh_now(Endpoint::TargetSetpoint(id));
        Ok(())
    }

    /// Switching mode can move the setpoint, so both are re-read afterwards.
    pub async fn set_zone_mode(&self, id: u8, mode: ZoneMode) -> Result<()> {
        self.require_zone(id)?;
        self.write(Command::SetMode { zone_id: id, mode }).await?;
        self.poller.refresh_now(Endpoint::UserMode(id));
        self.poller.refresh_now(Endpoint::TargetSetpoint(id));
        Ok(())
    }

    /// Away mode changes every zone's setpoint.
    pub async fn set_away_mode(&self, away: bool) -> Result<()> {
        self.write(Command::SetAway(away)).await?;
        self.poller.refresh_now(Endpoint::AwayMode);
        for id in self.cache.zone_ids() {
            self.poller.refresh_now(Endpoint::TargetSetpoint(id));
        }
        Ok(())
    }

    /// Jumps to the next schedule switch point by writing its setpoint as
    /// the zone's target. Returns the setpoint applied.
    pub async fn advance_schedule(&self, id: u8) -> Result<f64> {
        self.require_zone(id)?;
        let response = self.engine.connection.request(Endpoint::NextSetpoint(id)).await?;
        let temp = decode_temperature(&response.value)
            .filter(|t| *t <= MAX_VALID_TEMPERATURE)
            .ok_or_else(|| Error::Protocol(format!("unusable next setpoint {}", response.value)))?;
        debug!(zone = id, temp, "advancing schedule");
        self.set_zone_target(id, temp).await?;
        Ok(temp)
    }

    /// The unit system can only be changed on the device itself.
    pub fn set_display_unit(&self, unit: TemperatureUnit) -> Result<()> {
        warn!(requested = ?unit, "temperature units can't be changed remotely, change them in the Bosch app");
        Err(Error::ReadOnly("temperature display unit"))
    }

    // -- Helpers --

    fn require_zone(&self, id: u8) -> Result<ZoneState> {
        self.cache.zone(id).ok_or(Error::InvalidZone(id))
    }

    async fn write(&self, command: Command) -> Result<()> {
        let endpoint = command.endpoint();
        let payload = command.payload();
        debug!(endpoint = %endpoint, payload = %payload, "setting");
        self.engine
            .connection
            .log_command(command.action(), command.zone_id(), &payload);

        let result = match self.engine.connection.command(endpoint, payload).await {
            Ok(response) => check_write_status(&response),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => trace!(action = command.action(), "write accepted"),
            Err(ref e) => error!(action = command.action(), error = %e, "write failed"),
        }
        result
    }
}

impl<T: Transport> Drop for Bridge<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

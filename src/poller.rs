use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::engine::Engine;
use crate::transport::Transport;

pub const DEFAULT_ZONE_INTERVAL: Duration = Duration::from_secs(2 * 60);
pub const DEFAULT_AUX_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshClass {
    Zones,
    /// Humidity and localization.
    Auxiliary,
}

impl RefreshClass {
    pub fn endpoints(&self) -> &'static [Endpoint] {
        match self {
            RefreshClass::Zones => &[Endpoint::ZoneList],
            RefreshClass::Auxiliary => &[Endpoint::Humidity, Endpoint::Localization],
        }
    }
}

/// One timer per refresh class. A tick fires its requests and goes back to
/// idle; a failed request is logged and the next tick is the retry.
pub(crate) struct Poller<T: Transport> {
    engine: Arc<Engine<T>>,
    zone_interval: Duration,
    aux_interval: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Transport> Poller<T> {
    pub fn new(engine: Arc<Engine<T>>, zone_interval: Duration, aux_interval: Duration) -> Self {
        Self {
            engine,
            zone_interval,
            aux_interval,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn interval(&self, class: RefreshClass) -> Duration {
        match class {
            RefreshClass::Zones => self.zone_interval,
            RefreshClass::Auxiliary => self.aux_interval,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    /// First ticks come one period after start; startup does its own full query.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }
        for class in [RefreshClass::Zones, RefreshClass::Auxiliary] {
            let period = self.interval(class);
            let engine = self.engine.clone();
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    debug!(class = ?class, "periodic refresh");
                    for endpoint in class.endpoints() {
                        engine.spawn_refresh(*endpoint);
                    }
                }
            }));
        }
    }

    /// Out-of-band refresh. Leaves the periodic timers alone.
    pub fn refresh_now(&self, endpoint: Endpoint) {
        self.engine.spawn_refresh(endpoint);
    }

    pub fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl<T: Transport> Drop for Poller<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

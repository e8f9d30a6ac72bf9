use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::{GlobalState, ZoneState};

#[derive(Debug, Default)]
pub(crate) struct CacheInner {
    pub zones: HashMap<u8, ZoneState>,
    pub global: GlobalState,
}

/// Zone and global state, shared between the router (sole writer) and any
/// number of readers. Reads return owned snapshots.
#[derive(Debug, Default)]
pub struct StateCache {
    inner: RwLock<CacheInner>,
}

impl StateCache {
    pub fn new(zones: impl IntoIterator<Item = ZoneState>) -> Self {
        let zones = zones.into_iter().map(|z| (z.id, z)).collect();
        Self {
            inner: RwLock::new(CacheInner {
                zones,
                global: GlobalState::default(),
            }),
        }
    }

    pub fn zone(&self, id: u8) -> Option<ZoneState> {
        self.inner.read().zones.get(&id).cloned()
    }

    /// All zones, ordered by id.
    pub fn zones(&self) -> Vec<ZoneState> {
        let inner = self.inner.read();
        let mut zones: Vec<_> = inner.zones.values().cloned().collect();
        zones.sort_by_key(|z| z.id);
        zones
    }

    pub fn zone_ids(&self) -> Vec<u8> {
        let mut ids: Vec<_> = self.inner.read().zones.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn global(&self) -> GlobalState {
        self.inner.read().global
    }

    /// Runs `f` under the write lock so one reply lands as one update.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut CacheInner) -> R) -> R {
        f(&mut self.inner.write())
    }
}

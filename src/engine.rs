use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::connection::ConnectionManager;
use crate::endpoint::Endpoint;
use crate::router::ResponseRouter;
use crate::transport::Transport;
use crate::{Error, Result};

/// Connection plus router: everything needed to turn a query into a cache update.
pub(crate) struct Engine<T: Transport> {
    pub connection: ConnectionManager<T>,
    pub router: ResponseRouter,
    runtime: Mutex<Option<Handle>>,
}

impl<T: Transport> Engine<T> {
    pub fn new(connection: ConnectionManager<T>, router: ResponseRouter) -> Self {
        Self {
            connection,
            router,
            runtime: Mutex::new(None),
        }
    }

    /// Runtime that on-demand refreshes run on, so sync getters work from
    /// threads outside it.
    pub fn bind_runtime(&self, handle: Handle) {
        *self.runtime.lock() = Some(handle);
    }

    pub async fn refresh(&self, endpoint: Endpoint) -> Result<bool> {
        let response = self.connection.request(endpoint).await?;
        Ok(self.router.route(&response))
    }

    /// Refresh whose failure is only logged; the next tick retries.
    pub async fn refresh_logged(&self, endpoint: Endpoint) -> bool {
        match self.refresh(endpoint).await {
            Ok(_) => true,
            Err(Error::RateLimited) => {
                warn!(endpoint = %endpoint, "too many requests, skipping refresh");
                false
            }
            Err(e @ Error::Protocol(_)) => {
                error!(endpoint = %endpoint, error = %e, "bad reply, check login details");
                false
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "refresh failed");
                false
            }
        }
    }

    /// Fire-and-forget refresh; the caller keeps reading the cached value.
    pub fn spawn_refresh(self: &Arc<Self>, endpoint: Endpoint) {
        let bound = self.runtime.lock().clone();
        let Some(handle) = bound.or_else(|| Handle::try_current().ok()) else {
            warn!(endpoint = %endpoint, "no runtime available, serving cached value only");
            return;
        };
        let engine = self.clone();
        handle.spawn(async move {
            engine.refresh_logged(endpoint).await;
        });
    }

    /// Queries every endpoint concurrently; returns how many failed.
    pub async fn refresh_all(self: &Arc<Self>, endpoints: Vec<Endpoint>) -> usize {
        let total = endpoints.len();
        let mut set = JoinSet::new();
        for endpoint in endpoints {
            let engine = self.clone();
            set.spawn(async move { engine.refresh_logged(endpoint).await });
        }

        let mut failed = 0;
        while let Some(joined) = set.join_next().await {
            if !matches!(joined, Ok(true)) {
                failed += 1;
            }
        }
        debug!(total, failed, "full refresh complete");
        failed
    }
}

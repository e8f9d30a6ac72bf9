use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::endpoint::Endpoint;
use crate::logger::MessageLogger;
use crate::protocol::{Method, Request, Response};
use crate::transport::{Credentials, Inbound, Origin, Transport};
use crate::{Error, Result};

type Reply = Result<Response>;
type PendingMap = HashMap<Origin, VecDeque<oneshot::Sender<Reply>>>;

/// Owns the single device session and pairs every inbound frame with the
/// call waiting for it. Replies are matched by the endpoint id they carry,
/// never by arrival order. Frames nobody waits for go to the unsolicited
/// channel.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    credentials: Credentials,
    pending: Arc<Mutex<PendingMap>>,
    connected: Arc<AtomicBool>,
    request_timeout: Option<Duration>,
    logger: Option<Arc<Mutex<MessageLogger>>>,
    unsolicited_tx: mpsc::UnboundedSender<Response>,
    unsolicited_rx: Mutex<Option<mpsc::UnboundedReceiver<Response>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, credentials: Credentials) -> Self {
        let (unsolicited_tx, unsolicited_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            credentials,
            pending: Arc::new(Mutex::new(HashMap::new())),
            connected: Arc::new(AtomicBool::new(false)),
            request_timeout: None,
            logger: None,
            unsolicited_tx,
            unsolicited_rx: Mutex::new(Some(unsolicited_rx)),
            reader: Mutex::new(None),
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub(crate) fn message_logger(mut self, logger: MessageLogger) -> Self {
        self.logger = Some(Arc::new(Mutex::new(logger)));
        self
    }

    /// Replies that matched no outstanding call. Can be taken once.
    pub fn take_unsolicited(&self) -> Option<mpsc::UnboundedReceiver<Response>> {
        self.unsolicited_rx.lock().take()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Opens the session. Not retried: without it nothing else can work.
    pub async fn connect(&self) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(serial = %self.credentials.serial, "connecting to device");

        if let Err(e) = self.transport.connect(&self.credentials, tx).await {
            error!(error = %e, "failed to connect to device");
            return Err(e);
        }

        let reader = tokio::spawn(read_loop(
            rx,
            self.pending.clone(),
            self.connected.clone(),
            self.unsolicited_tx.clone(),
            self.logger.clone(),
        ));
        if let Some(old) = self.reader.lock().replace(reader) {
            old.abort();
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn request(&self, endpoint: Endpoint) -> Result<Response> {
        self.dispatch(Request::get(endpoint.path())).await
    }

    pub async fn command(&self, endpoint: Endpoint, payload: Value) -> Result<Response> {
        self.dispatch(Request::put(endpoint.path(), payload)).await
    }

    pub(crate) fn log_command(&self, action: &str, zone: Option<u8>, body: &Value) {
        if let Some(ref logger) = self.logger {
            logger.lock().log_command(action, zone, body);
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let origin = Origin::from(&request);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .entry(origin.clone())
            .or_default()
            .push_back(tx);

        if let Some(ref logger) = self.logger {
            logger
                .lock()
                .log_request(request.method, &request.endpoint, request.body.as_ref());
        }
        trace!(method = ?origin.method, endpoint = %origin.endpoint, "dispatching");

        if let Err(e) = self.transport.send(request) {
            drop(rx);
            prune_closed(&self.pending, &origin);
            return Err(e);
        }

        let outcome = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(endpoint = %origin.endpoint, "request timed out");
                    prune_closed(&self.pending, &origin);
                    return Err(Error::Timeout);
                }
            },
            None => rx.await,
        };

        outcome.unwrap_or_else(|_| Err(Error::Transport("connection closed before reply".to_string())))
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}

async fn read_loop(
    mut rx: mpsc::UnboundedReceiver<Inbound>,
    pending: Arc<Mutex<PendingMap>>,
    connected: Arc<AtomicBool>,
    unsolicited: mpsc::UnboundedSender<Response>,
    logger: Option<Arc<Mutex<MessageLogger>>>,
) {
    while let Some(frame) = rx.recv().await {
        match frame {
            Inbound::Reply { origin, body } => {
                if let Some(ref logger) = logger {
                    let endpoint = origin
                        .as_ref()
                        .map(|o| o.endpoint.as_str())
                        .or_else(|| body.get("id").and_then(|v| v.as_str()))
                        .unwrap_or("?");
                    logger.lock().log_reply(endpoint, &body);
                }
                handle_reply(&pending, &unsolicited, origin, body);
            }
            Inbound::Failed { origin, error } => {
                warn!(endpoint = %origin.endpoint, error = %error, "request failed");
                if let Some(ref logger) = logger {
                    logger.lock().log_failure(&origin.endpoint, &error.to_string());
                }
                if resolve(&pending, &origin, Err(error)).is_err() {
                    debug!(endpoint = %origin.endpoint, "failure for abandoned request");
                }
            }
        }
    }

    debug!("transport closed, failing outstanding requests");
    connected.store(false, Ordering::SeqCst);
    let drained: Vec<_> = pending.lock().drain().collect();
    for (_, queue) in drained {
        for tx in queue {
            let _ = tx.send(Err(Error::Transport("connection closed".to_string())));
        }
    }
}

fn handle_reply(
    pending: &Mutex<PendingMap>,
    unsolicited: &mpsc::UnboundedSender<Response>,
    origin: Option<Origin>,
    body: Value,
) {
    let response = match Response::parse(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "discarding malformed reply");
            if let Some(origin) = origin {
                let _ = resolve(pending, &origin, Err(e));
            }
            return;
        }
    };

    if let Some(ref origin) = origin
        && origin.endpoint != response.id
    {
        warn!(
            requested = %origin.endpoint,
            received = %response.id,
            "reply id does not match request, discarding"
        );
        let mismatch = Error::Protocol(format!(
            "requested {} but reply carries {}",
            origin.endpoint, response.id
        ));
        let _ = resolve(pending, origin, Err(mismatch));
        return;
    }

    let key = origin.unwrap_or_else(|| infer_origin(pending, &response));

    match resolve(pending, &key, Ok(response)) {
        Ok(()) => {}
        Err(Ok(response)) if key.method == Method::Get => {
            trace!(endpoint = %response.id, "unsolicited reply");
            let _ = unsolicited.send(response);
        }
        Err(_) => debug!(endpoint = %key.endpoint, "dropping acknowledgement nobody awaits"),
    }
}

/// Hands `reply` to the oldest live caller waiting on `key`. Gives the reply
/// back when nobody is left.
fn resolve(pending: &Mutex<PendingMap>, key: &Origin, reply: Reply) -> std::result::Result<(), Reply> {
    let mut map = pending.lock();
    let Some(queue) = map.get_mut(key) else {
        return Err(reply);
    };

    let mut reply = reply;
    while let Some(tx) = queue.pop_front() {
        match tx.send(reply) {
            Ok(()) => {
                if queue.is_empty() {
                    map.remove(key);
                }
                return Ok(());
            }
            Err(back) => reply = back,
        }
    }
    map.remove(key);
    Err(reply)
}

/// Works out which call an origin-less reply answers. Whichever method has a
/// live caller on the reply's id wins; when both do, a status marks the PUT.
fn infer_origin(pending: &Mutex<PendingMap>, response: &Response) -> Origin {
    let waiting = |method: Method| {
        let key = Origin {
            method,
            endpoint: response.id.clone(),
        };
        pending
            .lock()
            .get(&key)
            .is_some_and(|queue| queue.iter().any(|tx| !tx.is_closed()))
    };

    let method = match (waiting(Method::Get), waiting(Method::Put)) {
        (true, false) => Method::Get,
        (false, true) => Method::Put,
        (true, true) if response.status.is_some() => Method::Put,
        (true, true) => Method::Get,
        (false, false) if response.looks_like_ack() => Method::Put,
        (false, false) => Method::Get,
    };
    Origin {
        method,
        endpoint: response.id.clone(),
    }
}

fn prune_closed(pending: &Mutex<PendingMap>, key: &Origin) {
    let mut map = pending.lock();
    if let Some(queue) = map.get_mut(key) {
        queue.retain(|tx| !tx.is_closed());
        if queue.is_empty() {
            map.remove(key);
        }
    }
}

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ct200_bridge::{Credentials, Error, Inbound, InboundSender, Method, Origin, Request, Transport};
use serde_json::{Value, json};

/// In-memory device session. Scripted replies are pushed without an origin,
/// the way a multiplexed device connection delivers them.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    sent: Mutex<Vec<Request>>,
    inbound: Mutex<Option<InboundSender>>,
    scripted: Mutex<HashMap<(Method, String), Value>>,
    refuse_connect: Mutex<Option<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_connect(&self, reason: &str) {
        *self.inner.refuse_connect.lock().unwrap() = Some(reason.to_string());
    }

    /// Answer every future `method endpoint` with `body`.
    pub fn script(&self, method: Method, endpoint: &str, body: Value) {
        self.inner
            .scripted
            .lock()
            .unwrap()
            .insert((method, endpoint.to_string()), body);
    }

    pub fn script_value(&self, endpoint: &str, value: Value) {
        self.script(Method::Get, endpoint, json!({"id": endpoint, "value": value}));
    }

    pub fn unscript(&self, method: Method, endpoint: &str) {
        self.inner
            .scripted
            .lock()
            .unwrap()
            .remove(&(method, endpoint.to_string()));
    }

    pub fn push(&self, body: Value) {
        self.deliver(Inbound::Reply { origin: None, body });
    }

    pub fn push_for(&self, method: Method, endpoint: &str, body: Value) {
        let origin = Origin { method, endpoint: endpoint.to_string() };
        self.deliver(Inbound::Reply { origin: Some(origin), body });
    }

    pub fn fail(&self, method: Method, endpoint: &str, error: Error) {
        let origin = Origin { method, endpoint: endpoint.to_string() };
        self.deliver(Inbound::Failed { origin, error });
    }

    /// Drops the inbound side, as a lost connection would.
    pub fn close(&self) {
        self.inner.inbound.lock().unwrap().take();
    }

    pub fn sent(&self) -> Vec<Request> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self, method: Method, endpoint: &str) -> usize {
        self.sent()
            .iter()
            .filter(|r| r.method == method && r.endpoint == endpoint)
            .count()
    }

    fn deliver(&self, frame: Inbound) {
        let guard = self.inner.inbound.lock().unwrap();
        let tx = guard.as_ref().expect("transport not connected");
        tx.send(frame).expect("manager gone");
    }
}

impl Transport for MockTransport {
    fn connect(
        &self,
        _credentials: &Credentials,
        inbound: InboundSender,
    ) -> impl Future<Output = ct200_bridge::Result<()>> + Send {
        let inner = self.inner.clone();
        async move {
            if let Some(reason) = inner.refuse_connect.lock().unwrap().clone() {
                return Err(Error::Transport(reason));
            }
            *inner.inbound.lock().unwrap() = Some(inbound);
            Ok(())
        }
    }

    fn send(&self, request: Request) -> ct200_bridge::Result<()> {
        let key = (request.method, request.endpoint.clone());
        self.inner.sent.lock().unwrap().push(request);

        let reply = self.inner.scripted.lock().unwrap().get(&key).cloned();
        if let Some(body) = reply {
            let guard = self.inner.inbound.lock().unwrap();
            match guard.as_ref() {
                Some(tx) => {
                    let _ = tx.send(Inbound::Reply { origin: None, body });
                }
                None => return Err(Error::NotConnected),
            }
        }
        Ok(())
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        serial: "101424242".to_string(),
        access_key: "abcd-efgh-ijkl".to_string(),
        password: "secret".to_string(),
    }
}

/// Polls `check` until it holds, failing the test after about two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

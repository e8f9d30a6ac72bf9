use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::protocol::{Method, Request};
use crate::{Error, Result};

/// Error text the device library uses when it throttles us.
pub const RATE_LIMIT_MARKER: &str = "HTTP_TOO_MANY_REQUESTS";

#[derive(Clone)]
pub struct Credentials {
    pub serial: String,
    pub access_key: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

/// The request an inbound frame answers, when the transport knows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub method: Method,
    pub endpoint: String,
}

impl From<&Request> for Origin {
    fn from(req: &Request) -> Self {
        Self {
            method: req.method,
            endpoint: req.endpoint.clone(),
        }
    }
}

#[derive(Debug)]
pub enum Inbound {
    /// A raw reply body. `origin` is `None` for pushed notifications and for
    /// transports that cannot tell which request a frame answers.
    Reply { origin: Option<Origin>, body: Value },
    /// The request could not be delivered or answered.
    Failed { origin: Origin, error: Error },
}

pub type InboundSender = mpsc::UnboundedSender<Inbound>;

/// Session with the device. `send` never waits for the reply: replies and
/// failures come back through the sender handed to `connect`.
pub trait Transport: Send + Sync + 'static {
    fn connect(
        &self,
        credentials: &Credentials,
        inbound: InboundSender,
    ) -> impl Future<Output = Result<()>> + Send;

    fn send(&self, request: Request) -> Result<()>;
}

/// Classifies an error message coming out of a device library.
pub fn classify_failure(message: &str) -> Error {
    if message.contains(RATE_LIMIT_MARKER) {
        Error::RateLimited
    } else {
        Error::Transport(message.to_string())
    }
}

/// Talks to an HTTP gateway that holds the authenticated device session.
///
/// `POST /connect` opens the session, `GET /api{endpoint}` reads and
/// `PUT /api{endpoint}` writes. Status 429 is the device throttling us.
pub struct GatewayTransport {
    http: reqwest::Client,
    base_url: String,
    inbound: Arc<Mutex<Option<InboundSender>>>,
}

impl GatewayTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            inbound: Arc::new(Mutex::new(None)),
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api{}", self.base_url, endpoint)
    }
}

impl Transport for GatewayTransport {
    fn connect(
        &self,
        credentials: &Credentials,
        inbound: InboundSender,
    ) -> impl Future<Output = Result<()>> + Send {
        let url = format!("{}/connect", self.base_url);
        let body = json!({
            "serialNumber": credentials.serial,
            "accessKey": credentials.access_key,
            "password": credentials.password,
        });
        let http = self.http.clone();
        let slot = self.inbound.clone();

        async move {
            debug!(url = %url, "connecting to gateway");
            let resp = http.post(&url).json(&body).send().await?;
            if resp.status().as_u16() == 429 {
                return Err(Error::RateLimited);
            }
            resp.error_for_status()?;
            *slot.lock() = Some(inbound);
            Ok(())
        }
    }

    fn send(&self, request: Request) -> Result<()> {
        let inbound = self.inbound.lock().clone().ok_or(Error::NotConnected)?;
        let url = self.api_url(&request.endpoint);
        let builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Put => self.http.put(&url).json(&request.body.clone().unwrap_or(Value::Null)),
        };
        let origin = Origin::from(&request);

        tokio::spawn(async move {
            trace!(method = ?origin.method, endpoint = %origin.endpoint, "gateway request");
            let frame = match exchange(builder).await {
                Ok(body) => Inbound::Reply { origin: Some(origin), body },
                Err(error) => Inbound::Failed { origin, error },
            };
            // The manager is gone when this fails; nobody is left to answer.
            let _ = inbound.send(frame);
        });
        Ok(())
    }
}

async fn exchange(builder: reqwest::RequestBuilder) -> Result<Value> {
    let resp = builder.send().await?;
    let status = resp.status();
    if status.as_u16() == 429 {
        return Err(Error::RateLimited);
    }
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(match classify_failure(&text) {
            Error::RateLimited => Error::RateLimited,
            _ => Error::Transport(format!("gateway returned {status}: {text}")),
        });
    }
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| Error::Protocol(format!("unparseable reply: {e}")))
}

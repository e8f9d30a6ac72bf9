use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Connection-level failure reported by the transport.
    Transport(String),
    Http(reqwest::Error),
    /// The per-request deadline expired before a reply arrived.
    Timeout,
    /// Malformed reply, or a reply carrying an id other than the one requested.
    Protocol(String),
    RateLimited,
    WriteRejected { endpoint: String, status: String },
    NotConnected,
    InvalidZone(u8),
    ReadOnly(&'static str),
    Config(String),
    Io(std::io::Error),
}

impl Error {
    /// Transport-class errors: the request never produced a usable reply.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Http(_) | Error::Timeout)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(msg) => write!(f, "transport error: {msg}"),
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Timeout => write!(f, "request timed out"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::RateLimited => write!(f, "rate limited by device"),
            Error::WriteRejected { endpoint, status } => {
                write!(f, "write to {endpoint} rejected (status: {status})")
            }
            Error::NotConnected => write!(f, "not connected"),
            Error::InvalidZone(id) => write!(f, "invalid zone: {id}"),
            Error::ReadOnly(what) => write!(f, "{what} cannot be changed remotely"),
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use std::fmt;

#[derive(Debug)]
pub enum Error {
    DiscoveryTimeout,
    DiscoverySocket(std::io::Error),
    ConnectFailed { attempts: u32 },
    CloseTimeout,
    StatusUnavailable,
    CommandFailed { path: String, value: String, attempts: u32 },
    Transport(std::io::Error),
    Timeout,
    Protocol(String),
    Json(serde_json::Error),
    Io(std::io::Error),
    InvalidPath(String),
    NotConnected,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DiscoveryTimeout => write!(f, "no discovery broadcast received from unit"),
            Error::DiscoverySocket(e) => write!(f, "discovery socket error: {e}"),
            Error::ConnectFailed { attempts } => {
                write!(f, "unable to connect after {attempts} attempts")
            }
            Error::CloseTimeout => write!(f, "connection was not closed within time limit"),
            Error::StatusUnavailable => write!(f, "no fresh status received"),
            Error::CommandFailed { path, value, attempts } => write!(
                f,
                "command failed: expected {path}={value} not observed after {attempts} attempts"
            ),
            Error::Transport(e) => write!(f, "transport error: {e}"),
            Error::Timeout => write!(f, "timed out waiting for unit"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::InvalidPath(path) => write!(f, "invalid path: {path}"),
            Error::NotConnected => write!(f, "client worker is not running"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DiscoverySocket(e) | Error::Transport(e) | Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

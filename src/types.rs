use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use serde_json::Value;

use crate::status::Status;

/// Default TCP port of the unit's command session.
pub const DEFAULT_PORT: u16 = 27847;

/// Network location of the unit's TCP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    pub host: IpAddr,
    pub port: u16,
}

impl Address {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self { host, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Open,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        };
        f.write_str(s)
    }
}

/// Operating sub-system currently active on the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Heat,
    Cool,
    Evaporative,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Heat, Mode::Cool, Mode::Evaporative];

    /// Top-level key of the mode object in a status frame.
    pub fn as_key(&self) -> &'static str {
        match self {
            Mode::Heat => "HGOM",
            Mode::Cool => "CGOM",
            Mode::Evaporative => "ECOM",
        }
    }

    pub fn from_key(s: &str) -> Option<Self> {
        match s {
            "HGOM" => Some(Mode::Heat),
            "CGOM" => Some(Mode::Cool),
            "ECOM" => Some(Mode::Evaporative),
            _ => None,
        }
    }

    /// Value of `SYST.OSS.MD` selecting this mode.
    pub fn as_code(&self) -> &'static str {
        match self {
            Mode::Heat => "H",
            Mode::Cool => "C",
            Mode::Evaporative => "E",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "H" => Some(Mode::Heat),
            "C" => Some(Mode::Cool),
            "E" => Some(Mode::Evaporative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Zone {
    A,
    B,
    C,
    D,
}

impl Zone {
    pub const ALL: [Zone; 4] = [Zone::A, Zone::B, Zone::C, Zone::D];

    pub fn letter(&self) -> char {
        match self {
            Zone::A => 'A',
            Zone::B => 'B',
            Zone::C => 'C',
            Zone::D => 'D',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Zone::A),
            'B' => Some(Zone::B),
            'C' => Some(Zone::C),
            'D' => Some(Zone::D),
            _ => None,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

pub const COMFORT_MIN: i32 = 19;
pub const COMFORT_MAX: i32 = 34;
pub const EVAP_CELSIUS_MIN: i32 = 8;
pub const EVAP_CELSIUS_MAX: i32 = 30;

/// Evaporative comfort level (19-34) to the equivalent Celsius target (8-30).
pub fn comfort_to_celsius(level: i32) -> i32 {
    let span_c = (EVAP_CELSIUS_MAX - EVAP_CELSIUS_MIN) as f64;
    let span_l = (COMFORT_MAX - COMFORT_MIN) as f64;
    ((level - COMFORT_MIN) as f64 / span_l * span_c + EVAP_CELSIUS_MIN as f64).round() as i32
}

/// Celsius target (8-30) to the evaporative comfort level (19-34).
pub fn celsius_to_comfort(celsius: i32) -> i32 {
    let span_c = (EVAP_CELSIUS_MAX - EVAP_CELSIUS_MIN) as f64;
    let span_l = (COMFORT_MAX - COMFORT_MIN) as f64;
    ((celsius - EVAP_CELSIUS_MIN) as f64 / span_c * span_l + COMFORT_MIN as f64).round() as i32
}

/// A single changed leaf between two status snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub path: String,
    pub old: Value,
    pub new: Value,
}

/// Notifications published by the client.
#[derive(Debug, Clone)]
pub enum Event {
    StatusChanged { status: Arc<Status>, changes: Vec<Change> },
    ModeChanged { mode: Mode },
    ConnectionStateChanged { state: ConnectionState },
}

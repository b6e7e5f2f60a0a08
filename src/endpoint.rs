//! Front gateway address parsing
//!
//! Gateways are addressed with a scheme-qualified endpoint string such as
//! `tcp://180.168.146.187:10202`. Only the `tcp` scheme is supported.

use std::fmt;
use std::str::FromStr;

/// Parsed front gateway endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontAddr {
    pub host: String,
    pub port: u16,
}

impl FrontAddr {
    /// host:port form usable with `TcpStream::connect`
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for FrontAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

impl FromStr for FrontAddr {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("tcp://")
            .ok_or_else(|| EndpointError::BadScheme(s.to_string()))?;

        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| EndpointError::MissingPort(s.to_string()))?;

        if host.is_empty() {
            return Err(EndpointError::MissingHost(s.to_string()));
        }

        let port: u16 =
            port.parse().map_err(|_| EndpointError::BadPort(port.to_string()))?;

        Ok(FrontAddr { host: host.to_string(), port })
    }
}

/// Endpoint parse errors
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointError {
    BadScheme(String),
    MissingHost(String),
    MissingPort(String),
    BadPort(String),
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointError::BadScheme(s) => write!(f, "expected tcp:// scheme in '{}'", s),
            EndpointError::MissingHost(s) => write!(f, "missing host in '{}'", s),
            EndpointError::MissingPort(s) => write!(f, "missing port in '{}'", s),
            EndpointError::BadPort(p) => write!(f, "invalid port '{}'", p),
        }
    }
}

impl std::error::Error for EndpointError {}

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use super::types::SocksError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Ipv4(Ipv4Addr),
    Domain(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub host: Host,
    pub port: u16,
}

impl Address {
    pub fn new(host: Host, port: u16) -> Self {
        Self { host, port }
    }

    pub fn parse(target: &str) -> Result<Self, SocksError> {
        let (host, port) = target
            .rsplit_once(':')
            .ok_or_else(|| SocksError::InvalidTargetAddr(target.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| SocksError::InvalidTargetAddr(target.to_string()))?;
        let host = match host.parse::<Ipv4Addr>() {
            Ok(ip) => Host::Ipv4(ip),
            Err(_) => Host::Domain(host.to_string()),
        };
        Ok(Self { host, port })
    }
}

impl From<SocketAddrV4> for Address {
    fn from(addr: SocketAddrV4) -> Self {
        Self {
            host: Host::Ipv4(*addr.ip()),
            port: addr.port(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ipv4(ip) => write!(f, "{ip}:{}", self.port),
            Host::Domain(domain) => write!(f, "{domain}:{}", self.port),
        }
    }
}

use std::fmt;

use thiserror::Error;

pub const SOCKS4_VERSION: u8 = 0x04;

pub const MAX_FIELD_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Bind,
    Other(u8),
}

impl Command {
    pub fn from_byte(value: u8) -> Self {
        match value {
            0x01 => Command::Connect,
            0x02 => Command::Bind,
            other => Command::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Command::Connect => 0x01,
            Command::Bind => 0x02,
            Command::Other(value) => value,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => f.write_str("connect"),
            Command::Bind => f.write_str("bind"),
            Command::Other(value) => write!(f, "unknown command: {value}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    Granted,
    Rejected,
    NoIdentd,
    InvalidUser,
    Other(u8),
}

impl ReplyCode {
    pub fn from_byte(value: u8) -> Self {
        match value {
            0x5a => ReplyCode::Granted,
            0x5b => ReplyCode::Rejected,
            0x5c => ReplyCode::NoIdentd,
            0x5d => ReplyCode::InvalidUser,
            other => ReplyCode::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            ReplyCode::Granted => 0x5a,
            ReplyCode::Rejected => 0x5b,
            ReplyCode::NoIdentd => 0x5c,
            ReplyCode::InvalidUser => 0x5d,
            ReplyCode::Other(value) => value,
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyCode::Granted => f.write_str("granted"),
            ReplyCode::Rejected => f.write_str("rejected"),
            ReplyCode::NoIdentd => f.write_str("no identd"),
            ReplyCode::InvalidUser => f.write_str("invalid user"),
            ReplyCode::Other(value) => write!(f, "unknown code: {value}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SocksError {
    #[error("unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("invalid reply: {0}")]
    InvalidReply(&'static str),
    #[error("unsupported protocol '{0}'")]
    UnsupportedProtocol(String),
    #[error("unsupported network '{0}'")]
    UnsupportedNetwork(String),
    #[error("invalid proxy url '{0}'")]
    InvalidProxyUrl(String),
    #[error("invalid target address '{0}'")]
    InvalidTargetAddr(String),
    #[error("no ipv4 addresses found for '{0}'")]
    NoIpv4Addresses(String),
    #[error("connection request failed: {0}")]
    RequestFailed(ReplyCode),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

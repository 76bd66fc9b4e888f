use std::{fmt, net::SocketAddr, str::FromStr};

use anyhow::{anyhow, Context};

use crate::AppResult;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// What happens to a room when its host disconnects or moves to another room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostLeavePolicy {
    /// Dissolve the room and tell everyone still in it.
    #[default]
    Close,
    /// Hand the room to the earliest remaining joiner.
    Promote,
}

impl FromStr for HostLeavePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "close" => Ok(Self::Close),
            "promote" => Ok(Self::Promote),
            other => Err(anyhow!("expected `close` or `promote`, got `{other}`")),
        }
    }
}

impl fmt::Display for HostLeavePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Close => f.write_str("close"),
            Self::Promote => f.write_str("promote"),
        }
    }
}

/// Knobs the relay engine itself cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub outbound_capacity: usize,
    pub host_leave: HostLeavePolicy,
    pub reject_invalid: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            host_leave: HostLeavePolicy::default(),
            reject_invalid: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub addr: SocketAddr,
    pub relay: RelayConfig,
}

impl Config {
    /// Reads `RELAY_*` variables, after loading `.env` if one exists.
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let addr = match parse_var(&lookup, "RELAY_ADDR")? {
            Some(addr) => addr,
            None => DEFAULT_ADDR.parse::<SocketAddr>()?,
        };

        let outbound_capacity =
            parse_var(&lookup, "RELAY_OUTBOUND_CAPACITY")?.unwrap_or(DEFAULT_OUTBOUND_CAPACITY);
        if outbound_capacity == 0 {
            return Err(anyhow!("RELAY_OUTBOUND_CAPACITY must be at least 1").into());
        }

        let host_leave = parse_var(&lookup, "RELAY_HOST_LEAVE")?.unwrap_or_default();
        let reject_invalid = parse_var(&lookup, "RELAY_REJECT_INVALID")?.unwrap_or(false);

        Ok(Self {
            addr,
            relay: RelayConfig {
                outbound_capacity,
                host_leave,
                reject_invalid,
            },
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: Into<anyhow::Error>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let value = raw
        .parse::<T>()
        .map_err(|err| -> anyhow::Error { err.into() })
        .with_context(|| format!("invalid {key}: `{raw}`"))?;
    Ok(Some(value))
}

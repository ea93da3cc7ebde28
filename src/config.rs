//! Command line configuration
//!
//! The only setting is where to listen. It can be given as a bare port
//! (`9000`) or a full address (`127.0.0.1:9000`).

use crate::error::AppError;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Per-client outbound queue size
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Channel buffer size for hub commands
pub const DEFAULT_HUB_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Listen address, `host:port`
    pub addr: String,
    pub outbound_capacity: usize,
    pub hub_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            hub_capacity: DEFAULT_HUB_CAPACITY,
        }
    }
}

impl Config {
    /// Build a config from arguments, excluding the program name
    pub fn from_args<I>(mut args: I) -> Result<Self, AppError>
    where
        I: Iterator<Item = String>,
    {
        let mut config = Self::default();

        if let Some(arg) = args.next() {
            config.addr = parse_addr(&arg)?;
        }
        if let Some(extra) = args.next() {
            return Err(AppError::Config(format!("unexpected argument '{}'", extra)));
        }

        Ok(config)
    }
}

fn parse_addr(arg: &str) -> Result<String, AppError> {
    if arg.is_empty() {
        return Err(AppError::Config("empty listen address".to_string()));
    }

    if arg.chars().all(|c| c.is_ascii_digit()) {
        let port: u16 = arg
            .parse()
            .map_err(|_| AppError::Config(format!("invalid port '{}'", arg)))?;
        return Ok(format!("0.0.0.0:{}", port));
    }

    Ok(arg.to_string())
}

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::model::{OperatingWindow, TimeOfDay};

/// Server settings, read once from `KINDERSLOT_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub window: OperatingWindow,
    /// `None` leaves confirmed tours for an admin to complete.
    pub tour_sweep: Option<Duration>,
}

#[derive(Debug)]
pub struct ConfigError {
    var: &'static str,
    detail: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.var, self.detail)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let window = OperatingWindow {
            open: time_or(&get, "KINDERSLOT_OPEN", OperatingWindow::default().open)?,
            close: time_or(&get, "KINDERSLOT_CLOSE", OperatingWindow::default().close)?,
        };
        if window.open > window.close {
            return Err(ConfigError {
                var: "KINDERSLOT_OPEN",
                detail: format!("opens at {} after closing at {}", window.open, window.close),
            });
        }

        let tour_sweep = match get("KINDERSLOT_TOUR_SWEEP_SECS") {
            Some(raw) => {
                let secs: u64 = parse("KINDERSLOT_TOUR_SWEEP_SECS", &raw)?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            port: parse_or(&get, "KINDERSLOT_PORT", 5433)?,
            bind: get("KINDERSLOT_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir: PathBuf::from(get("KINDERSLOT_DATA_DIR").unwrap_or_else(|| "./data".into())),
            password: get("KINDERSLOT_PASSWORD").unwrap_or_else(|| "kinderslot".into()),
            max_connections: parse_or(&get, "KINDERSLOT_MAX_CONNECTIONS", 256)?,
            compact_threshold: parse_or(&get, "KINDERSLOT_COMPACT_THRESHOLD", 1000)?,
            metrics_port: match get("KINDERSLOT_METRICS_PORT") {
                Some(raw) => Some(parse("KINDERSLOT_METRICS_PORT", &raw)?),
                None => None,
            },
            tls_cert: get("KINDERSLOT_TLS_CERT"),
            tls_key: get("KINDERSLOT_TLS_KEY"),
            window,
            tour_sweep,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError {
        var,
        detail: format!("{raw:?}: {e}"),
    })
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match get(var) {
        Some(raw) => parse(var, &raw),
        None => Ok(default),
    }
}

fn time_or(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: TimeOfDay,
) -> Result<TimeOfDay, ConfigError> {
    match get(var) {
        Some(raw) => TimeOfDay::parse_24h(&raw).map_err(|e| ConfigError {
            var,
            detail: e.to_string(),
        }),
        None => Ok(default),
    }
}

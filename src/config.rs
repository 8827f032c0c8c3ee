use std::path::PathBuf;

use crate::engine::grid::{BusinessHours, DEFAULT_CLOSE_HOUR, DEFAULT_OPEN_HOUR, DEFAULT_SLOT_MINUTES};
use crate::engine::{BoundaryCheck, DurationTable};

pub const ENV_OPEN_HOUR: &str = "CHAIRTIME_OPEN_HOUR";
pub const ENV_CLOSE_HOUR: &str = "CHAIRTIME_CLOSE_HOUR";
pub const ENV_SLOT_MINUTES: &str = "CHAIRTIME_SLOT_MINUTES";
pub const ENV_DURATION_TABLE: &str = "CHAIRTIME_DURATION_TABLE";
pub const ENV_BOUNDARY_CHECK: &str = "CHAIRTIME_BOUNDARY_CHECK";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidHours { open_hour: u32, close_hour: u32 },
    InvalidGranularity(u32),
    DurationTable(String),
    InvalidVar { name: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidHours {
                open_hour,
                close_hour,
            } => write!(
                f,
                "business hours must satisfy open < close <= 24 (got {open_hour}..{close_hour})"
            ),
            ConfigError::InvalidGranularity(m) => {
                write!(f, "slot granularity must divide an hour (got {m} minutes)")
            }
            ConfigError::DurationTable(e) => write!(f, "duration table: {e}"),
            ConfigError::InvalidVar { name, value } => write!(f, "invalid {name}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Everything a deployment can tune about the engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub hours: BusinessHours,
    pub boundary: BoundaryCheck,
    pub durations: DurationTable,
}

impl EngineConfig {
    /// Read `CHAIRTIME_*` from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Unset variables take their defaults; set but malformed ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let open = parse_u32(&lookup, ENV_OPEN_HOUR)?.unwrap_or(DEFAULT_OPEN_HOUR);
        let close = parse_u32(&lookup, ENV_CLOSE_HOUR)?.unwrap_or(DEFAULT_CLOSE_HOUR);
        let slot = parse_u32(&lookup, ENV_SLOT_MINUTES)?.unwrap_or(DEFAULT_SLOT_MINUTES);
        let hours = BusinessHours::new(open, close, slot)?;

        let boundary = match lookup(ENV_BOUNDARY_CHECK) {
            None => BoundaryCheck::default(),
            Some(raw) => BoundaryCheck::parse(&raw).ok_or(ConfigError::InvalidVar {
                name: ENV_BOUNDARY_CHECK,
                value: raw,
            })?,
        };

        let durations = match lookup(ENV_DURATION_TABLE) {
            None => DurationTable::default(),
            Some(path) => DurationTable::from_json_file(&PathBuf::from(path))?,
        };

        Ok(Self {
            hours,
            boundary,
            durations,
        })
    }
}

fn parse_u32(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<u32>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { name, value: raw }),
    }
}

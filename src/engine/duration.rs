use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::model::Appointment;

pub const DEFAULT_FALLBACK_MINUTES: u32 = 60;

/// One keyword → minutes mapping. Matching is a case-insensitive substring test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationRule {
    pub keyword: String,
    pub minutes: u32,
}

/// Ordered fallback table used when an appointment carries no explicit duration.
/// First matching keyword wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationTable {
    rules: Vec<DurationRule>,
    #[serde(default = "default_fallback")]
    default_minutes: u32,
}

fn default_fallback() -> u32 {
    DEFAULT_FALLBACK_MINUTES
}

impl Default for DurationTable {
    fn default() -> Self {
        Self::builder()
            .rule("color", 90)
            .rule("cut", 45)
            .rule("trim", 45)
            .rule("massage", 60)
            .rule("facial", 75)
            .rule("manicure", 45)
            .rule("pedicure", 60)
            .rule("highlights", 120)
            .build()
            .unwrap_or_else(|_| Self::empty())
    }
}

impl DurationTable {
    /// A table with no keywords; everything without an explicit duration gets the default.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            default_minutes: DEFAULT_FALLBACK_MINUTES,
        }
    }

    pub fn builder() -> DurationTableBuilder {
        DurationTableBuilder {
            rules: Vec::new(),
            default_minutes: DEFAULT_FALLBACK_MINUTES,
        }
    }

    /// Parse a table from JSON, e.g.
    /// `{"rules":[{"keyword":"balayage","minutes":150}],"default_minutes":60}`.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let raw: DurationTable =
            serde_json::from_str(json).map_err(|e| ConfigError::DurationTable(e.to_string()))?;
        raw.normalized()
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::DurationTable(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn rules(&self) -> &[DurationRule] {
        &self.rules
    }

    pub fn default_minutes(&self) -> u32 {
        self.default_minutes
    }

    /// Minutes for a service name, falling back to the table default.
    pub fn lookup(&self, service_name: &str) -> u32 {
        let name = service_name.to_lowercase();
        self.rules
            .iter()
            .find(|r| name.contains(&r.keyword))
            .map_or(self.default_minutes, |r| r.minutes)
    }

    fn normalized(self) -> Result<Self, ConfigError> {
        if self.default_minutes == 0 {
            return Err(ConfigError::DurationTable("default_minutes must be positive".into()));
        }
        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in self.rules {
            let keyword = rule.keyword.trim().to_lowercase();
            if keyword.is_empty() {
                return Err(ConfigError::DurationTable("empty keyword".into()));
            }
            if rule.minutes == 0 {
                return Err(ConfigError::DurationTable(format!(
                    "keyword {keyword:?} maps to zero minutes"
                )));
            }
            rules.push(DurationRule {
                keyword,
                minutes: rule.minutes,
            });
        }
        Ok(Self {
            rules,
            default_minutes: self.default_minutes,
        })
    }
}

pub struct DurationTableBuilder {
    rules: Vec<DurationRule>,
    default_minutes: u32,
}

impl DurationTableBuilder {
    pub fn rule(mut self, keyword: impl Into<String>, minutes: u32) -> Self {
        self.rules.push(DurationRule {
            keyword: keyword.into(),
            minutes,
        });
        self
    }

    pub fn default_minutes(mut self, minutes: u32) -> Self {
        self.default_minutes = minutes;
        self
    }

    pub fn build(self) -> Result<DurationTable, ConfigError> {
        DurationTable {
            rules: self.rules,
            default_minutes: self.default_minutes,
        }
        .normalized()
    }
}

/// Derives how long an appointment occupies its chair.
#[derive(Debug, Clone, Default)]
pub struct DurationResolver {
    table: DurationTable,
}

impl DurationResolver {
    pub fn new(table: DurationTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &DurationTable {
        &self.table
    }

    /// Explicit durations win; otherwise the service name is classified by the table.
    pub fn resolve(&self, appointment: &Appointment) -> u32 {
        match appointment.duration {
            Some(minutes) if minutes > 0 => minutes,
            _ => self.table.lookup(&appointment.service_name),
        }
    }
}

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::logger::LogError;

/// Validated `EnvFilter` directive string.
///
/// Kept as text so it can live in config and be printed back; turned into an
/// [`EnvFilter`] only when the logger is installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogFilter(String);

impl LogFilter {
    pub fn new(directives: impl Into<String>) -> Result<Self, LogError> {
        Self::try_from(directives.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append one more directive, e.g. `gargantua_core::queue=warn`.
    pub fn with_directive(self, directive: &str) -> Result<Self, LogError> {
        if self.0.is_empty() {
            return Self::new(directive);
        }
        Self::new(format!("{},{directive}", self.0))
    }

    pub fn to_env_filter(&self) -> EnvFilter {
        // Validated on construction; fall back to `info` rather than panic.
        EnvFilter::try_new(&self.0).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

impl Default for LogFilter {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl FromStr for LogFilter {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LogFilter {
    type Error = LogError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match EnvFilter::try_new(&s) {
            Ok(_) => Ok(Self(s)),
            Err(e) => Err(LogError::InvalidFilter {
                filter: s,
                reason: e.to_string(),
            }),
        }
    }
}

impl From<LogFilter> for String {
    fn from(f: LogFilter) -> Self {
        f.0
    }
}

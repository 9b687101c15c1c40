use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::logger::object::{LogFilter, LogFormat};

/// Logger settings.
///
/// Missing fields take their defaults, so a partial JSON document or an empty
/// environment still yields a usable logger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `info,gargantua_core::queue=warn`.
    pub filter: LogFilter,
    /// Print the module path of each record.
    pub with_targets: bool,
    /// Attach the enclosing reconcile span (controller, key) to JSON records.
    pub with_spans: bool,
    pub use_color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: LogFilter::default(),
            with_targets: true,
            with_spans: true,
            use_color: true,
        }
    }
}

impl LogConfig {
    /// Color only when asked for and stdout is a terminal.
    pub fn should_use_color(&self) -> bool {
        self.use_color && std::io::stdout().is_terminal()
    }
}

use serde::{Deserialize, Serialize};

use super::JitterStrategy;

/// Delay policy between restarts of a supervised unit.
///
/// `first_ms` grows by `factor` per consecutive failure up to `max_ms`.
/// `delay_ms`, when set, is the pause after a successful run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffStrategy {
    #[serde(default)]
    pub jitter: JitterStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    pub first_ms: u64,
    pub max_ms: u64,
    pub factor: f64,
}

impl BackoffStrategy {
    /// Exponential backoff without a success delay.
    pub fn exponential(first_ms: u64, max_ms: u64, factor: f64) -> Self {
        Self {
            jitter: JitterStrategy::Equal,
            delay_ms: None,
            first_ms,
            max_ms,
            factor,
        }
    }

    /// Constant delay between attempts.
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            jitter: JitterStrategy::None,
            delay_ms: Some(delay_ms),
            first_ms: delay_ms,
            max_ms: delay_ms,
            factor: 1.0,
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::exponential(1_000, 30_000, 2.0)
    }
}

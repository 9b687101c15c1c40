//! Cost arithmetic over [`CostResource`] entries.
//!
//! Durations are always rounded up to whole billing units:
//! `cost = ceil(duration / unit) * base_price`.
use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::kind::CostResource;

/// Billing granularity of a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    #[default]
    Hours,
}

impl TimeUnit {
    pub fn seconds(self) -> u64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3_600,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => Ok(TimeUnit::Seconds),
            "m" | "min" | "minute" | "minutes" => Ok(TimeUnit::Minutes),
            "h" | "hour" | "hours" => Ok(TimeUnit::Hours),
            other => Err(ModelError::UnknownTimeUnit(other.to_string())),
        }
    }
}

/// Parse a base price label. Fractional prices are allowed; negative and
/// non-finite values are rejected.
pub fn parse_base_price(s: &str) -> ModelResult<f64> {
    let price: f64 = s
        .trim()
        .parse()
        .map_err(|_| ModelError::InvalidPrice(s.to_string()))?;
    if !price.is_finite() || price < 0.0 {
        return Err(ModelError::InvalidPrice(s.to_string()));
    }
    Ok(price)
}

/// Cost of `duration_secs` billed in `unit` at `base_price` per unit.
pub fn duration_cost(base_price: f64, unit: TimeUnit, duration_secs: i64) -> f64 {
    let secs = u64::try_from(duration_secs).unwrap_or(0);
    secs.div_ceil(unit.seconds()) as f64 * base_price
}

/// Which resources a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CostView {
    /// Deleted resources only, billed until deletion.
    Historic,
    /// Live resources only, billed until now.
    Present,
    /// Everything; live resources billed until now.
    All,
}

/// Per-kind line of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSource {
    pub kind: String,
    pub count: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostReport {
    pub cost_group: String,
    pub view: CostView,
    /// One entry per kind, sorted by kind.
    pub sources: Vec<CostSource>,
    pub total: f64,
}

/// Aggregate `resources` for `view`.
pub fn report(group: &str, resources: &[CostResource], view: CostView, now: i64) -> CostReport {
    let mut per_kind: BTreeMap<&str, (u64, f64)> = BTreeMap::new();

    for r in resources {
        let end = match view {
            CostView::Historic if r.is_live() => continue,
            CostView::Present if !r.is_live() => continue,
            _ if r.is_live() => now,
            _ => r.deletion_unix_timestamp,
        };
        let cost = duration_cost(r.base_price, r.time_unit, end - r.creation_unix_timestamp);
        let entry = per_kind.entry(r.kind.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += cost;
    }

    let sources: Vec<CostSource> = per_kind
        .into_iter()
        .map(|(kind, (count, cost))| CostSource {
            kind: kind.to_string(),
            count,
            cost,
        })
        .collect();
    let total = sources.iter().map(|s| s.cost).sum();

    CostReport {
        cost_group: group.to_string(),
        view,
        sources,
        total,
    }
}

use serde::{Deserialize, Serialize};

/// Randomisation applied to restart delays.
///
/// Spreads restarts of units that failed together, e.g. every informer after
/// a store outage.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JitterStrategy {
    None,
    /// Uniform in `[0, base]`.
    Full,
    /// Around `base / 2`.
    #[default]
    Equal,
    Decorrelated,
}

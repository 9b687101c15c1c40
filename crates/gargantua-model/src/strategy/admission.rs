use serde::{Deserialize, Serialize};

/// What the supervisor does when a unit is submitted into a slot that is already running.
///
/// Every controller and informer occupies its own slot named after it.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdmissionStrategy {
    /// Keep the running unit and ignore the new submission.
    #[default]
    DropIfRunning,
    /// Cancel the running unit and start the new one.
    Replace,
    /// Start the new unit after the running one exits.
    Queue,
}

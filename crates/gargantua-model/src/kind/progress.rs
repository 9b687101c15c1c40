use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSpec {
    pub user: String,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub course: String,
    #[serde(default)]
    pub current_step: u32,
    #[serde(default)]
    pub max_step: u32,
    #[serde(default)]
    pub finished: bool,
}

resource!(
    /// Per-user scenario progress, labelled with the scheduled event it ran under.
    Progress,
    "Progress",
    "progresses",
    ProgressSpec,
    ()
);

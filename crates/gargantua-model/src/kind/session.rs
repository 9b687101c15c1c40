use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSpec {
    pub user_id: String,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub course: String,
    #[serde(default)]
    pub access_code: String,
    #[serde(default)]
    pub vm_claims: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    #[serde(default)]
    pub start_time: String,
    /// Unix-date wall clock after which the session is over.
    #[serde(default)]
    pub expiration_time: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub paused: bool,
}

resource!(
    /// A user working through a scenario or course with a set of claims.
    Session,
    "Session",
    "sessions",
    SessionSpec,
    SessionStatus
);

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingSpec {
    pub value: String,
}

resource!(
    /// Operator tunable stored as a string value.
    Setting,
    "Setting",
    "settings",
    SettingSpec,
    ()
);

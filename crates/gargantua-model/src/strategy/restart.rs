use serde::{Deserialize, Serialize};

/// Whether a supervised unit is started again after it exits.
///
/// Informers and controllers run until cancellation, so any other exit is a
/// failure worth restarting.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RestartStrategy {
    Never,
    /// Restart after every exit, successful or not.
    Always,
    #[default]
    OnFailure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_uses_camel_case() {
        assert_eq!(
            serde_json::to_string(&RestartStrategy::OnFailure).unwrap(),
            r#""onFailure""#
        );
        let back: RestartStrategy = serde_json::from_str(r#""always""#).unwrap();
        assert_eq!(back, RestartStrategy::Always);
    }
}

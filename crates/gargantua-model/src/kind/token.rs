use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::domain::parse_wall_clock;
use crate::error::ModelResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetTokenSpec {
    pub user: String,
    /// Wall clock the token was issued at.
    pub timestamp: String,
}

resource!(
    PasswordResetToken,
    "PasswordResetToken",
    "passwordresettokens",
    PasswordResetTokenSpec,
    ()
);

impl PasswordResetToken {
    /// Instant the token stops being valid.
    pub fn expires_at(&self, ttl: Duration) -> ModelResult<OffsetDateTime> {
        Ok(parse_wall_clock(&self.spec.timestamp)? + ttl)
    }
}

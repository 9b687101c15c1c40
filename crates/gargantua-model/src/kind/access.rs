use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::{parse_duration, parse_wall_clock};
use crate::error::ModelResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCodeSpec {
    /// The code itself; equal to the object name.
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scenarios: Vec<String>,
    #[serde(default)]
    pub courses: Vec<String>,
    /// Unix-date wall clock; empty means no expiration.
    #[serde(default)]
    pub expiration: String,
    #[serde(default)]
    pub restricted_bind: bool,
    #[serde(default)]
    pub restricted_bind_value: String,
    #[serde(default)]
    pub printable: bool,
}

resource!(
    /// Shared code owned by a scheduled event.
    AccessCode,
    "AccessCode",
    "accesscodes",
    AccessCodeSpec,
    ()
);

impl AccessCode {
    /// Returns `true` if the code has an expiration at or before `now`.
    ///
    /// An unparsable expiration reads as expired.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        if self.spec.expiration.trim().is_empty() {
            return false;
        }
        match parse_wall_clock(&self.spec.expiration) {
            Ok(exp) => exp <= now,
            Err(_) => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimeAccessCodeSpec {
    /// User that redeemed the code; empty until redeemed.
    #[serde(default)]
    pub user: String,
    /// Wall clock of redemption; empty until redeemed.
    #[serde(default)]
    pub redeemed_timestamp: String,
    /// Validity after redemption (`2h`, `90m`); empty means unlimited.
    #[serde(default)]
    pub max_duration: String,
}

resource!(
    /// Single-use code that proxies to the access code of its scheduled event.
    OneTimeAccessCode,
    "OneTimeAccessCode",
    "onetimeaccesscodes",
    OneTimeAccessCodeSpec,
    ()
);

impl OneTimeAccessCode {
    /// Expiry instant, if the code was redeemed and carries a max duration.
    pub fn expires_at(&self) -> ModelResult<Option<OffsetDateTime>> {
        if self.spec.redeemed_timestamp.trim().is_empty()
            || self.spec.max_duration.trim().is_empty()
        {
            return Ok(None);
        }
        let redeemed = parse_wall_clock(&self.spec.redeemed_timestamp)?;
        let max = parse_duration(&self.spec.max_duration)?;
        Ok(Some(redeemed + max))
    }
}

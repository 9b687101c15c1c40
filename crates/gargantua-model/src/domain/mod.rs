mod labels;
pub use labels::Labels;

mod constants;
pub use constants::*;

mod meta;
pub use meta::{ObjectMeta, OwnerReference, object_key, split_key};

mod selector;
pub use selector::{Operator, Requirement, Selector};

mod wallclock;
pub use wallclock::{format_unix_date, parse_duration, parse_wall_clock};

/// Timeout value in milliseconds.
///
/// Used by supervision policies where an explicit time limit is required.
pub type TimeoutMs = u64;

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("supervisor error: {0}")]
    Supervisor(String),

    #[error("invalid shard: {0}")]
    Shard(String),

    #[error("caches did not sync before shutdown")]
    NotSynced,
}

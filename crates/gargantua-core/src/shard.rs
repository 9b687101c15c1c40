//! Key ownership across controller replicas.
//!
//! Each replica knows its ordinal and the replica count. A key is owned by the
//! ordinal with the highest `hash(key, ordinal)` score (rendezvous hashing), so
//! every key has exactly one owner and resizing moves only the keys of the
//! added or removed ordinal.
use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    ordinal: u32,
    replicas: u32,
}

impl Default for Shard {
    fn default() -> Self {
        Self::single()
    }
}

impl Shard {
    pub fn new(ordinal: u32, replicas: u32) -> Result<Self, CoreError> {
        if replicas == 0 {
            return Err(CoreError::Shard("replica count must be positive".into()));
        }
        if ordinal >= replicas {
            return Err(CoreError::Shard(format!(
                "ordinal {ordinal} out of range for {replicas} replicas"
            )));
        }
        Ok(Self { ordinal, replicas })
    }

    /// The only replica; owns every key.
    pub fn single() -> Self {
        Self {
            ordinal: 0,
            replicas: 1,
        }
    }

    /// Shard of a process whose name ends in `-<ordinal>` (`gargantua-2`).
    pub fn from_instance_name(name: &str, replicas: u32) -> Result<Self, CoreError> {
        let ordinal = name
            .rsplit_once('-')
            .and_then(|(_, suffix)| suffix.parse::<u32>().ok())
            .ok_or_else(|| {
                CoreError::Shard(format!("instance name {name:?} has no ordinal suffix"))
            })?;
        Self::new(ordinal, replicas)
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn replicas(&self) -> u32 {
        self.replicas
    }

    /// Ordinal owning `key`.
    pub fn owner_of(&self, key: &str) -> u32 {
        (0..self.replicas)
            .max_by_key(|ordinal| score(key, *ordinal))
            .unwrap_or(0)
    }

    pub fn owns(&self, key: &str) -> bool {
        self.replicas == 1 || self.owner_of(key) == self.ordinal
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ordinal, self.replicas)
    }
}

fn score(key: &str, ordinal: u32) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    ordinal.hash(&mut hasher);
    hasher.finish()
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::errors::Result;

/// A single mutation of a replicated map.
///
/// Maps are updated by operations rather than overwritten so concurrent writers
/// touching different fields both survive the merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapOp {
    SetRegister { name: String, value: String },
    RemoveRegister { name: String },
    AddToSet { set: String, member: String },
    RemoveFromSet { set: String, member: String },
}

impl MapOp {
    pub fn set_register(name: &str, value: impl ToString) -> Self {
        MapOp::SetRegister {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn add_to_set(set: &str, member: &str) -> Self {
        MapOp::AddToSet {
            set: set.to_string(),
            member: member.to_string(),
        }
    }

    pub fn remove_from_set(set: &str, member: &str) -> Self {
        MapOp::RemoveFromSet {
            set: set.to_string(),
            member: member.to_string(),
        }
    }
}

/// Snapshot of a replicated map: named string registers plus named string sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedMap {
    registers: BTreeMap<String, String>,
    sets: BTreeMap<String, BTreeSet<String>>,
}

impl ReplicatedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str) -> Option<&str> {
        self.registers.get(name).map(String::as_str)
    }

    /// Members of the named set, sorted. A missing set reads as empty.
    pub fn set_members(&self, set: &str) -> Vec<String> {
        self.sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn set_contains(&self, set: &str, member: &str) -> bool {
        self.sets
            .get(set)
            .map(|members| members.contains(member))
            .unwrap_or(false)
    }

    pub fn apply(&mut self, op: &MapOp) {
        match op {
            MapOp::SetRegister { name, value } => {
                self.registers.insert(name.clone(), value.clone());
            }
            MapOp::RemoveRegister { name } => {
                self.registers.remove(name);
            }
            MapOp::AddToSet { set, member } => {
                self.sets
                    .entry(set.clone())
                    .or_default()
                    .insert(member.clone());
            }
            MapOp::RemoveFromSet { set, member } => {
                if let Some(members) = self.sets.get_mut(set) {
                    members.remove(member);
                }
            }
        }
    }
}

/// Shared configuration store: eventually consistent, multi-writer safe maps
/// addressed by bucket and key.
#[async_trait]
pub trait ConfigStore: Send + Sync + 'static {
    /// Read the map stored under `key`, `None` when it was never written or destroyed.
    async fn fetch_map(&self, bucket: &str, key: &str) -> Result<Option<ReplicatedMap>>;

    /// Apply `ops` to the map under `key`, creating it when absent.
    async fn store_map(&self, bucket: &str, key: &str, ops: &[MapOp]) -> Result<()>;

    /// Remove the map under `key` entirely.
    async fn destroy_map(&self, bucket: &str, key: &str) -> Result<()>;
}

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum MembershipError {
    #[error("Unable to join the cluster: {0}")]
    JoinFailed(String),

    #[error("Invalid seed list: {0}")]
    InvalidSeeds(String),
}

/// A live cluster member as seen by the gossip layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Peer {
    pub name: String,
    pub addr: String,
}

impl Peer {
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Peer {
            name: name.into(),
            addr: addr.into(),
        }
    }
}

/// Live view of the cluster. Used as a sizing signal only, never for leader election.
#[async_trait]
pub trait Membership: Send + Sync + 'static {
    /// Contact `seeds` in order and return how many were joined.
    async fn join(&self, seeds: &[String]) -> Result<usize, MembershipError>;

    /// Every live member, this node included, in no particular order.
    fn members(&self) -> Vec<Peer>;

    /// Name this node is registered under.
    fn local_name(&self) -> String;
}

/// StaticMembership treats every seed it is asked to join as a live member.
/// Stands in for the gossip layer in tests and single node runs.
#[derive(Debug, Clone)]
pub struct StaticMembership {
    local: Peer,
    peers: Arc<DashMap<String, Peer>>,
}

impl StaticMembership {
    pub fn new(local: Peer) -> Self {
        let peers = DashMap::new();
        peers.insert(local.name.clone(), local.clone());
        StaticMembership {
            local,
            peers: Arc::new(peers),
        }
    }

    pub fn add_peer(&self, peer: Peer) {
        self.peers.insert(peer.name.clone(), peer);
    }

    pub fn remove_peer(&self, name: &str) {
        if name != self.local.name {
            self.peers.remove(name);
        }
    }
}

#[async_trait]
impl Membership for StaticMembership {
    async fn join(&self, seeds: &[String]) -> Result<usize, MembershipError> {
        if seeds.is_empty() {
            return Err(MembershipError::InvalidSeeds("no seeds given".to_string()));
        }
        for seed in seeds {
            debug!(seed = %seed, "joining seed");
            self.add_peer(Peer::new(seed.clone(), seed.clone()));
        }
        Ok(seeds.len())
    }

    fn members(&self) -> Vec<Peer> {
        let mut members: Vec<Peer> = self.peers.iter().map(|p| p.value().clone()).collect();
        members.sort();
        members
    }

    fn local_name(&self) -> String {
        self.local.name.clone()
    }
}

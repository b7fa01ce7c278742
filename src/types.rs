//! Shared primitive types for the migration driver.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Topic identifier assigned by the metadata log.
pub type TopicId = uuid::Uuid;

/// A position in the replicated metadata log: a committed offset together
/// with the leader epoch that produced it.
///
/// Ordering is offset-major, so comparisons against a remembered position
/// answer "has the log moved past this point".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OffsetAndEpoch {
    /// Committed log offset.
    pub offset: i64,
    /// Leader epoch at that offset.
    pub epoch: i32,
}

impl OffsetAndEpoch {
    /// Sentinel for "no position yet".
    pub const MINUS_ONE: Self = Self {
        offset: -1,
        epoch: -1,
    };

    /// Create a new position.
    pub const fn new(offset: i64, epoch: i32) -> Self {
        Self { offset, epoch }
    }
}

impl Default for OffsetAndEpoch {
    fn default() -> Self {
        Self::MINUS_ONE
    }
}

impl fmt::Display for OffsetAndEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(offset={}, epoch={})", self.offset, self.epoch)
    }
}

/// The leader of the metadata-log quorum as last observed, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderAndEpoch {
    /// Node id of the current leader, or `None` while leadership is unknown
    /// or contested.
    pub leader_id: Option<i32>,
    /// Quorum epoch of that leadership.
    pub epoch: i32,
}

impl LeaderAndEpoch {
    /// The initial "no leader observed yet" value.
    pub const UNKNOWN: Self = Self {
        leader_id: None,
        epoch: -1,
    };

    /// Create a new leader observation.
    pub const fn new(leader_id: Option<i32>, epoch: i32) -> Self {
        Self { leader_id, epoch }
    }

    /// Whether `node_id` is the leader in this observation.
    pub fn is_leader(&self, node_id: i32) -> bool {
        self.leader_id == Some(node_id)
    }
}

impl fmt::Display for LeaderAndEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.leader_id {
            Some(id) => write!(f, "leader={} epoch={}", id, self.epoch),
            None => write!(f, "leader=none epoch={}", self.epoch),
        }
    }
}

/// Version of the metadata format advertised by the log quorum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MetadataVersion(pub i16);

impl fmt::Display for MetadataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

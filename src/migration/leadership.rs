//! The driver's last-known authority in the legacy store.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::OffsetAndEpoch;

/// Version value meaning "never read from the store".
const ZVERSION_UNKNOWN: i32 = -2;

/// Version value meaning "a leadership claim was attempted and lost".
const ZVERSION_CLAIM_FAILED: i32 = -1;

/// Immutable record of the driver's authority in the legacy store and of
/// how much of the metadata log has been mirrored back into it.
///
/// Replaced wholesale by the driver's `apply` mutator; never mutated in
/// place. The legacy store client persists it to the migration-recovery
/// znode, whose on-disk schema is the client's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadershipState {
    /// Controller epoch in the legacy store.
    pub legacy_controller_epoch: i32,
    /// Version of the epoch znode that witnessed the epoch. Every legacy
    /// store write is conditional on this; -2 while unknown, -1 after a
    /// failed claim.
    pub legacy_epoch_zversion: i32,
    /// Node id of the last-known log-quorum controller.
    pub logmeta_controller_id: i32,
    /// Epoch of the last-known log-quorum controller.
    pub logmeta_controller_epoch: i32,
    /// Highest log offset already replayed into the legacy store.
    pub replayed_offset: i64,
    /// Leader epoch paired with `replayed_offset`.
    pub replayed_epoch: i32,
    /// True once bulk replay finished and was acknowledged by the log.
    pub migration_complete: bool,
}

impl LeadershipState {
    /// The empty sentinel the driver starts from.
    pub fn empty() -> Self {
        Self {
            legacy_controller_epoch: -1,
            legacy_epoch_zversion: ZVERSION_UNKNOWN,
            logmeta_controller_id: -1,
            logmeta_controller_epoch: -1,
            replayed_offset: -1,
            replayed_epoch: -1,
            migration_complete: false,
        }
    }

    /// Record a newly observed log-quorum controller.
    pub fn with_new_logmeta_controller(mut self, id: i32, epoch: i32) -> Self {
        self.logmeta_controller_id = id;
        self.logmeta_controller_epoch = epoch;
        self
    }

    /// Record how far the log has been replayed into the legacy store.
    pub fn with_replayed_offset_and_epoch(mut self, offset: i64, epoch: i32) -> Self {
        self.replayed_offset = offset;
        self.replayed_epoch = epoch;
        self
    }

    /// Mark bulk replay as finished.
    pub fn with_migration_complete(mut self) -> Self {
        self.migration_complete = true;
        self
    }

    /// Record a fresh epoch-znode version.
    pub fn with_zversion(mut self, zversion: i32) -> Self {
        self.legacy_epoch_zversion = zversion;
        self
    }

    /// Record a failed leadership claim.
    pub fn with_claim_failed(self) -> Self {
        self.with_zversion(ZVERSION_CLAIM_FAILED)
    }

    /// Whether the last leadership claim failed because another controller
    /// holds the znode.
    pub fn claim_failed(&self) -> bool {
        self.legacy_epoch_zversion == ZVERSION_CLAIM_FAILED
    }

    /// The replayed log position as a comparable pair.
    pub fn replayed_offset_and_epoch(&self) -> OffsetAndEpoch {
        OffsetAndEpoch::new(self.replayed_offset, self.replayed_epoch)
    }
}

impl fmt::Display for LeadershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LeadershipState(legacy_epoch={}, zversion={}, controller={}@{}, replayed={}, complete={})",
            self.legacy_controller_epoch,
            self.legacy_epoch_zversion,
            self.logmeta_controller_id,
            self.logmeta_controller_epoch,
            self.replayed_offset_and_epoch(),
            self.migration_complete,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sentinel() {
        let state = LeadershipState::empty();
        assert_eq!(state.legacy_controller_epoch, -1);
        assert_eq!(state.legacy_epoch_zversion, ZVERSION_UNKNOWN);
        assert!(!state.migration_complete);
        assert!(!state.claim_failed());
        assert_eq!(state.replayed_offset_and_epoch(), OffsetAndEpoch::MINUS_ONE);
    }

    #[test]
    fn mutators_return_new_values() {
        let state = LeadershipState::empty()
            .with_new_logmeta_controller(3, 7)
            .with_replayed_offset_and_epoch(100, 5)
            .with_migration_complete()
            .with_zversion(4);
        assert_eq!(state.logmeta_controller_id, 3);
        assert_eq!(state.logmeta_controller_epoch, 7);
        assert_eq!(
            state.replayed_offset_and_epoch(),
            OffsetAndEpoch::new(100, 5)
        );
        assert!(state.migration_complete);
        assert_eq!(state.legacy_epoch_zversion, 4);
    }

    #[test]
    fn failed_claim_marker() {
        let state = LeadershipState::empty().with_claim_failed();
        assert!(state.claim_failed());
    }
}

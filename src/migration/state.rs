//! Driver lifecycle states and the legal-transition relation.

use std::fmt;

/// Lifecycle state of the migration driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverState {
    /// Startup; migration progress must be recovered from the legacy store.
    Uninitialized,
    /// Not the log-quorum leader, or authority was relinquished.
    Inactive,
    /// Log-quorum leader, waiting for every controller peer to advertise
    /// migration support and for the first metadata publication.
    WaitForControllerQuorum,
    /// Waiting for all legacy-registered brokers to appear in the cluster
    /// image.
    WaitForBrokers,
    /// Attempting to claim exclusive controller leadership in the legacy
    /// store.
    BecomeController,
    /// One-shot bulk replay of legacy metadata into the log.
    BulkMigration,
    /// Sending legacy broker RPCs from the current image before entering
    /// dual-write.
    ControllerToBrokerComm,
    /// Steady state: every published metadata change is mirrored into the
    /// legacy store.
    DualWrite,
}

impl DriverState {
    /// Whether moving to `next` is a legal lifecycle transition. Identity
    /// is always legal; nothing ever re-enters `Uninitialized`.
    pub fn can_transition_to(self, next: DriverState) -> bool {
        use DriverState::*;

        if self == next {
            return true;
        }
        match self {
            Uninitialized | DualWrite => next == Inactive,
            Inactive => next == WaitForControllerQuorum,
            WaitForControllerQuorum => {
                matches!(next, Inactive | BecomeController | WaitForBrokers)
            }
            WaitForBrokers => matches!(next, Inactive | BecomeController),
            BecomeController => {
                matches!(next, Inactive | BulkMigration | ControllerToBrokerComm)
            }
            BulkMigration => matches!(next, Inactive | ControllerToBrokerComm),
            ControllerToBrokerComm => matches!(next, Inactive | DualWrite),
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::DriverState::{self, *};

    const ALL: [DriverState; 8] = [
        Uninitialized,
        Inactive,
        WaitForControllerQuorum,
        WaitForBrokers,
        BecomeController,
        BulkMigration,
        ControllerToBrokerComm,
        DualWrite,
    ];

    fn legal_targets(from: DriverState) -> Vec<DriverState> {
        match from {
            Uninitialized => vec![Inactive],
            Inactive => vec![WaitForControllerQuorum],
            WaitForControllerQuorum => vec![Inactive, BecomeController, WaitForBrokers],
            WaitForBrokers => vec![Inactive, BecomeController],
            BecomeController => vec![Inactive, BulkMigration, ControllerToBrokerComm],
            BulkMigration => vec![Inactive, ControllerToBrokerComm],
            ControllerToBrokerComm => vec![Inactive, DualWrite],
            DualWrite => vec![Inactive],
        }
    }

    #[test]
    fn transition_relation_is_exact() {
        for from in ALL {
            let legal = legal_targets(from);
            for to in ALL {
                let expected = from == to || legal.contains(&to);
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "transition {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn nothing_reenters_uninitialized() {
        for from in ALL {
            if from != Uninitialized {
                assert!(!from.can_transition_to(Uninitialized));
            }
        }
    }

    #[test]
    fn identity_is_always_legal() {
        for state in ALL {
            assert!(state.can_transition_to(state));
        }
    }
}

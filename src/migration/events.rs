//! Event kinds processed by the driver worker.

use tokio::sync::oneshot;

use crate::error::{DriverError, DriverResult};
use crate::metadata::{MetadataDelta, MetadataImage};
use crate::migration::state::DriverState;
use crate::types::{LeaderAndEpoch, OffsetAndEpoch};

/// Completion signal for a metadata change event. Resolved with the event's
/// outcome once the worker has processed it; production publications carry
/// `None`.
pub(crate) type ChangeCompletion = oneshot::Sender<DriverResult<()>>;

/// An event on the driver's serial queue.
pub(crate) enum DriverEvent {
    /// Periodic self-scheduling tick.
    Poll,
    /// The log-quorum leadership changed.
    LeaderChange(LeaderAndEpoch),
    /// A new metadata image was published.
    MetadataChange {
        /// The incremental change set.
        delta: MetadataDelta,
        /// The new image.
        image: MetadataImage,
        /// Log position of the publication.
        provenance: OffsetAndEpoch,
        /// Whether the publication came from a snapshot.
        is_snapshot: bool,
        /// Optional completion signal.
        completion: Option<ChangeCompletion>,
    },
    /// Check whether the controller quorum is ready for migration.
    WaitForControllerQuorum,
    /// Check whether all legacy brokers have registered with the log.
    WaitForBrokers,
    /// Attempt to claim legacy controller leadership.
    BecomeController,
    /// Run the bulk replay of legacy metadata.
    MigrateMetadata,
    /// Send broker RPCs from the current image.
    SendRpcs,
    /// Answer with the current state, after all previously enqueued events.
    ReadState(oneshot::Sender<DriverState>),
}

impl DriverEvent {
    /// Stable event name for logs and fault messages.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            DriverEvent::Poll => "PollEvent",
            DriverEvent::LeaderChange(_) => "LeaderChangeEvent",
            DriverEvent::MetadataChange { .. } => "MetadataChangeEvent",
            DriverEvent::WaitForControllerQuorum => "WaitForControllerQuorumEvent",
            DriverEvent::WaitForBrokers => "WaitForBrokersEvent",
            DriverEvent::BecomeController => "BecomeLegacyControllerEvent",
            DriverEvent::MigrateMetadata => "MigrateMetadataEvent",
            DriverEvent::SendRpcs => "SendRpcsEvent",
            DriverEvent::ReadState(_) => "ReadStateEvent",
        }
    }

    /// Resolve the event as rejected because the queue is closed. Dropping
    /// a `ReadState` sender is enough: the receiver observes the closure.
    pub(crate) fn reject_closed(self) {
        if let DriverEvent::MetadataChange {
            completion: Some(completion),
            ..
        } = self
        {
            let _ = completion.send(Err(DriverError::QueueClosed));
        }
    }
}

//! Contracts between the migration driver and its external collaborators.
//!
//! The driver itself never talks to the legacy store, the metadata log, or
//! brokers directly; it drives these interfaces. Every legacy store write
//! takes the current [`LeadershipState`] and returns a new one carrying the
//! refreshed epoch-znode version, so the caller's next conditional write is
//! guarded by what the store actually witnessed.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{DriverError, MigrationClientError, RecordConsumerError};
use crate::metadata::{
    AccessControlEntry, ConfigResource, LoaderManifest, MetadataDelta, MetadataImage,
    MigrationBatch, PartitionAssignment, QuotaEntity, ResourcePattern,
};
use crate::migration::leadership::LeadershipState;
use crate::types::{LeaderAndEpoch, MetadataVersion, OffsetAndEpoch, TopicId};

/// Result type for legacy store operations.
pub type ClientResult<T> = Result<T, MigrationClientError>;

/// Client for the legacy coordination store.
///
/// Writes are conditional on the epoch-znode version cached inside the
/// passed [`LeadershipState`]; a version conflict surfaces as a
/// [`MigrationClientError::Store`] and is authoritative evidence that
/// another controller took over.
#[async_trait]
pub trait MigrationClient: Send + Sync {
    /// Read the persisted migration recovery state, creating the znode if it
    /// does not exist yet.
    async fn get_or_create_recovery_state(&self) -> ClientResult<LeadershipState>;

    /// Persist the recovery state, returning it with a refreshed znode
    /// version.
    async fn set_recovery_state(&self, state: LeadershipState) -> ClientResult<LeadershipState>;

    /// Attempt to claim exclusive controller leadership in the legacy store.
    /// When another controller currently holds the leadership znode, the
    /// returned state carries a `legacy_epoch_zversion` of -1 and nothing
    /// was written.
    async fn claim_controller_leadership(
        &self,
        state: LeadershipState,
    ) -> ClientResult<LeadershipState>;

    /// Ids of all brokers registered in the legacy store.
    async fn read_broker_ids(&self) -> ClientResult<HashSet<i32>>;

    /// Ids of all brokers that appear in legacy topic partition assignments.
    /// Considerably more expensive than [`Self::read_broker_ids`].
    async fn read_broker_ids_from_topic_assignments(&self) -> ClientResult<HashSet<i32>>;

    /// Stream every piece of legacy metadata as record batches into
    /// `batches`, and every broker id seen along the way into `brokers`.
    /// Per-entity grouping is preserved so that a record and its tombstones
    /// arrive in the same batch or in order. The batch channel is bounded;
    /// sending blocks until the driver has committed the previous batch,
    /// which is the reader's backpressure.
    async fn read_all_metadata(
        &self,
        batches: mpsc::Sender<MigrationBatch>,
        brokers: mpsc::UnboundedSender<i32>,
    ) -> ClientResult<()>;

    /// Create a topic znode with its partition assignments.
    async fn create_topic(
        &self,
        name: &str,
        id: TopicId,
        partitions: &BTreeMap<i32, PartitionAssignment>,
        state: LeadershipState,
    ) -> ClientResult<LeadershipState>;

    /// Update partition assignments of existing topics.
    async fn update_topic_partitions(
        &self,
        updates: &HashMap<String, BTreeMap<i32, PartitionAssignment>>,
        state: LeadershipState,
    ) -> ClientResult<LeadershipState>;

    /// Overwrite all config entries for a resource.
    async fn write_configs(
        &self,
        resource: &ConfigResource,
        configs: &BTreeMap<String, String>,
        state: LeadershipState,
    ) -> ClientResult<LeadershipState>;

    /// Overwrite all quota values for an entity.
    async fn write_client_quotas(
        &self,
        entity: &QuotaEntity,
        quotas: &BTreeMap<String, f64>,
        state: LeadershipState,
    ) -> ClientResult<LeadershipState>;

    /// Persist the next producer id.
    async fn write_producer_id(
        &self,
        next_producer_id: i64,
        state: LeadershipState,
    ) -> ClientResult<LeadershipState>;

    /// Remove ACL entries under a resource pattern.
    async fn remove_deleted_acls(
        &self,
        pattern: &ResourcePattern,
        entries: &[AccessControlEntry],
        state: LeadershipState,
    ) -> ClientResult<LeadershipState>;

    /// Add ACL entries under a resource pattern.
    async fn write_added_acls(
        &self,
        pattern: &ResourcePattern,
        entries: &[AccessControlEntry],
        state: LeadershipState,
    ) -> ClientResult<LeadershipState>;
}

/// Consumer that ingests bulk-migration batches into the metadata log.
#[async_trait]
pub trait RecordConsumer: Send + Sync {
    /// Open a migration transaction in the log.
    async fn begin_migration(&self) -> Result<(), RecordConsumerError>;

    /// Submit one batch; resolves once the log has committed it.
    async fn accept_batch(&self, batch: MigrationBatch) -> Result<(), RecordConsumerError>;

    /// Finish the migration; resolves to the log position of the final
    /// committed record.
    async fn complete_migration(&self) -> Result<OffsetAndEpoch, RecordConsumerError>;

    /// Abandon an in-progress migration.
    async fn abort_migration(&self);
}

/// Sends legacy-protocol RPCs to brokers so they track cluster state while
/// the controller lives in the log quorum.
#[async_trait]
pub trait LegacyPropagator: Send + Sync {
    /// Inform the propagator of the metadata version in effect.
    async fn set_metadata_version(&self, version: MetadataVersion);

    /// Send full cluster state from an image to every legacy broker.
    async fn send_rpcs_from_image(&self, image: &MetadataImage, legacy_controller_epoch: i32);

    /// Send the changed portion of cluster state to affected legacy brokers.
    async fn send_rpcs_from_delta(
        &self,
        delta: &MetadataDelta,
        image: &MetadataImage,
        legacy_controller_epoch: i32,
    );
}

/// Probe reporting whether every controller peer advertises migration
/// support.
pub trait QuorumFeatures: Send + Sync {
    /// `None` when the whole quorum is ready to migrate; otherwise a
    /// human-readable reason why not.
    fn reason_all_controllers_not_ready(&self) -> Option<String>;
}

/// Sink for faults that should not kill the worker but must be surfaced.
pub trait FaultHandler: Send + Sync {
    /// Report a fault with an optional cause.
    fn handle_fault(&self, message: &str, cause: Option<&DriverError>);
}

/// Publisher interface the driver exposes to the metadata loader. All
/// methods only enqueue work; nothing blocks.
pub trait MetadataPublisher: Send + Sync {
    /// Publisher name, used by the loader for logging.
    fn name(&self) -> &str;

    /// The log-quorum leadership changed.
    fn on_leader_change(&self, leader: LeaderAndEpoch);

    /// A new metadata image was published.
    fn on_metadata_update(
        &self,
        delta: MetadataDelta,
        image: MetadataImage,
        manifest: &LoaderManifest,
    );

    /// The loader is shutting the publisher down.
    fn close(&self);
}

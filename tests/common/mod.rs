//! Shared mocks and harness for driver integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use logmeta_migration::client::ClientResult;
use logmeta_migration::metadata::{
    AccessControlEntry, BrokerRegistration, ConfigResource, MetadataDelta, MetadataImage,
    MigrationBatch, MigrationPhase, PartitionAssignment, QuotaEntity, ResourcePattern,
};
use logmeta_migration::{
    DriverConfig, DriverError, DriverHandle, DriverState, FaultHandler, LeaderAndEpoch,
    LeadershipState, LegacyPropagator, MetadataPublisher, MetadataVersion, MigrationClient,
    MigrationClientError, MigrationDriver, OffsetAndEpoch, QuorumFeatures, RecordConsumer,
    RecordConsumerError, TopicId,
};

/// One recorded legacy store write, for ordering assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    ClaimLeadership,
    SetRecoveryState,
    CreateTopic(String),
    UpdateTopicPartitions(Vec<String>),
    WriteConfigs(ConfigResource),
    WriteClientQuotas(QuotaEntity),
    WriteProducerId(i64),
    RemoveDeletedAcls(ResourcePattern, usize),
    WriteAddedAcls(ResourcePattern, usize),
}

/// In-memory legacy store standing in for the real client.
pub struct MockMigrationClient {
    recovery_state: Mutex<LeadershipState>,
    pub broker_ids: Mutex<HashSet<i32>>,
    pub assignment_broker_ids: Mutex<HashSet<i32>>,
    pub batches: Mutex<Vec<MigrationBatch>>,
    pub migrated_broker_ids: Mutex<Vec<i32>>,
    pub writes: Mutex<Vec<WriteOp>>,
    pub claim_errors: Mutex<VecDeque<MigrationClientError>>,
    pub claim_denied: AtomicBool,
    pub claim_calls: AtomicUsize,
    next_zversion: AtomicI32,
}

impl MockMigrationClient {
    pub fn new(recovery_state: LeadershipState) -> Arc<Self> {
        Arc::new(Self {
            recovery_state: Mutex::new(recovery_state),
            broker_ids: Mutex::new(HashSet::new()),
            assignment_broker_ids: Mutex::new(HashSet::new()),
            batches: Mutex::new(Vec::new()),
            migrated_broker_ids: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            claim_errors: Mutex::new(VecDeque::new()),
            claim_denied: AtomicBool::new(false),
            claim_calls: AtomicUsize::new(0),
            next_zversion: AtomicI32::new(1),
        })
    }

    pub fn recorded_writes(&self) -> Vec<WriteOp> {
        self.writes.lock().unwrap().clone()
    }

    fn record(&self, op: WriteOp, state: LeadershipState) -> ClientResult<LeadershipState> {
        self.writes.lock().unwrap().push(op);
        let zversion = self.next_zversion.fetch_add(1, Ordering::SeqCst);
        Ok(state.with_zversion(zversion))
    }
}

#[async_trait]
impl MigrationClient for MockMigrationClient {
    async fn get_or_create_recovery_state(&self) -> ClientResult<LeadershipState> {
        Ok(self.recovery_state.lock().unwrap().clone())
    }

    async fn set_recovery_state(&self, state: LeadershipState) -> ClientResult<LeadershipState> {
        *self.recovery_state.lock().unwrap() = state.clone();
        self.record(WriteOp::SetRecoveryState, state)
    }

    async fn claim_controller_leadership(
        &self,
        state: LeadershipState,
    ) -> ClientResult<LeadershipState> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.claim_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        if self.claim_denied.load(Ordering::SeqCst) {
            return Ok(state.with_claim_failed());
        }
        let epoch = state.legacy_controller_epoch + 1;
        let mut claimed = state;
        claimed.legacy_controller_epoch = epoch;
        self.record(WriteOp::ClaimLeadership, claimed)
    }

    async fn read_broker_ids(&self) -> ClientResult<HashSet<i32>> {
        Ok(self.broker_ids.lock().unwrap().clone())
    }

    async fn read_broker_ids_from_topic_assignments(&self) -> ClientResult<HashSet<i32>> {
        Ok(self.assignment_broker_ids.lock().unwrap().clone())
    }

    async fn read_all_metadata(
        &self,
        batches: mpsc::Sender<MigrationBatch>,
        brokers: mpsc::UnboundedSender<i32>,
    ) -> ClientResult<()> {
        let queued: Vec<MigrationBatch> = self.batches.lock().unwrap().clone();
        for batch in queued {
            batches
                .send(batch)
                .await
                .map_err(|_| MigrationClientError::Store("batch sink closed".to_string()))?;
        }
        for broker_id in self.migrated_broker_ids.lock().unwrap().iter() {
            let _ = brokers.send(*broker_id);
        }
        Ok(())
    }

    async fn create_topic(
        &self,
        name: &str,
        _id: TopicId,
        _partitions: &BTreeMap<i32, PartitionAssignment>,
        state: LeadershipState,
    ) -> ClientResult<LeadershipState> {
        self.record(WriteOp::CreateTopic(name.to_string()), state)
    }

    async fn update_topic_partitions(
        &self,
        updates: &HashMap<String, BTreeMap<i32, PartitionAssignment>>,
        state: LeadershipState,
    ) -> ClientResult<LeadershipState> {
        let mut names: Vec<String> = updates.keys().cloned().collect();
        names.sort();
        self.record(WriteOp::UpdateTopicPartitions(names), state)
    }

    async fn write_configs(
        &self,
        resource: &ConfigResource,
        _configs: &BTreeMap<String, String>,
        state: LeadershipState,
    ) -> ClientResult<LeadershipState> {
        self.record(WriteOp::WriteConfigs(resource.clone()), state)
    }

    async fn write_client_quotas(
        &self,
        entity: &QuotaEntity,
        _quotas: &BTreeMap<String, f64>,
        state: LeadershipState,
    ) -> ClientResult<LeadershipState> {
        self.record(WriteOp::WriteClientQuotas(entity.clone()), state)
    }

    async fn write_producer_id(
        &self,
        next_producer_id: i64,
        state: LeadershipState,
    ) -> ClientResult<LeadershipState> {
        self.record(WriteOp::WriteProducerId(next_producer_id), state)
    }

    async fn remove_deleted_acls(
        &self,
        pattern: &ResourcePattern,
        entries: &[AccessControlEntry],
        state: LeadershipState,
    ) -> ClientResult<LeadershipState> {
        self.record(
            WriteOp::RemoveDeletedAcls(pattern.clone(), entries.len()),
            state,
        )
    }

    async fn write_added_acls(
        &self,
        pattern: &ResourcePattern,
        entries: &[AccessControlEntry],
        state: LeadershipState,
    ) -> ClientResult<LeadershipState> {
        self.record(
            WriteOp::WriteAddedAcls(pattern.clone(), entries.len()),
            state,
        )
    }
}

/// Record consumer that commits instantly (or hangs on demand).
pub struct MockRecordConsumer {
    pub begin_calls: AtomicUsize,
    pub accepted: Mutex<Vec<MigrationBatch>>,
    pub complete_result: Mutex<OffsetAndEpoch>,
    pub abort_calls: AtomicUsize,
    pub hang_on_accept: AtomicBool,
}

impl MockRecordConsumer {
    pub fn new(complete_result: OffsetAndEpoch) -> Arc<Self> {
        Arc::new(Self {
            begin_calls: AtomicUsize::new(0),
            accepted: Mutex::new(Vec::new()),
            complete_result: Mutex::new(complete_result),
            abort_calls: AtomicUsize::new(0),
            hang_on_accept: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl RecordConsumer for MockRecordConsumer {
    async fn begin_migration(&self) -> Result<(), RecordConsumerError> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn accept_batch(&self, batch: MigrationBatch) -> Result<(), RecordConsumerError> {
        if self.hang_on_accept.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.accepted.lock().unwrap().push(batch);
        Ok(())
    }

    async fn complete_migration(&self) -> Result<OffsetAndEpoch, RecordConsumerError> {
        Ok(*self.complete_result.lock().unwrap())
    }

    async fn abort_migration(&self) {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Propagator that records every RPC fan-out.
#[derive(Default)]
pub struct MockPropagator {
    pub metadata_versions: Mutex<Vec<MetadataVersion>>,
    pub images_sent: Mutex<Vec<(OffsetAndEpoch, i32)>>,
    pub deltas_sent: Mutex<Vec<i32>>,
}

#[async_trait]
impl LegacyPropagator for MockPropagator {
    async fn set_metadata_version(&self, version: MetadataVersion) {
        self.metadata_versions.lock().unwrap().push(version);
    }

    async fn send_rpcs_from_image(&self, image: &MetadataImage, legacy_controller_epoch: i32) {
        self.images_sent
            .lock()
            .unwrap()
            .push((image.highest_offset_and_epoch, legacy_controller_epoch));
    }

    async fn send_rpcs_from_delta(
        &self,
        _delta: &MetadataDelta,
        _image: &MetadataImage,
        legacy_controller_epoch: i32,
    ) {
        self.deltas_sent.lock().unwrap().push(legacy_controller_epoch);
    }
}

/// Readiness probe with a switchable answer.
pub struct MockQuorumFeatures {
    pub not_ready_reason: Mutex<Option<String>>,
}

impl MockQuorumFeatures {
    pub fn ready() -> Arc<Self> {
        Arc::new(Self {
            not_ready_reason: Mutex::new(None),
        })
    }
}

impl QuorumFeatures for MockQuorumFeatures {
    fn reason_all_controllers_not_ready(&self) -> Option<String> {
        self.not_ready_reason.lock().unwrap().clone()
    }
}

/// Fault handler that records every report.
#[derive(Default)]
pub struct RecordingFaultHandler {
    pub faults: Mutex<Vec<String>>,
}

impl RecordingFaultHandler {
    pub fn recorded(&self) -> Vec<String> {
        self.faults.lock().unwrap().clone()
    }
}

impl FaultHandler for RecordingFaultHandler {
    fn handle_fault(&self, message: &str, cause: Option<&DriverError>) {
        let entry = match cause {
            Some(cause) => format!("{message}: {cause}"),
            None => message.to_string(),
        };
        self.faults.lock().unwrap().push(entry);
    }
}

/// A fully wired driver over mock collaborators.
pub struct Harness {
    pub driver: MigrationDriver,
    pub client: Arc<MockMigrationClient>,
    pub consumer: Arc<MockRecordConsumer>,
    pub propagator: Arc<MockPropagator>,
    pub quorum: Arc<MockQuorumFeatures>,
    pub faults: Arc<RecordingFaultHandler>,
    pub registered: Arc<Mutex<Option<DriverHandle>>>,
    pub node_id: i32,
}

impl Harness {
    pub fn new(node_id: i32) -> Self {
        Self::with_recovery(node_id, LeadershipState::empty())
    }

    pub fn with_recovery(node_id: i32, recovery: LeadershipState) -> Self {
        Self::build(node_id, recovery, test_config(node_id))
    }

    pub fn build(node_id: i32, recovery: LeadershipState, config: DriverConfig) -> Self {
        init_tracing();
        let client = MockMigrationClient::new(recovery);
        let consumer = MockRecordConsumer::new(OffsetAndEpoch::new(100, 5));
        let propagator = Arc::new(MockPropagator::default());
        let quorum = MockQuorumFeatures::ready();
        let faults = Arc::new(RecordingFaultHandler::default());
        let registered = Arc::new(Mutex::new(None));

        let registration_slot = Arc::clone(&registered);
        let driver = MigrationDriver::new(
            config,
            client.clone(),
            consumer.clone(),
            propagator.clone(),
            quorum.clone(),
            faults.clone(),
            Box::new(move |handle| {
                *registration_slot.lock().unwrap() = Some(handle);
            }),
        );

        Self {
            driver,
            client,
            consumer,
            propagator,
            quorum,
            faults,
            registered,
            node_id,
        }
    }

    pub fn leader_change(&self, leader_id: Option<i32>, epoch: i32) {
        self.driver
            .on_leader_change(LeaderAndEpoch::new(leader_id, epoch));
    }

    /// Publish a metadata change and wait for the worker to process it.
    pub async fn publish(
        &self,
        delta: MetadataDelta,
        image: MetadataImage,
        provenance: OffsetAndEpoch,
    ) -> Result<(), DriverError> {
        self.driver
            .enqueue_metadata_change(delta, image, provenance, false)
            .await
            .expect("driver dropped the completion")
    }

    /// Wait until the worker reports `want`, panicking after five seconds.
    pub async fn wait_for_state(&self, want: DriverState) {
        let outcome = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match self.driver.current_state().await {
                    Ok(state) if state == want => return,
                    Ok(_) => tokio::time::sleep(Duration::from_millis(2)).await,
                    Err(error) => panic!("driver queue closed while waiting: {error}"),
                }
            }
        })
        .await;
        assert!(outcome.is_ok(), "timed out waiting for driver state {want}");
    }

    /// Sample the worker state until `target` is reached, collecting the
    /// distinct states seen along the way (including the starting one).
    pub async fn collect_states_until(&self, target: DriverState) -> Vec<DriverState> {
        let mut seen: Vec<DriverState> = Vec::new();
        let outcome = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let state = self
                    .driver
                    .current_state()
                    .await
                    .expect("driver queue closed while sampling");
                if seen.last() != Some(&state) {
                    seen.push(state);
                }
                if state == target {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;
        assert!(
            outcome.is_ok(),
            "timed out waiting for driver state {target}, saw {seen:?}"
        );
        seen
    }
}

/// Config with short intervals so tests advance quickly.
pub fn test_config(node_id: i32) -> DriverConfig {
    DriverConfig {
        node_id,
        poll_interval: Duration::from_millis(20),
        metadata_commit_timeout: Duration::from_millis(500),
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("logmeta_migration=debug")
        .try_init();
}

/// An image with the given migration phase, migrating legacy brokers, and
/// log position.
pub fn image_with(
    phase: MigrationPhase,
    brokers: &[i32],
    position: OffsetAndEpoch,
) -> MetadataImage {
    let mut image = MetadataImage::empty();
    image.features.migration_phase = phase;
    image.features.metadata_version = MetadataVersion(7);
    for id in brokers {
        image.cluster.brokers.insert(
            *id,
            BrokerRegistration {
                id: *id,
                is_migrating_legacy_broker: true,
                fenced: false,
            },
        );
    }
    image.highest_offset_and_epoch = position;
    image
}

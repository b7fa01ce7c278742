//! The migration driver: wires the event loop to the collaborators and
//! implements the handlers for each event kind.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace};

use super::event_loop::{EventLoop, EventQueueHandle};
use super::events::DriverEvent;
use super::leadership::LeadershipState;
use super::state::DriverState;
use crate::client::{
    FaultHandler, LegacyPropagator, MetadataPublisher, MigrationClient, QuorumFeatures,
    RecordConsumer,
};
use crate::config::DriverConfig;
use crate::error::{DriverError, DriverResult};
use crate::metadata::{LoaderManifest, MetadataDelta, MetadataImage, MigrationPhase};
use crate::types::{LeaderAndEpoch, OffsetAndEpoch};

/// Name the driver registers under with the metadata loader.
const DRIVER_NAME: &str = "MetadataMigrationDriver";

/// One-shot callback invoked once migration state has been recovered from
/// the legacy store. Used to delay installing the driver as a metadata
/// publisher so that no leadership or metadata events arrive before
/// recovery; the driver must not be registered at construction time.
pub type InitialLoadCallback = Box<dyn FnOnce(DriverHandle) + Send + Sync + 'static>;

/// Cross-thread snapshot of the worker-owned fields. Written only by the
/// worker, after each event.
struct SharedView {
    state: DriverState,
    leadership: LeadershipState,
    leader: LeaderAndEpoch,
}

/// Cheap-to-clone handle to the driver. Implements [`MetadataPublisher`]
/// by enqueueing events; never touches driver state directly.
#[derive(Clone)]
pub struct DriverHandle {
    pub(crate) queue: EventQueueHandle,
}

impl MetadataPublisher for DriverHandle {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn on_leader_change(&self, leader: LeaderAndEpoch) {
        self.queue.append(DriverEvent::LeaderChange(leader));
    }

    fn on_metadata_update(
        &self,
        delta: MetadataDelta,
        image: MetadataImage,
        manifest: &LoaderManifest,
    ) {
        self.queue.append(DriverEvent::MetadataChange {
            delta,
            image,
            provenance: manifest.provenance,
            is_snapshot: manifest.is_snapshot(),
            completion: None,
        });
    }

    fn close(&self) {
        self.queue.shutdown();
    }
}

/// Orchestrates a live, one-way migration of cluster metadata from the
/// legacy store into the log quorum.
///
/// Construction spawns the worker task (so it must happen inside a Tokio
/// runtime) but performs no migration work; [`MigrationDriver::start`]
/// enqueues the first poll, which recovers persisted migration progress
/// before anything else runs.
pub struct MigrationDriver {
    queue: EventQueueHandle,
    view: Arc<RwLock<SharedView>>,
    tracker: TaskTracker,
}

impl MigrationDriver {
    /// Create the driver and spawn its worker task.
    pub fn new(
        config: DriverConfig,
        client: Arc<dyn MigrationClient>,
        consumer: Arc<dyn RecordConsumer>,
        propagator: Arc<dyn LegacyPropagator>,
        quorum_features: Arc<dyn QuorumFeatures>,
        fault_handler: Arc<dyn FaultHandler>,
        initial_load_callback: InitialLoadCallback,
    ) -> Self {
        let (queue, event_loop) = EventLoop::channel();
        let view = Arc::new(RwLock::new(SharedView {
            state: DriverState::Uninitialized,
            leadership: LeadershipState::empty(),
            leader: LeaderAndEpoch::UNKNOWN,
        }));

        let core = DriverCore {
            config,
            client,
            consumer,
            propagator,
            quorum_features,
            fault_handler,
            initial_load_callback: Some(initial_load_callback),
            handle: DriverHandle {
                queue: queue.clone(),
            },
            state: DriverState::Uninitialized,
            leadership: LeadershipState::empty(),
            image: MetadataImage::empty(),
            leader: LeaderAndEpoch::UNKNOWN,
            first_publish: false,
            view: Arc::clone(&view),
        };

        let tracker = TaskTracker::new();
        tracker.spawn(event_loop.run(core));
        tracker.close();

        Self {
            queue,
            view,
            tracker,
        }
    }

    /// Begin migration work: the first poll is prepended so recovery runs
    /// ahead of anything already enqueued.
    pub fn start(&self) {
        self.queue.prepend(DriverEvent::Poll);
    }

    /// Soft shutdown: the in-flight event completes, the queue drains and
    /// closes, and the worker task is joined.
    pub async fn shutdown(&self) {
        debug!("shutting down migration driver");
        self.queue.shutdown();
        self.tracker.wait().await;
    }

    /// A publisher handle for registering with the metadata loader.
    pub fn handle(&self) -> DriverHandle {
        DriverHandle {
            queue: self.queue.clone(),
        }
    }

    /// The driver state as seen by the worker. The answer is produced after
    /// every previously enqueued event has been processed, which makes this
    /// a happens-before edge for tests.
    pub async fn current_state(&self) -> DriverResult<DriverState> {
        let (tx, rx) = oneshot::channel();
        self.queue.append(DriverEvent::ReadState(tx));
        rx.await.map_err(|_| DriverError::QueueClosed)
    }

    /// Snapshot of the driver state. May lag [`Self::current_state`] by the
    /// event currently in flight.
    pub async fn state(&self) -> DriverState {
        self.view.read().await.state
    }

    /// Snapshot of the last-known legacy store authority.
    pub async fn leadership(&self) -> LeadershipState {
        self.view.read().await.leadership.clone()
    }

    /// Snapshot of the last observed log-quorum leadership.
    pub async fn leader(&self) -> LeaderAndEpoch {
        self.view.read().await.leader
    }

    /// Enqueue a metadata change and return a completion that resolves with
    /// the event's outcome once the worker has processed it. Production
    /// publications go through [`MetadataPublisher::on_metadata_update`]
    /// instead, which carries no completion.
    pub fn enqueue_metadata_change(
        &self,
        delta: MetadataDelta,
        image: MetadataImage,
        provenance: OffsetAndEpoch,
        is_snapshot: bool,
    ) -> oneshot::Receiver<DriverResult<()>> {
        let (tx, rx) = oneshot::channel();
        self.queue.append(DriverEvent::MetadataChange {
            delta,
            image,
            provenance,
            is_snapshot,
            completion: Some(tx),
        });
        rx
    }
}

impl MetadataPublisher for MigrationDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn on_leader_change(&self, leader: LeaderAndEpoch) {
        self.queue.append(DriverEvent::LeaderChange(leader));
    }

    fn on_metadata_update(
        &self,
        delta: MetadataDelta,
        image: MetadataImage,
        manifest: &LoaderManifest,
    ) {
        self.handle().on_metadata_update(delta, image, manifest);
    }

    fn close(&self) {
        self.queue.shutdown();
    }
}

/// Worker-owned driver state and behavior. Only the event loop touches it.
pub(crate) struct DriverCore {
    pub(crate) config: DriverConfig,
    pub(crate) client: Arc<dyn MigrationClient>,
    pub(crate) consumer: Arc<dyn RecordConsumer>,
    pub(crate) propagator: Arc<dyn LegacyPropagator>,
    pub(crate) quorum_features: Arc<dyn QuorumFeatures>,
    pub(crate) fault_handler: Arc<dyn FaultHandler>,
    pub(crate) initial_load_callback: Option<InitialLoadCallback>,
    pub(crate) handle: DriverHandle,
    pub(crate) state: DriverState,
    pub(crate) leadership: LeadershipState,
    pub(crate) image: MetadataImage,
    pub(crate) leader: LeaderAndEpoch,
    pub(crate) first_publish: bool,
    view: Arc<RwLock<SharedView>>,
}

impl DriverCore {
    /// Process one event. Errors flow to the queue's exception policy.
    pub(crate) async fn handle(&mut self, event: DriverEvent) -> DriverResult<()> {
        match event {
            DriverEvent::Poll => self.handle_poll().await,
            DriverEvent::LeaderChange(leader) => self.handle_leader_change(leader),
            DriverEvent::MetadataChange {
                delta,
                image,
                provenance,
                is_snapshot,
                completion,
            } => {
                let result = self
                    .handle_metadata_change(delta, image, provenance, is_snapshot)
                    .await;
                if let Some(completion) = completion {
                    let _ = completion.send(result.clone());
                }
                result
            }
            DriverEvent::WaitForControllerQuorum => self.handle_wait_for_controller_quorum(),
            DriverEvent::WaitForBrokers => self.handle_wait_for_brokers().await,
            DriverEvent::BecomeController => self.handle_become_controller().await,
            DriverEvent::MigrateMetadata => self.handle_migrate_metadata().await,
            DriverEvent::SendRpcs => self.handle_send_rpcs().await,
            DriverEvent::ReadState(tx) => {
                let _ = tx.send(self.state);
                Ok(())
            }
        }
    }

    /// Periodic tick: advance the state machine when no external event has
    /// driven it, then re-schedule one poll interval ahead. The re-schedule
    /// happens even when the body fails, so transient recovery errors are
    /// retried.
    async fn handle_poll(&mut self) -> DriverResult<()> {
        let result = match self.state {
            DriverState::Uninitialized => self.recover().await,
            // Nothing to do while inactive; a leader-change event must tell
            // us we are the leader first. In dual-write mode, metadata
            // change events drive the legacy store writes.
            DriverState::Inactive | DriverState::DualWrite => Ok(()),
            DriverState::WaitForControllerQuorum => {
                self.enqueue(DriverEvent::WaitForControllerQuorum);
                Ok(())
            }
            DriverState::WaitForBrokers => {
                self.enqueue(DriverEvent::WaitForBrokers);
                Ok(())
            }
            DriverState::BecomeController => {
                self.enqueue(DriverEvent::BecomeController);
                Ok(())
            }
            DriverState::BulkMigration => {
                self.enqueue(DriverEvent::MigrateMetadata);
                Ok(())
            }
            DriverState::ControllerToBrokerComm => {
                self.enqueue(DriverEvent::SendRpcs);
                Ok(())
            }
        };

        self.handle
            .queue
            .schedule_deferred(Instant::now() + self.config.poll_interval, DriverEvent::Poll);
        result
    }

    /// Recover persisted migration progress from the legacy store, then
    /// install the driver as a metadata publisher. Runs exactly once, from
    /// the first successful poll.
    async fn recover(&mut self) -> DriverResult<()> {
        info!("recovering migration state from the legacy store");
        let client = Arc::clone(&self.client);
        self.apply("Recovery", move |_| async move {
            client
                .get_or_create_recovery_state()
                .await
                .map_err(Into::into)
        })
        .await?;

        let progress = if self.leadership.migration_complete {
            "done"
        } else {
            "not done"
        };
        info!(
            "recovered migration state {}; bulk migration is {progress}",
            self.leadership
        );

        // Only now may the loader start delivering leadership and metadata
        // events to us.
        if let Some(callback) = self.initial_load_callback.take() {
            callback(self.handle.clone());
        }

        self.transition_to(DriverState::Inactive)
    }

    /// The log quorum elected a (possibly different) leader.
    fn handle_leader_change(&mut self, leader: LeaderAndEpoch) -> DriverResult<()> {
        self.leader = leader;
        let node_id = self.config.node_id;

        if leader.is_leader(node_id) {
            self.record_apply(
                "LeaderChange is active",
                self.leadership
                    .clone()
                    .with_new_logmeta_controller(node_id, leader.epoch),
            );
            // Before taking over the legacy brokers, make sure the whole
            // controller quorum can handle migration.
            self.transition_to(DriverState::WaitForControllerQuorum)
        } else {
            self.record_apply(
                "LeaderChange is not active",
                self.leadership
                    .clone()
                    .with_new_logmeta_controller(leader.leader_id.unwrap_or(-1), leader.epoch),
            );
            self.transition_to(DriverState::Inactive)
        }
    }

    /// Check the migration flag and the readiness of every controller peer.
    fn handle_wait_for_controller_quorum(&mut self) -> DriverResult<()> {
        if self.state != DriverState::WaitForControllerQuorum {
            return Ok(());
        }
        if !self.first_publish {
            trace!("waiting for the first metadata publication before continuing with migration");
            return Ok(());
        }

        match self.image.features.migration_phase {
            MigrationPhase::None => {
                error!(
                    "the cluster is not configured for migration from the legacy store; \
                     this controller should not have migration enabled, not proceeding"
                );
                self.transition_to(DriverState::Inactive)
            }
            MigrationPhase::PreMigration => {
                match self.quorum_features.reason_all_controllers_not_ready() {
                    Some(reason) => {
                        info!(
                            "still waiting for all controller nodes to be ready for migration: {reason}"
                        );
                        Ok(())
                    }
                    None => {
                        debug!(
                            "controller quorum is ready for migration, now waiting for legacy brokers"
                        );
                        self.transition_to(DriverState::WaitForBrokers)
                    }
                }
            }
            MigrationPhase::Migration => {
                if self.leadership.migration_complete {
                    // Rebooting a controller mid-migration.
                    debug!("migration is already in progress, not waiting on legacy brokers");
                    self.transition_to(DriverState::BecomeController)
                } else {
                    error!(
                        "the metadata log indicates an active migration, but the legacy store does not"
                    );
                    self.transition_to(DriverState::Inactive)
                }
            }
            MigrationPhase::PostMigration => {
                error!(
                    "the metadata log indicates a completed migration, but the migration driver is somehow active"
                );
                self.transition_to(DriverState::Inactive)
            }
        }
    }

    /// Check that every legacy-registered broker is visible in the image.
    async fn handle_wait_for_brokers(&mut self) -> DriverResult<()> {
        if self.state != DriverState::WaitForBrokers {
            return Ok(());
        }
        if self.legacy_brokers_ready().await? {
            debug!("legacy brokers are registered and ready for migration");
            self.transition_to(DriverState::BecomeController)?;
        }
        Ok(())
    }

    async fn legacy_brokers_ready(&self) -> DriverResult<bool> {
        if !self.first_publish {
            info!("waiting for the initial metadata publication before checking legacy brokers");
            return Ok(false);
        }
        if self.image.cluster.is_empty() {
            // Mostly happens when a fresh legacy cluster and a fresh log
            // quorum are started around the same time.
            info!("no brokers are known to the log quorum, waiting for brokers to register");
            return Ok(false);
        }

        let registered = self.client.read_broker_ids().await?;
        if registered.is_empty() {
            info!("no brokers are registered in the legacy store, waiting for brokers to register");
            return Ok(false);
        }
        if let Some(missing) = self.brokers_missing_from_image(&registered) {
            info!("still waiting for legacy brokers {missing:?} to register with the log quorum");
            return Ok(false);
        }

        // Once all registrations are found, check the topic assignments as
        // well; this is far more expensive than listing registrations.
        let assigned = self.client.read_broker_ids_from_topic_assignments().await?;
        if let Some(missing) = self.brokers_missing_from_image(&assigned) {
            info!("still waiting for legacy brokers {missing:?} to register with the log quorum");
            return Ok(false);
        }

        Ok(true)
    }

    /// Ids from `broker_ids` that are not present in the cluster image with
    /// the migrating-legacy-broker marker, or `None` when all are.
    fn brokers_missing_from_image(&self, broker_ids: &HashSet<i32>) -> Option<HashSet<i32>> {
        let mut remaining = broker_ids.clone();
        for broker in self.image.cluster.brokers.values() {
            if broker.is_migrating_legacy_broker {
                remaining.remove(&broker.id);
            }
        }
        if remaining.is_empty() {
            None
        } else {
            Some(remaining)
        }
    }

    /// Try to claim exclusive controller leadership in the legacy store.
    async fn handle_become_controller(&mut self) -> DriverResult<()> {
        if self.state != DriverState::BecomeController {
            return Ok(());
        }

        let client = Arc::clone(&self.client);
        self.apply("BecomeController", move |state| async move {
            client
                .claim_controller_leadership(state)
                .await
                .map_err(Into::into)
        })
        .await?;

        if self.leadership.claim_failed() {
            debug!(
                "unable to claim legacy controller leadership, will retry until we learn of a different log-quorum leader"
            );
            return Ok(());
        }
        if self.leadership.migration_complete {
            self.transition_to(DriverState::ControllerToBrokerComm)
        } else {
            self.transition_to(DriverState::BulkMigration)
        }
    }

    /// Send full-state RPCs to legacy brokers once the image has caught up
    /// with everything already replayed into the legacy store.
    async fn handle_send_rpcs(&mut self) -> DriverResult<()> {
        if self.state != DriverState::ControllerToBrokerComm {
            // No longer in the state this event was scheduled for.
            return Ok(());
        }

        let replayed = self.leadership.replayed_offset_and_epoch();
        if self.image.highest_offset_and_epoch >= replayed {
            trace!(
                "sending RPCs to brokers before moving to dual-write mode, image is at {}",
                self.image.highest_offset_and_epoch
            );
            self.propagator
                .send_rpcs_from_image(&self.image, self.leadership.legacy_controller_epoch)
                .await;
            // Leadership state is unchanged, no legacy store write happened.
            self.transition_to(DriverState::DualWrite)
        } else {
            trace!(
                "image at {} is older than the replayed position {replayed}, waiting for a newer publication",
                self.image.highest_offset_and_epoch
            );
            Ok(())
        }
    }

    /// Replace the leadership state with the output of `mutator`, logging
    /// the swap. This is the single point where leadership state changes;
    /// mutators that write to the legacy store return the state carrying
    /// the refreshed znode version.
    pub(crate) async fn apply<F, Fut>(&mut self, name: &str, mutator: F) -> DriverResult<()>
    where
        F: FnOnce(LeadershipState) -> Fut,
        Fut: Future<Output = DriverResult<LeadershipState>>,
    {
        let after = mutator(self.leadership.clone()).await?;
        self.record_apply(name, after);
        Ok(())
    }

    /// Install an already-computed leadership state (the infallible tail of
    /// [`Self::apply`]).
    fn record_apply(&mut self, name: &str, after: LeadershipState) {
        trace!("{name} transitioned from {} to {after}", self.leadership);
        self.leadership = after;
    }

    /// Move to `next`, failing loudly on an illegal transition.
    pub(crate) fn transition_to(&mut self, next: DriverState) -> DriverResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(DriverError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        if next != self.state {
            debug!(
                "node {} transitioning from {} to {next} state",
                self.config.node_id, self.state
            );
        } else {
            trace!(
                "node {} remaining in {} state",
                self.config.node_id,
                self.state
            );
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn enqueue(&self, event: DriverEvent) {
        self.handle.queue.append(event);
    }

    pub(crate) fn report_fault(&self, message: &str, cause: &DriverError) {
        self.fault_handler.handle_fault(message, Some(cause));
    }

    /// Publish the worker-owned fields for external readers.
    pub(crate) async fn sync_view(&self) {
        let mut view = self.view.write().await;
        view.state = self.state;
        view.leadership = self.leadership.clone();
        view.leader = self.leader;
    }
}

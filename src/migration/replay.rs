//! Bulk replay of legacy store metadata into the log quorum.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, trace, Level};

use super::driver::DriverCore;
use super::state::DriverState;
use crate::error::{DriverError, DriverResult, RecordConsumerError};
use crate::metadata::describe_batch;
use crate::types::OffsetAndEpoch;

/// Outcome of a completed replay.
struct ReplaySummary {
    position: OffsetAndEpoch,
    record_count: usize,
    brokers: BTreeSet<i32>,
}

impl DriverCore {
    /// One-shot bulk replay: read everything the legacy store holds and
    /// feed it into the log as a migration transaction. Any failure aborts
    /// the transaction and leaves the state machine where it was; the next
    /// poll retries.
    pub(crate) async fn handle_migrate_metadata(&mut self) -> DriverResult<()> {
        if self.state != DriverState::BulkMigration {
            return Ok(());
        }

        info!("starting migration of legacy store metadata into the log quorum");
        self.consumer.begin_migration().await?;

        match self.replay_and_commit().await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.consumer.abort_migration().await;
                Err(error)
            }
        }
    }

    /// Everything after `begin_migration`: a failure anywhere in here makes
    /// the caller abort the migration transaction.
    async fn replay_and_commit(&mut self) -> DriverResult<()> {
        let summary = self.replay_all_metadata().await?;
        info!(
            "completed migration of metadata from the legacy store. A total of {} \
             metadata records were generated. The log position is now {} with an epoch \
             of {}. Saw {} brokers in the migrated metadata {:?}.",
            summary.record_count,
            summary.position.offset,
            summary.position.epoch,
            summary.brokers.len(),
            summary.brokers
        );
        let client = Arc::clone(&self.client);
        let position = summary.position;
        self.apply("Finished migrating legacy data", move |state| async move {
            client
                .set_recovery_state(
                    state
                        .with_replayed_offset_and_epoch(position.offset, position.epoch)
                        .with_migration_complete(),
                )
                .await
                .map_err(Into::into)
        })
        .await?;
        self.transition_to(DriverState::ControllerToBrokerComm)
    }

    /// Stream record batches from the legacy store reader into the record
    /// consumer, blocking on each commit. The reader runs on its own task
    /// and the bounded batch channel provides the backpressure.
    async fn replay_all_metadata(&mut self) -> DriverResult<ReplaySummary> {
        let (batch_tx, mut batch_rx) = mpsc::channel(1);
        let (broker_tx, mut broker_rx) = mpsc::unbounded_channel();
        let client = Arc::clone(&self.client);
        let reader =
            tokio::spawn(async move { client.read_all_metadata(batch_tx, broker_tx).await });

        let mut record_count = 0usize;
        while let Some(batch) = batch_rx.recv().await {
            if tracing::enabled!(Level::TRACE) {
                trace!(
                    "migrating {} records from the legacy store: {}",
                    batch.len(),
                    describe_batch(&batch)
                );
            } else {
                info!("migrating {} records from the legacy store", batch.len());
            }
            record_count += batch.len();

            let commit = self.consumer.accept_batch(batch);
            if let Err(error) = self
                .wait_for_log("the metadata log to commit a migration record batch", commit)
                .await
            {
                reader.abort();
                return Err(error);
            }
        }

        match reader.await {
            Ok(Ok(())) => {}
            Ok(Err(client_error)) => return Err(client_error.into()),
            Err(join_error) => {
                return Err(DriverError::Fatal(format!(
                    "legacy metadata reader task failed: {join_error}"
                )))
            }
        }

        let position = self
            .wait_for_log(
                "the metadata log to complete the migration",
                self.consumer.complete_migration(),
            )
            .await?;

        let mut brokers = BTreeSet::new();
        while let Ok(broker_id) = broker_rx.try_recv() {
            brokers.insert(broker_id);
        }

        Ok(ReplaySummary {
            position,
            record_count,
            brokers,
        })
    }

    /// Block on a log commit with the configured deadline; a timeout is a
    /// fatal fault, not a transient error.
    async fn wait_for_log<T, Fut>(&self, what: &str, commit: Fut) -> DriverResult<T>
    where
        Fut: Future<Output = Result<T, RecordConsumerError>>,
    {
        let timeout = self.config.metadata_commit_timeout;
        match tokio::time::timeout(timeout, commit).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(DriverError::Timeout {
                what: what.to_string(),
                timeout,
            }),
        }
    }
}

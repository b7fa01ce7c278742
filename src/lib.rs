//! Control-plane driver for a live, one-way migration of cluster metadata
//! from a hierarchical coordination store (the legacy store) into a
//! replicated-log metadata quorum.
//!
//! The driver runs co-located with every metadata-log controller replica;
//! only the instance whose node is the current log-quorum leader performs
//! migration work. It recovers previously persisted migration progress from
//! the legacy store, claims exclusive controller authority there, replays
//! all legacy metadata into the log, and then enters dual-write mode in
//! which every metadata change published by the log is mirrored back into
//! the legacy store while legacy-protocol brokers are kept informed via
//! RPCs.
//!
//! All of this is coordinated by a single-threaded event loop: external
//! callers only enqueue events, and one worker task serializes every state
//! mutation.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Contracts between the driver and its external collaborators.
pub mod client;

/// Driver configuration.
pub mod config;

/// Error types.
pub mod error;

/// Metadata images, deltas, and migration record batches.
pub mod metadata;

/// The migration state machine: event loop, driver, and dual-write
/// translation.
pub mod migration;

/// Shared primitive types.
pub mod types;

pub use {
    client::{
        FaultHandler, LegacyPropagator, MetadataPublisher, MigrationClient, QuorumFeatures,
        RecordConsumer,
    },
    config::DriverConfig,
    error::{DriverError, DriverResult, MigrationClientError, RecordConsumerError},
    metadata::{LoaderManifest, ManifestKind, MetadataDelta, MetadataImage, MigrationPhase},
    migration::driver::{DriverHandle, InitialLoadCallback, MigrationDriver},
    migration::leadership::LeadershipState,
    migration::state::DriverState,
    types::{LeaderAndEpoch, MetadataVersion, OffsetAndEpoch, TopicId},
};

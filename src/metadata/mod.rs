//! The metadata model published by the log quorum.
//!
//! State is materialized as successive immutable [`MetadataImage`]s; each
//! publication carries the incremental [`MetadataDelta`] that produced the
//! new image from the previous one. During bulk migration, legacy metadata
//! travels as batches of [`MetadataRecord`]s.

mod acl;
mod delta;
mod image;
mod record;

pub use acl::{
    AccessControlEntry, AclBinding, AclOperation, AclPermission, AclResourceType, PatternType,
    ResourcePattern,
};
pub use delta::{
    AclsDelta, ClientQuotasDelta, ClusterDelta, ConfigsDelta, FeaturesDelta, LoaderManifest,
    ManifestKind, MetadataDelta, ProducerIdsDelta, TopicChange, TopicsDelta,
};
pub use image::{
    AclsImage, BrokerRegistration, ClientQuotasImage, ClusterImage, ConfigResource, ConfigsImage,
    FeaturesImage, MetadataImage, MigrationPhase, PartitionAssignment, ProducerIdsImage,
    QuotaEntity, ResourceKind, TopicImage, TopicsImage,
};
pub use record::{describe_batch, MetadataRecord, MigrationBatch};

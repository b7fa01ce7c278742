//! Incremental change sets between successive metadata images.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::acl::AclBinding;
use super::image::{ConfigResource, MigrationPhase, PartitionAssignment, QuotaEntity};
use crate::types::{MetadataVersion, OffsetAndEpoch, TopicId};

/// Changes to the features image.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeaturesDelta {
    /// New metadata version, when it changed.
    pub metadata_version: Option<MetadataVersion>,
    /// New migration phase, when it changed.
    pub migration_phase: Option<MigrationPhase>,
}

/// One changed topic inside a [`TopicsDelta`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicChange {
    /// Topic id.
    pub id: TopicId,
    /// Topic name.
    pub name: String,
    /// Partitions that changed, by index.
    pub partition_changes: BTreeMap<i32, PartitionAssignment>,
}

/// Changes to the topics image. `changes` preserves the insertion order of
/// the delta; mirrored writes follow it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopicsDelta {
    /// Changed topics, in delta insertion order.
    pub changes: Vec<TopicChange>,
    /// Ids of topics created by this delta (everything else is an update).
    pub created_topic_ids: HashSet<TopicId>,
}

/// Changes to the configs image: the resources whose entries changed. The
/// mirrored write always carries the full map from the new image.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigsDelta {
    /// Resources with changed entries, in delta insertion order.
    pub changed_resources: Vec<ConfigResource>,
}

/// Changes to the client-quotas image.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientQuotasDelta {
    /// Entities with changed quotas, in delta insertion order.
    pub changed_entities: Vec<QuotaEntity>,
}

/// Change to the producer-id allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerIdsDelta {
    /// The new next producer id.
    pub next_producer_id: i64,
}

/// Changes to the ACLs image. A `None` value is a deletion; the deleted
/// binding itself must be looked up in the previous image.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AclsDelta {
    /// Changed ACLs by id, in delta insertion order.
    pub changes: Vec<(Uuid, Option<AclBinding>)>,
}

/// Changes to the cluster image. Only its presence matters to the driver:
/// broker registration changes trigger RPC fan-out to legacy brokers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterDelta {
    /// Ids of brokers whose registration changed.
    pub changed_broker_ids: Vec<i32>,
}

/// The incremental change set carried alongside a published image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetadataDelta {
    /// Feature changes.
    pub features: Option<FeaturesDelta>,
    /// Topic changes.
    pub topics: Option<TopicsDelta>,
    /// Config changes.
    pub configs: Option<ConfigsDelta>,
    /// Client quota changes.
    pub client_quotas: Option<ClientQuotasDelta>,
    /// Producer-id changes.
    pub producer_ids: Option<ProducerIdsDelta>,
    /// ACL changes.
    pub acls: Option<AclsDelta>,
    /// Broker registration changes.
    pub cluster: Option<ClusterDelta>,
}

impl MetadataDelta {
    /// An empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach feature changes.
    pub fn with_features(mut self, features: FeaturesDelta) -> Self {
        self.features = Some(features);
        self
    }

    /// Attach topic changes.
    pub fn with_topics(mut self, topics: TopicsDelta) -> Self {
        self.topics = Some(topics);
        self
    }

    /// Attach config changes.
    pub fn with_configs(mut self, configs: ConfigsDelta) -> Self {
        self.configs = Some(configs);
        self
    }

    /// Attach client quota changes.
    pub fn with_client_quotas(mut self, quotas: ClientQuotasDelta) -> Self {
        self.client_quotas = Some(quotas);
        self
    }

    /// Attach a producer-id change.
    pub fn with_producer_ids(mut self, producer_ids: ProducerIdsDelta) -> Self {
        self.producer_ids = Some(producer_ids);
        self
    }

    /// Attach ACL changes.
    pub fn with_acls(mut self, acls: AclsDelta) -> Self {
        self.acls = Some(acls);
        self
    }

    /// Attach broker registration changes.
    pub fn with_cluster(mut self, cluster: ClusterDelta) -> Self {
        self.cluster = Some(cluster);
        self
    }
}

/// Whether a publication carries a full snapshot or an incremental delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestKind {
    /// Full image re-published from a snapshot.
    Snapshot,
    /// Incremental change.
    Delta,
}

/// Describes a single metadata publication from the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderManifest {
    /// Snapshot or delta.
    pub kind: ManifestKind,
    /// The log position of the publication.
    pub provenance: OffsetAndEpoch,
}

impl LoaderManifest {
    /// Whether this publication came from a snapshot.
    pub fn is_snapshot(&self) -> bool {
        self.kind == ManifestKind::Snapshot
    }
}

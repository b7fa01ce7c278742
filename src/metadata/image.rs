//! Immutable snapshots of cluster metadata.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::acl::AclBinding;
use crate::types::{MetadataVersion, OffsetAndEpoch, TopicId};

/// The migration flag carried in the features image. Four-valued: it tells
/// the driver whether this cluster is configured for migration at all, and
/// how far along it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MigrationPhase {
    /// The cluster was never configured for migration.
    #[default]
    None,
    /// Migration is enabled but bulk replay has not been committed yet.
    PreMigration,
    /// Bulk replay has been committed to the log.
    Migration,
    /// Migration finished and legacy mode was left behind for good.
    PostMigration,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Feature levels advertised by the log quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturesImage {
    /// Current metadata format version.
    pub metadata_version: MetadataVersion,
    /// Migration flag.
    pub migration_phase: MigrationPhase,
}

impl Default for FeaturesImage {
    fn default() -> Self {
        Self {
            metadata_version: MetadataVersion(0),
            migration_phase: MigrationPhase::None,
        }
    }
}

/// Registration of a single broker in the cluster image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerRegistration {
    /// Broker id.
    pub id: i32,
    /// Whether this broker registered as a legacy broker that is part of the
    /// migration (as opposed to a native log-quorum broker).
    pub is_migrating_legacy_broker: bool,
    /// Whether the broker is currently fenced.
    pub fenced: bool,
}

/// Brokers known to the log quorum.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterImage {
    /// Registered brokers by id.
    pub brokers: BTreeMap<i32, BrokerRegistration>,
}

impl ClusterImage {
    /// Whether no broker has registered yet.
    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
    }
}

/// Replica assignment and leadership for a single partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionAssignment {
    /// Assigned replicas.
    pub replicas: Vec<i32>,
    /// In-sync replicas.
    pub isr: Vec<i32>,
    /// Current leader (-1 for none).
    pub leader: i32,
    /// Leader epoch.
    pub leader_epoch: i32,
    /// Partition epoch, bumped on every assignment change.
    pub partition_epoch: i32,
}

/// A single topic in the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicImage {
    /// Topic id.
    pub id: TopicId,
    /// Topic name.
    pub name: String,
    /// Partitions by index.
    pub partitions: BTreeMap<i32, PartitionAssignment>,
}

/// Topics known to the log quorum.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopicsImage {
    /// Topics by id.
    pub by_id: HashMap<TopicId, TopicImage>,
}

/// Kind of resource a config entry is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A broker (or the broker default).
    Broker,
    /// A topic.
    Topic,
}

/// A configurable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigResource {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource name.
    pub name: String,
}

impl fmt::Display for ConfigResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ResourceKind::Broker => write!(f, "broker '{}'", self.name),
            ResourceKind::Topic => write!(f, "topic '{}'", self.name),
        }
    }
}

/// Dynamic configuration entries.
///
/// The legacy store persists every entry for a resource in a single znode,
/// so mirroring always writes the full map for a resource, never a diff.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigsImage {
    /// Config entries per resource.
    pub resources: HashMap<ConfigResource, BTreeMap<String, String>>,
}

impl ConfigsImage {
    /// The full config map for a resource; empty when the resource carries
    /// no entries.
    pub fn map_for_resource(&self, resource: &ConfigResource) -> BTreeMap<String, String> {
        self.resources.get(resource).cloned().unwrap_or_default()
    }
}

/// Entity a client quota applies to, e.g. `{user: alice}` or
/// `{user: alice, client-id: x}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotaEntity {
    /// Entity keys and names.
    pub entries: BTreeMap<String, String>,
}

impl fmt::Display for QuotaEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Client quotas known to the log quorum. Like configs, the legacy store
/// keeps all quota values for an entity in one znode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientQuotasImage {
    /// Quota values per entity.
    pub entities: HashMap<QuotaEntity, BTreeMap<String, f64>>,
}

impl ClientQuotasImage {
    /// The full quota map for an entity; empty when no quotas remain.
    pub fn quota_map(&self, entity: &QuotaEntity) -> BTreeMap<String, f64> {
        self.entities.get(entity).cloned().unwrap_or_default()
    }
}

/// Producer-id block allocation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerIdsImage {
    /// Next producer id to hand out; -1 when none were issued yet.
    pub next_producer_id: i64,
}

impl Default for ProducerIdsImage {
    fn default() -> Self {
        Self {
            next_producer_id: -1,
        }
    }
}

/// ACLs known to the log quorum, keyed by their log-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AclsImage {
    /// Bindings by id.
    pub by_id: HashMap<Uuid, AclBinding>,
}

impl AclsImage {
    /// Look up a binding by id.
    pub fn get(&self, id: &Uuid) -> Option<&AclBinding> {
        self.by_id.get(id)
    }
}

/// An immutable snapshot of all cluster metadata materialized from the log.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetadataImage {
    /// Feature levels, including the migration flag.
    pub features: FeaturesImage,
    /// Registered brokers.
    pub cluster: ClusterImage,
    /// Topics and partitions.
    pub topics: TopicsImage,
    /// Dynamic configs.
    pub configs: ConfigsImage,
    /// Client quotas.
    pub client_quotas: ClientQuotasImage,
    /// Producer-id allocation.
    pub producer_ids: ProducerIdsImage,
    /// ACLs.
    pub acls: AclsImage,
    /// The log position this image was materialized at.
    pub highest_offset_and_epoch: OffsetAndEpoch,
}

impl MetadataImage {
    /// The empty image the driver starts from. Its position is the
    /// [`OffsetAndEpoch::MINUS_ONE`] sentinel.
    pub fn empty() -> Self {
        Self::default()
    }
}

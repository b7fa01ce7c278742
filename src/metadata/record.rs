//! Record batches produced while reading legacy metadata for bulk replay.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::acl::AclBinding;
use super::image::{ConfigResource, PartitionAssignment, QuotaEntity};
use crate::types::TopicId;

/// One batch of records emitted by the legacy store reader. Per-entity
/// grouping is preserved: a record and its tombstones arrive in the same
/// batch or in order across batches.
pub type MigrationBatch = Vec<MetadataRecord>;

/// A single metadata record replayed from the legacy store into the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataRecord {
    /// Topic existence.
    Topic {
        /// Topic id.
        id: TopicId,
        /// Topic name.
        name: String,
    },
    /// Partition assignment for one partition of a topic.
    Partition {
        /// Owning topic.
        topic_id: TopicId,
        /// Partition index.
        partition: i32,
        /// Assignment.
        assignment: PartitionAssignment,
    },
    /// One config entry; `None` value is a tombstone.
    Config {
        /// Resource the entry belongs to.
        resource: ConfigResource,
        /// Entry name.
        name: String,
        /// Entry value, or `None` for deletion.
        value: Option<String>,
    },
    /// One client quota value; `None` value is a tombstone.
    ClientQuota {
        /// Entity the quota applies to.
        entity: QuotaEntity,
        /// Quota key.
        key: String,
        /// Quota value, or `None` for deletion.
        value: Option<f64>,
    },
    /// Producer-id block allocation.
    ProducerIds {
        /// Next producer id to hand out.
        next_producer_id: i64,
    },
    /// An ACL binding.
    Acl {
        /// Log-assigned id.
        id: Uuid,
        /// The binding.
        binding: AclBinding,
    },
    /// A broker registered in the legacy store.
    BrokerRegistration {
        /// Broker id.
        broker_id: i32,
        /// Whether the broker registered as a migrating legacy broker.
        is_migrating_legacy_broker: bool,
    },
    /// A feature level.
    Feature {
        /// Feature name.
        name: String,
        /// Feature level.
        level: i16,
    },
}

/// Compact single-line rendering of a batch for trace logging.
pub fn describe_batch(batch: &[MetadataRecord]) -> String {
    let parts: Vec<String> = batch
        .iter()
        .map(|record| match record {
            MetadataRecord::Topic { id, name } => format!("Topic({name}, {id})"),
            MetadataRecord::Partition {
                topic_id,
                partition,
                ..
            } => format!("Partition({topic_id}, {partition})"),
            MetadataRecord::Config { resource, name, .. } => {
                format!("Config({resource}, {name})")
            }
            MetadataRecord::ClientQuota { entity, key, .. } => {
                format!("ClientQuota({entity}, {key})")
            }
            MetadataRecord::ProducerIds { next_producer_id } => {
                format!("ProducerIds({next_producer_id})")
            }
            MetadataRecord::Acl { id, .. } => format!("Acl({id})"),
            MetadataRecord::BrokerRegistration { broker_id, .. } => {
                format!("Broker({broker_id})")
            }
            MetadataRecord::Feature { name, level } => format!("Feature({name}={level})"),
        })
        .collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::image::ResourceKind;

    #[test]
    fn batch_description_is_compact() {
        let batch = vec![
            MetadataRecord::Topic {
                id: Uuid::nil(),
                name: "orders".to_string(),
            },
            MetadataRecord::Config {
                resource: ConfigResource {
                    kind: ResourceKind::Topic,
                    name: "orders".to_string(),
                },
                name: "retention.ms".to_string(),
                value: Some("1000".to_string()),
            },
            MetadataRecord::ProducerIds {
                next_producer_id: 42,
            },
        ];
        let description = describe_batch(&batch);
        assert!(description.starts_with('['));
        assert!(description.contains("Topic(orders"));
        assert!(description.contains("Config(topic 'orders', retention.ms)"));
        assert!(description.contains("ProducerIds(42)"));
    }
}

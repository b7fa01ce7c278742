//! Dual-write translation: mirroring a published metadata delta into an
//! ordered sequence of legacy store writes.
//!
//! Mirror groups run in a fixed order (topics, configs, client quotas,
//! producer ids, ACLs) so a broker-side observer of the legacy store sees a
//! consistent view, and each group runs inside its own leadership-state
//! `apply` so the conditional-write version is refreshed between groups.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, trace};

use super::driver::DriverCore;
use super::state::DriverState;
use crate::error::{DriverError, DriverResult};
use crate::metadata::{
    AccessControlEntry, AclBinding, MetadataDelta, MetadataImage, ResourcePattern,
};
use crate::types::OffsetAndEpoch;

/// ACL entries grouped by resource pattern, preserving first-seen pattern
/// order.
type GroupedAcls = Vec<(ResourcePattern, Vec<AccessControlEntry>)>;

fn group_acl(groups: &mut GroupedAcls, binding: &AclBinding) {
    match groups
        .iter_mut()
        .find(|(pattern, _)| *pattern == binding.pattern)
    {
        Some((_, entries)) => entries.push(binding.entry.clone()),
        None => groups.push((binding.pattern.clone(), vec![binding.entry.clone()])),
    }
}

impl DriverCore {
    /// Absorb a metadata publication and, in dual-write mode, mirror it
    /// into the legacy store.
    ///
    /// The image swap and the first-publish latch happen regardless of
    /// state: even an inactive driver keeps tracking what the log publishes.
    pub(crate) async fn handle_metadata_change(
        &mut self,
        delta: MetadataDelta,
        image: MetadataImage,
        provenance: OffsetAndEpoch,
        is_snapshot: bool,
    ) -> DriverResult<()> {
        self.first_publish = true;
        let prev_image = std::mem::replace(&mut self.image, image);
        let metadata_type = if is_snapshot { "snapshot" } else { "delta" };

        if self.state != DriverState::DualWrite {
            trace!(
                "received metadata {metadata_type}, but the controller is not in dual-write \
                 mode; ignoring the change to be mirrored to the legacy store"
            );
            return Ok(());
        }

        if delta.features.is_some() {
            self.propagator
                .set_metadata_version(self.image.features.metadata_version)
                .await;
        }

        if self.image.highest_offset_and_epoch >= self.leadership.replayed_offset_and_epoch() {
            self.mirror_topics(&delta).await?;
            self.mirror_configs(&delta).await?;
            self.mirror_client_quotas(&delta).await?;
            self.mirror_producer_ids(&delta).await?;
            self.mirror_acls(&delta, &prev_image).await?;

            if delta.topics.is_some() || delta.cluster.is_some() {
                trace!("sending RPCs to brokers for metadata {metadata_type}");
                self.propagator
                    .send_rpcs_from_delta(
                        &delta,
                        &self.image,
                        self.leadership.legacy_controller_epoch,
                    )
                    .await;
            } else {
                trace!(
                    "not sending RPCs to brokers for metadata {metadata_type}, no relevant metadata has changed"
                );
            }
        } else {
            info!(
                "ignoring metadata {metadata_type} at {provenance} which has already been \
                 written to the legacy store"
            );
        }
        Ok(())
    }

    /// Mirror topic creations and partition changes, in delta order.
    async fn mirror_topics(&mut self, delta: &MetadataDelta) -> DriverResult<()> {
        let Some(topics) = delta.topics.as_ref() else {
            return Ok(());
        };
        for change in &topics.changes {
            let client = Arc::clone(&self.client);
            let name = change.name.clone();
            let partitions = change.partition_changes.clone();
            if topics.created_topic_ids.contains(&change.id) {
                let id = change.id;
                self.apply(&format!("Create topic {}", change.name), move |state| {
                    async move {
                        client
                            .create_topic(&name, id, &partitions, state)
                            .await
                            .map_err(Into::into)
                    }
                })
                .await?;
            } else {
                self.apply(&format!("Update topic {}", change.name), move |state| {
                    async move {
                        let updates = HashMap::from([(name, partitions)]);
                        client
                            .update_topic_partitions(&updates, state)
                            .await
                            .map_err(Into::into)
                    }
                })
                .await?;
            }
        }
        Ok(())
    }

    /// Mirror config changes. The legacy store persists everything for a
    /// resource in a single znode, so the full map from the new image is
    /// written, not a diff.
    async fn mirror_configs(&mut self, delta: &MetadataDelta) -> DriverResult<()> {
        let Some(configs) = delta.configs.as_ref() else {
            return Ok(());
        };
        for resource in &configs.changed_resources {
            let client = Arc::clone(&self.client);
            let resource = resource.clone();
            let full_map = self.image.configs.map_for_resource(&resource);
            self.apply(
                &format!("Update config resource {resource}"),
                move |state| async move {
                    client
                        .write_configs(&resource, &full_map, state)
                        .await
                        .map_err(Into::into)
                },
            )
            .await?;
        }
        Ok(())
    }

    /// Mirror client quota changes, full map per entity as with configs.
    async fn mirror_client_quotas(&mut self, delta: &MetadataDelta) -> DriverResult<()> {
        let Some(quotas) = delta.client_quotas.as_ref() else {
            return Ok(());
        };
        for entity in &quotas.changed_entities {
            let client = Arc::clone(&self.client);
            let entity = entity.clone();
            let quota_map = self.image.client_quotas.quota_map(&entity);
            self.apply(
                &format!("Update client quota {entity}"),
                move |state| async move {
                    client
                        .write_client_quotas(&entity, &quota_map, state)
                        .await
                        .map_err(Into::into)
                },
            )
            .await?;
        }
        Ok(())
    }

    /// Mirror the producer-id allocation.
    async fn mirror_producer_ids(&mut self, delta: &MetadataDelta) -> DriverResult<()> {
        let Some(producer_ids) = delta.producer_ids.as_ref() else {
            return Ok(());
        };
        let client = Arc::clone(&self.client);
        let next_producer_id = producer_ids.next_producer_id;
        self.apply("Update next producer ID", move |state| async move {
            client
                .write_producer_id(next_producer_id, state)
                .await
                .map_err(Into::into)
        })
        .await
    }

    /// Mirror ACL changes: all deletions first, then all additions, each
    /// grouped by resource pattern. A deletion whose binding was never seen
    /// in the previous image cannot be mirrored and is fatal.
    async fn mirror_acls(
        &mut self,
        delta: &MetadataDelta,
        prev_image: &MetadataImage,
    ) -> DriverResult<()> {
        let Some(acls) = delta.acls.as_ref() else {
            return Ok(());
        };

        let mut deleted: GroupedAcls = Vec::new();
        let mut added: GroupedAcls = Vec::new();
        for (id, change) in &acls.changes {
            match change {
                Some(binding) => group_acl(&mut added, binding),
                None => match prev_image.acls.get(id) {
                    Some(binding) => group_acl(&mut deleted, binding),
                    None => {
                        return Err(DriverError::Fatal(format!(
                            "cannot remove deleted ACL {id} from the legacy store since it is \
                             not present in the previous ACLs image"
                        )))
                    }
                },
            }
        }

        for (pattern, entries) in deleted {
            let client = Arc::clone(&self.client);
            let name = format!("Delete {} ACLs for resource {pattern}", entries.len());
            self.apply(&name, move |state| async move {
                client
                    .remove_deleted_acls(&pattern, &entries, state)
                    .await
                    .map_err(Into::into)
            })
            .await?;
        }
        for (pattern, entries) in added {
            let client = Arc::clone(&self.client);
            let name = format!("Add {} ACLs for resource {pattern}", entries.len());
            self.apply(&name, move |state| async move {
                client
                    .write_added_acls(&pattern, &entries, state)
                    .await
                    .map_err(Into::into)
            })
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{AclOperation, AclPermission, AclResourceType, PatternType};

    fn binding(resource: &str, principal: &str) -> AclBinding {
        AclBinding {
            pattern: ResourcePattern {
                resource_type: AclResourceType::Topic,
                name: resource.to_string(),
                pattern_type: PatternType::Literal,
            },
            entry: AccessControlEntry {
                principal: principal.to_string(),
                host: "*".to_string(),
                operation: AclOperation::Read,
                permission: AclPermission::Allow,
            },
        }
    }

    #[test]
    fn acl_grouping_preserves_first_seen_pattern_order() {
        let mut groups = GroupedAcls::new();
        group_acl(&mut groups, &binding("beta", "alice"));
        group_acl(&mut groups, &binding("alpha", "bob"));
        group_acl(&mut groups, &binding("beta", "carol"));

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.name, "beta");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0.name, "alpha");
        assert_eq!(groups[1].1.len(), 1);
    }
}

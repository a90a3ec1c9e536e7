//! Structure resolution: which nodes must be re-sent for a change.
//!
//! Every change event is turned into the set of structure nodes whose
//! downstream representation might change. The resolver never drops a
//! placement; when in doubt it over-includes, since document building
//! downstream is keyed by node and idempotent.

use crate::error::{SyncError, SyncResult};
use crate::repository::StructureRepository;
use chansync_protocol::{ChangeEvent, EntityId, StructureNode};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Resolves change events into structure nodes.
pub struct StructureResolver<R: StructureRepository> {
    repository: Arc<R>,
}

impl<R: StructureRepository> StructureResolver<R> {
    /// Creates a resolver reading from `repository`.
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Returns the repository.
    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Resolves the nodes affected by `event`.
    pub fn resolve(&self, event: &ChangeEvent) -> SyncResult<Vec<StructureNode>> {
        let nodes = match event {
            ChangeEvent::Publish { channel_id } => self.channel_structure(*channel_id)?,
            ChangeEvent::EntityAdded {
                channel_id,
                entity_id,
            } => self.entity_added(*channel_id, *entity_id)?,
            ChangeEvent::EntityUpdated {
                channel_id,
                entity_id,
                ..
            }
            | ChangeEvent::EntityDeleted {
                channel_id,
                entity_id,
            } => self.existing_placements(*channel_id, *entity_id)?,
            ChangeEvent::LinkAdded(link) => self.link_added(link.channel_id, link.target_id)?,
            ChangeEvent::LinkUpdated(link) => {
                self.link_updated(link.channel_id, link.source_id, link.target_id)?
            }
            ChangeEvent::LinkDeleted(link) => {
                self.existing_placements(link.channel_id, link.target_id)?
            }
        };

        debug!(kind = %event.kind(), nodes = nodes.len(), "structure resolved");
        Ok(nodes)
    }

    /// Every node of the channel.
    pub fn channel_structure(&self, channel_id: EntityId) -> SyncResult<Vec<StructureNode>> {
        self.repository.all_structure_entities_from_path(&[channel_id])
    }

    /// Existing placements of an entity, without any expansion.
    pub fn existing_placements(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
    ) -> SyncResult<Vec<StructureNode>> {
        self.repository
            .entities_for_entity_in_channel(channel_id, entity_id)
    }

    /// Nodes for a newly added entity.
    ///
    /// Parents of every placement, the placements themselves, and the
    /// descendants below every placement. Children reached through links
    /// are expanded one more level, since link targets are catalog nodes
    /// in their own right.
    pub fn entity_added(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
    ) -> SyncResult<Vec<StructureNode>> {
        let placements = self
            .repository
            .entities_for_entity_in_channel(channel_id, entity_id)?;

        let mut nodes = Vec::new();
        for placement in &placements {
            match self.repository.parent_of(
                channel_id,
                placement.parent_id,
                placement.entity_id,
                &placements,
            )? {
                Some(parent) => nodes.push(parent),
                None => debug!(placement = %placement, "placement has no parent node"),
            }
        }

        nodes.extend(placements.iter().cloned());

        for placement in &placements {
            let children = self
                .repository
                .children_in_channel(placement.entity_id, &placement.path)?;
            for child in &children {
                nodes.extend(
                    self.repository
                        .children_in_channel(child.entity_id, &child.path)?,
                );
            }
            nodes.extend(children);
        }

        Ok(nodes)
    }

    /// Nodes for a link added towards `target_id`.
    ///
    /// Walks every placement of the target from leaf to root and re-fetches
    /// each `(entity, parent)` edge so the full ancestor chain surfaces,
    /// then pulls the structure anchored at each placement. Those nodes are
    /// deduplicated by entity; the target placements are appended after
    /// that with their multiplicity intact.
    pub fn link_added(
        &self,
        channel_id: EntityId,
        target_id: EntityId,
    ) -> SyncResult<Vec<StructureNode>> {
        let placements = self
            .repository
            .entities_for_entity_in_channel(channel_id, target_id)?;

        let mut related = Vec::new();
        for placement in &placements {
            for (entity_id, parent_id) in placement.ancestor_pairs() {
                related.extend(self.repository.all_structure_entities_with_parent(
                    channel_id, entity_id, parent_id,
                )?);
            }
        }

        for placement in &placements {
            related.extend(
                self.repository
                    .all_structure_entities_from_path(&placement.path)?,
            );
        }

        let mut nodes = deduplicated_ancestors(related);
        nodes.extend(placements_with_multiplicity(&placements));
        Ok(nodes)
    }

    /// Nodes for an updated link from `source_id` to `target_id`.
    ///
    /// The source's placement above the target, plus everything below it.
    /// A link update without a resolvable parent placement is an error.
    pub fn link_updated(
        &self,
        channel_id: EntityId,
        source_id: EntityId,
        target_id: EntityId,
    ) -> SyncResult<Vec<StructureNode>> {
        let target_nodes = self
            .repository
            .all_structure_entities_with_parent(channel_id, target_id, source_id)?;

        let parent = self
            .repository
            .parent_of(channel_id, source_id, target_id, &target_nodes)?
            .ok_or_else(|| {
                SyncError::StructureResolution(format!(
                    "can't find parent structure entity {} with target entity id {}",
                    source_id, target_id
                ))
            })?;

        let children = self
            .repository
            .children_in_channel(parent.entity_id, &parent.path)?;

        let mut nodes = Vec::with_capacity(children.len() + 1);
        nodes.push(parent);
        nodes.extend(children);
        Ok(nodes)
    }
}

/// Keeps the first node seen for each entity, in order.
pub fn deduplicated_ancestors(nodes: Vec<StructureNode>) -> Vec<StructureNode> {
    let mut seen = HashSet::new();
    nodes
        .into_iter()
        .filter(|node| seen.insert(node.entity_id))
        .collect()
}

/// Placements exactly as found, one node per structural position.
pub fn placements_with_multiplicity(placements: &[StructureNode]) -> Vec<StructureNode> {
    placements.to_vec()
}

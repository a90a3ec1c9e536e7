//! Access to the channel structure of the source system.

use crate::error::SyncResult;
use chansync_protocol::{EntityId, StructureNode};
use parking_lot::RwLock;

/// Read access to the structure of a channel.
///
/// Implementations talk to the source system; the engine only reads.
pub trait StructureRepository: Send + Sync {
    /// Every placement of `entity_id` inside the channel.
    fn entities_for_entity_in_channel(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
    ) -> SyncResult<Vec<StructureNode>>;

    /// The placement of `parent_id` that `entity_id` hangs under, looking
    /// only at the placements of `entity_id` given in `within`.
    fn parent_of(
        &self,
        channel_id: EntityId,
        parent_id: EntityId,
        entity_id: EntityId,
        within: &[StructureNode],
    ) -> SyncResult<Option<StructureNode>>;

    /// Every node strictly below `path` (the full descendant closure).
    fn children_in_channel(
        &self,
        entity_id: EntityId,
        path: &[EntityId],
    ) -> SyncResult<Vec<StructureNode>>;

    /// Placements of `entity_id` directly under `parent_id`.
    fn all_structure_entities_with_parent(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
        parent_id: EntityId,
    ) -> SyncResult<Vec<StructureNode>>;

    /// The node at `path` and every node below it.
    fn all_structure_entities_from_path(&self, path: &[EntityId]) -> SyncResult<Vec<StructureNode>>;
}

/// An in-memory structure repository.
///
/// Holds a flat list of placements; used by tests and by hosts that
/// snapshot the channel structure up front.
#[derive(Debug, Default)]
pub struct MemoryStructureRepository {
    nodes: RwLock<Vec<StructureNode>>,
}

impl MemoryStructureRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository holding `nodes`.
    pub fn with_nodes(nodes: Vec<StructureNode>) -> Self {
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Adds a placement.
    pub fn insert(&self, node: StructureNode) {
        self.nodes.write().push(node);
    }

    /// Number of placements held.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Returns true if no placements are held.
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    fn select(&self, predicate: impl Fn(&StructureNode) -> bool) -> Vec<StructureNode> {
        self.nodes
            .read()
            .iter()
            .filter(|node| predicate(node))
            .cloned()
            .collect()
    }
}

impl StructureRepository for MemoryStructureRepository {
    fn entities_for_entity_in_channel(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
    ) -> SyncResult<Vec<StructureNode>> {
        Ok(self.select(|node| {
            node.entity_id == entity_id && node.channel_id() == Some(channel_id)
        }))
    }

    fn parent_of(
        &self,
        channel_id: EntityId,
        parent_id: EntityId,
        entity_id: EntityId,
        within: &[StructureNode],
    ) -> SyncResult<Option<StructureNode>> {
        let Some(child) = within
            .iter()
            .find(|node| node.entity_id == entity_id && node.parent_id == parent_id)
        else {
            return Ok(None);
        };

        let parent_path = child.parent_path();
        Ok(self
            .nodes
            .read()
            .iter()
            .find(|node| {
                node.entity_id == parent_id
                    && node.channel_id() == Some(channel_id)
                    && node.path == parent_path
            })
            .cloned())
    }

    fn children_in_channel(
        &self,
        _entity_id: EntityId,
        path: &[EntityId],
    ) -> SyncResult<Vec<StructureNode>> {
        Ok(self.select(|node| node.is_below(path)))
    }

    fn all_structure_entities_with_parent(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
        parent_id: EntityId,
    ) -> SyncResult<Vec<StructureNode>> {
        Ok(self.select(|node| {
            node.entity_id == entity_id
                && node.parent_id == parent_id
                && node.channel_id() == Some(channel_id)
        }))
    }

    fn all_structure_entities_from_path(&self, path: &[EntityId]) -> SyncResult<Vec<StructureNode>> {
        Ok(self.select(|node| node.is_at_or_below(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(path: &[EntityId], entity_type: &str) -> StructureNode {
        StructureNode::new(path.to_vec(), entity_type).unwrap()
    }

    /// Channel 1 with node 5, product 9 under it, item 20 under the
    /// product, and item 20 linked a second time under product 30.
    fn repository() -> MemoryStructureRepository {
        MemoryStructureRepository::with_nodes(vec![
            node(&[1], "Channel"),
            node(&[1, 5], "ChannelNode"),
            node(&[1, 5, 9], "Product"),
            node(&[1, 5, 9, 20], "Item"),
            node(&[1, 5, 30], "Product"),
            node(&[1, 5, 30, 20], "Item"),
        ])
    }

    #[test]
    fn placements_of_entity() {
        let repo = repository();
        let placements = repo.entities_for_entity_in_channel(1, 20).unwrap();
        assert_eq!(placements.len(), 2);
        assert!(repo.entities_for_entity_in_channel(2, 20).unwrap().is_empty());
    }

    #[test]
    fn parent_lookup() {
        let repo = repository();
        let placements = repo.entities_for_entity_in_channel(1, 20).unwrap();

        let parent = repo.parent_of(1, 30, 20, &placements).unwrap().unwrap();
        assert_eq!(parent.path, vec![1, 5, 30]);

        assert!(repo.parent_of(1, 77, 20, &placements).unwrap().is_none());
    }

    #[test]
    fn descendants() {
        let repo = repository();
        let children = repo.children_in_channel(5, &[1, 5]).unwrap();
        assert_eq!(children.len(), 4);

        let from_path = repo.all_structure_entities_from_path(&[1, 5, 9]).unwrap();
        assert_eq!(from_path.len(), 2);
        assert_eq!(from_path[0].entity_id, 9);
    }

    #[test]
    fn with_parent() {
        let repo = repository();
        let found = repo.all_structure_entities_with_parent(1, 20, 9).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, vec![1, 5, 9, 20]);
    }

    #[test]
    fn insert_and_len() {
        let repo = MemoryStructureRepository::new();
        assert!(repo.is_empty());
        repo.insert(node(&[1], "Channel"));
        assert_eq!(repo.len(), 1);
    }
}

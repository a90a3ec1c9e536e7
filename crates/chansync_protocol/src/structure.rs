//! Structure nodes: placements of entities inside a channel tree.

use crate::error::{ProtocolError, ProtocolResult};
use std::fmt;

/// Identifier of an entity in the source system.
pub type EntityId = u32;

/// One placement of an entity at a specific path within a channel.
///
/// The same entity may be placed under several paths when it is reached
/// through more than one link. Each placement is a distinct node.
///
/// `path` runs from the channel root to the node itself, inclusive, so
/// `path.first()` is the channel id and `path.last()` is `entity_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructureNode {
    /// The placed entity.
    pub entity_id: EntityId,
    /// The entity this placement hangs under.
    pub parent_id: EntityId,
    /// Root-to-node chain of entity ids.
    pub path: Vec<EntityId>,
    /// Entity type of the placed entity (`Product`, `Item`, `Resource`, ...).
    pub entity_type_id: String,
    /// Link type connecting the node to its parent, if any.
    pub link_type_id: Option<String>,
}

impl StructureNode {
    /// Creates a node from its root-to-node path.
    ///
    /// The entity id is the last path element and the parent id the one
    /// before it. A single-element path is the channel root, its own parent.
    pub fn new(path: Vec<EntityId>, entity_type_id: impl Into<String>) -> ProtocolResult<Self> {
        let entity_id = *path.last().ok_or_else(|| ProtocolError::InvalidPath {
            path: String::new(),
        })?;
        let parent_id = if path.len() > 1 {
            path[path.len() - 2]
        } else {
            entity_id
        };

        Ok(Self {
            entity_id,
            parent_id,
            path,
            entity_type_id: entity_type_id.into(),
            link_type_id: None,
        })
    }

    /// Sets the link type.
    pub fn with_link_type(mut self, link_type_id: impl Into<String>) -> Self {
        self.link_type_id = Some(link_type_id.into());
        self
    }

    /// Returns the channel this node belongs to.
    pub fn channel_id(&self) -> Option<EntityId> {
        self.path.first().copied()
    }

    /// Returns the path of the parent placement.
    pub fn parent_path(&self) -> &[EntityId] {
        &self.path[..self.path.len().saturating_sub(1)]
    }

    /// Returns true if this node sits strictly below `path`.
    pub fn is_below(&self, path: &[EntityId]) -> bool {
        self.path.len() > path.len() && self.path.starts_with(path)
    }

    /// Returns true if this node is at `path` or below it.
    pub fn is_at_or_below(&self, path: &[EntityId]) -> bool {
        self.path.starts_with(path)
    }

    /// Adjacent `(entity, parent)` pairs of the path, walking leaf to root.
    ///
    /// For `1/5/9/20` this yields `(20, 9)`, `(9, 5)` and `(5, 1)`.
    pub fn ancestor_pairs(&self) -> impl Iterator<Item = (EntityId, EntityId)> + '_ {
        self.path.windows(2).rev().map(|pair| (pair[1], pair[0]))
    }

    /// Returns true if the node's entity type matches `type_id`.
    pub fn is_type(&self, type_id: &str) -> bool {
        self.entity_type_id == type_id
    }
}

impl fmt::Display for StructureNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_path(&self.path))
    }
}

/// Formats a path in its slash-separated text form.
pub fn format_path(path: &[EntityId]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parses the slash-separated text form of a path.
pub fn parse_path(text: &str) -> ProtocolResult<Vec<EntityId>> {
    let trimmed = text.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(ProtocolError::InvalidPath { path: text.into() });
    }

    trimmed
        .split('/')
        .map(|segment| {
            segment.parse::<EntityId>().map_err(|_| ProtocolError::InvalidPath {
                path: text.into(),
            })
        })
        .collect()
}

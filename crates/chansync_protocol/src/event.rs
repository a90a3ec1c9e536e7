//! Change events dispatched into the sync engine.

use crate::structure::EntityId;
use std::fmt;

/// A change to a channel that must be reflected downstream.
///
/// One event is handled per pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Full export of the channel.
    Publish {
        /// Channel being published.
        channel_id: EntityId,
    },
    /// An entity was added to the channel.
    EntityAdded {
        /// Channel the entity was added to.
        channel_id: EntityId,
        /// The added entity.
        entity_id: EntityId,
    },
    /// An entity in the channel was updated.
    EntityUpdated {
        /// Channel containing the entity.
        channel_id: EntityId,
        /// The updated entity.
        entity_id: EntityId,
        /// Names of the fields that changed, when known.
        changed_fields: Vec<String>,
    },
    /// An entity was removed from the channel.
    EntityDeleted {
        /// Channel the entity was removed from.
        channel_id: EntityId,
        /// The removed entity.
        entity_id: EntityId,
    },
    /// A link was added between two entities.
    LinkAdded(LinkChange),
    /// A link between two entities was updated.
    LinkUpdated(LinkChange),
    /// A link between two entities was removed.
    LinkDeleted(LinkChange),
}

/// Payload shared by the three link events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkChange {
    /// Channel containing the link.
    pub channel_id: EntityId,
    /// Source (parent side) of the link.
    pub source_id: EntityId,
    /// Target (child side) of the link.
    pub target_id: EntityId,
    /// Link type.
    pub link_type_id: Option<String>,
    /// Link entity carried by the link, if any.
    pub link_entity_id: Option<EntityId>,
}

impl LinkChange {
    /// Creates a link change without link type or link entity.
    pub fn new(channel_id: EntityId, source_id: EntityId, target_id: EntityId) -> Self {
        Self {
            channel_id,
            source_id,
            target_id,
            link_type_id: None,
            link_entity_id: None,
        }
    }

    /// Sets the link type.
    pub fn with_link_type(mut self, link_type_id: impl Into<String>) -> Self {
        self.link_type_id = Some(link_type_id.into());
        self
    }

    /// Sets the link entity.
    pub fn with_link_entity(mut self, link_entity_id: EntityId) -> Self {
        self.link_entity_id = Some(link_entity_id);
        self
    }
}

/// The kind of a [`ChangeEvent`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`ChangeEvent::Publish`].
    Publish,
    /// See [`ChangeEvent::EntityAdded`].
    EntityAdded,
    /// See [`ChangeEvent::EntityUpdated`].
    EntityUpdated,
    /// See [`ChangeEvent::EntityDeleted`].
    EntityDeleted,
    /// See [`ChangeEvent::LinkAdded`].
    LinkAdded,
    /// See [`ChangeEvent::LinkUpdated`].
    LinkUpdated,
    /// See [`ChangeEvent::LinkDeleted`].
    LinkDeleted,
}

impl EventKind {
    /// Returns true for events that remove something downstream.
    pub fn is_delete(&self) -> bool {
        matches!(self, EventKind::EntityDeleted | EventKind::LinkDeleted)
    }

    /// Name used in logs and remote completion notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Publish => "Publish",
            EventKind::EntityAdded => "EntityAdded",
            EventKind::EntityUpdated => "EntityUpdated",
            EventKind::EntityDeleted => "EntityDeleted",
            EventKind::LinkAdded => "LinkAdded",
            EventKind::LinkUpdated => "LinkUpdated",
            EventKind::LinkDeleted => "LinkDeleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChangeEvent {
    /// Creates an update event from the comma-separated changed-field list
    /// the source system delivers.
    pub fn entity_updated(channel_id: EntityId, entity_id: EntityId, fields: Option<&str>) -> Self {
        ChangeEvent::EntityUpdated {
            channel_id,
            entity_id,
            changed_fields: fields.map(split_field_list).unwrap_or_default(),
        }
    }

    /// Returns the event kind.
    pub fn kind(&self) -> EventKind {
        match self {
            ChangeEvent::Publish { .. } => EventKind::Publish,
            ChangeEvent::EntityAdded { .. } => EventKind::EntityAdded,
            ChangeEvent::EntityUpdated { .. } => EventKind::EntityUpdated,
            ChangeEvent::EntityDeleted { .. } => EventKind::EntityDeleted,
            ChangeEvent::LinkAdded(_) => EventKind::LinkAdded,
            ChangeEvent::LinkUpdated(_) => EventKind::LinkUpdated,
            ChangeEvent::LinkDeleted(_) => EventKind::LinkDeleted,
        }
    }

    /// Returns the channel the event belongs to.
    pub fn channel_id(&self) -> EntityId {
        match self {
            ChangeEvent::Publish { channel_id }
            | ChangeEvent::EntityAdded { channel_id, .. }
            | ChangeEvent::EntityUpdated { channel_id, .. }
            | ChangeEvent::EntityDeleted { channel_id, .. } => *channel_id,
            ChangeEvent::LinkAdded(link)
            | ChangeEvent::LinkUpdated(link)
            | ChangeEvent::LinkDeleted(link) => link.channel_id,
        }
    }

    /// Returns the entity the event originates from.
    ///
    /// For link events this is the link source; for `Publish` the channel.
    pub fn source_entity_id(&self) -> EntityId {
        match self {
            ChangeEvent::Publish { channel_id } => *channel_id,
            ChangeEvent::EntityAdded { entity_id, .. }
            | ChangeEvent::EntityUpdated { entity_id, .. }
            | ChangeEvent::EntityDeleted { entity_id, .. } => *entity_id,
            ChangeEvent::LinkAdded(link)
            | ChangeEvent::LinkUpdated(link)
            | ChangeEvent::LinkDeleted(link) => link.source_id,
        }
    }

    /// Returns the link target for link events.
    pub fn target_entity_id(&self) -> Option<EntityId> {
        match self {
            ChangeEvent::LinkAdded(link)
            | ChangeEvent::LinkUpdated(link)
            | ChangeEvent::LinkDeleted(link) => Some(link.target_id),
            _ => None,
        }
    }

    /// Returns true if an update event lists `field` among its changes.
    pub fn changed(&self, field: &str) -> bool {
        match self {
            ChangeEvent::EntityUpdated { changed_fields, .. } => {
                changed_fields.iter().any(|f| f == field)
            }
            _ => false,
        }
    }
}

fn split_field_list(fields: &str) -> Vec<String> {
    fields
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(String::from)
        .collect()
}

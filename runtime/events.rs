/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EntityId, EntitySnapshot, LoadStatus, WindowId, WindowKind};

/// Lifecycle signal pushed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    WindowCreated {
        window_id: WindowId,
        kind: WindowKind,
    },
    WindowRemoved {
        window_id: WindowId,
    },
    EntityRemoved {
        entity_id: EntityId,
        window_id: WindowId,
        /// Set when the removal is part of the owning window closing.
        window_closing: bool,
    },
    /// The runtime swapped `removed` for `added` while keeping the same
    /// logical entity (prerender commit, discard/reload).
    EntityReplaced {
        added: EntityId,
        removed: EntityId,
    },
    EntityUpdated {
        entity_id: EntityId,
        change: EntityChange,
        entity: EntitySnapshot,
    },
    EntityMoved {
        entity_id: EntityId,
        window_id: WindowId,
        from_index: usize,
        to_index: usize,
    },
}

/// Fields that changed in an [`RuntimeEvent::EntityUpdated`]. Absent fields
/// did not change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityChange {
    pub status: Option<LoadStatus>,
    pub pinned: Option<bool>,
}

impl EntityChange {
    pub fn load_complete() -> Self {
        Self {
            status: Some(LoadStatus::Complete),
            ..Self::default()
        }
    }

    pub fn pinned(pinned: bool) -> Self {
        Self {
            pinned: Some(pinned),
            ..Self::default()
        }
    }
}

/// Request posted by content running inside a managed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentRequest {
    /// Close this entity without auto-restore, keep it in the desired set.
    CloseOnce,
    /// Close this entity and drop its origin URL from the desired set.
    CloseAndRemove,
}

impl ContentRequest {
    /// Parse a content-origin message; unknown or malformed payloads yield `None`.
    pub fn from_message(message: &Value) -> Option<Self> {
        match serde_json::from_value(message.clone()) {
            Ok(request) => Some(request),
            Err(e) => {
                log::debug!("runtime: ignoring content message {message} ({e})");
                None
            },
        }
    }
}

/// Commands arriving from UI collaborators (toolbar action, keyboard
/// shortcut, context menus, in-page messages).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    /// Project the desired set onto the last focused normal window.
    ApplyDesiredSet,
    AllowCloseOnce {
        entity_id: EntityId,
    },
    ResetToOrigin {
        entity_id: EntityId,
    },
    Content {
        entity_id: EntityId,
        request: ContentRequest,
    },
}

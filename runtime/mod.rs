/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Boundary to the live browser runtime.
//!
//! The runtime owns windows and the entities (tabs) inside them. It creates,
//! destroys and renumbers entity handles on its own; this crate only observes
//! those transitions through [`RuntimeEvent`] and issues commands through the
//! [`Runtime`] trait.

pub mod events;
#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use events::{ContentRequest, EntityChange, InboundCommand, RuntimeEvent};

/// Ephemeral runtime handle for one instantiation of an entity.
///
/// Valid only until the runtime recreates or replaces the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Runtime handle for a session window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window#{}", self.0)
    }
}

/// Kind of session window. Only `Normal` windows carry a managed pinned row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowKind {
    Normal,
    Popup,
    App,
    DevTools,
}

/// Load status reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoadStatus {
    #[default]
    Loading,
    Complete,
}

/// Point-in-time view of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub window_id: WindowId,
    /// Position inside the window's entity row (0-based).
    pub index: usize,
    /// Committed address, if any.
    pub url: Option<String>,
    /// Provisional address while a navigation is still loading.
    pub pending_url: Option<String>,
    pub pinned: bool,
    pub status: LoadStatus,
}

impl EntitySnapshot {
    /// Address used for matching against the desired set: the provisional
    /// address wins while a load is still in flight.
    pub fn effective_url(&self) -> Option<&str> {
        self.pending_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .or_else(|| self.url.as_deref().filter(|url| !url.is_empty()))
    }
}

/// Arguments for [`Runtime::create_entity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateEntity {
    pub window_id: WindowId,
    pub url: String,
    pub pinned: bool,
    pub active: bool,
    pub index: usize,
}

/// Filter for [`Runtime::query_entities`]. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityQuery {
    pub window_id: Option<WindowId>,
    pub pinned: Option<bool>,
}

impl EntityQuery {
    pub fn window(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            pinned: None,
        }
    }

    pub fn pinned_in(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            pinned: Some(true),
        }
    }

    pub fn matches(&self, entity: &EntitySnapshot) -> bool {
        self.window_id.is_none_or(|w| w == entity.window_id)
            && self.pinned.is_none_or(|p| p == entity.pinned)
    }
}

/// One-shot "this entity was restored" notice delivered into a recreated entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "managed-entity-restored", rename_all = "camelCase")]
pub struct RestoreNotice {
    pub origin_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("{0} no longer exists")]
    EntityMissing(EntityId),
    #[error("{0} no longer exists")]
    WindowMissing(WindowId),
    #[error("no focused window of kind {0:?}")]
    NoFocusedWindow(WindowKind),
    #[error("runtime rejected command: {0}")]
    Rejected(String),
    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

/// Commands the reconciliation engine may issue against the live runtime.
///
/// Every call may fail at any time because the runtime mutates windows and
/// entities outside this crate's control. Callers treat a failure as "this
/// step did not happen" and move on.
#[async_trait]
pub trait Runtime: Send + Sync {
    async fn create_entity(&self, create: CreateEntity) -> Result<EntitySnapshot, RuntimeError>;

    async fn move_entity(&self, id: EntityId, index: usize) -> Result<(), RuntimeError>;

    async fn set_pinned(&self, id: EntityId, pinned: bool) -> Result<(), RuntimeError>;

    async fn navigate(&self, id: EntityId, url: &str) -> Result<(), RuntimeError>;

    async fn remove_entities(&self, ids: &[EntityId]) -> Result<(), RuntimeError>;

    /// Entities matching `query`, ordered by window then index.
    async fn query_entities(&self, query: EntityQuery) -> Result<Vec<EntitySnapshot>, RuntimeError>;

    async fn get_entity(&self, id: EntityId) -> Result<EntitySnapshot, RuntimeError>;

    async fn last_focused_window(&self, kind: WindowKind) -> Result<WindowId, RuntimeError>;

    async fn deliver_notice(&self, id: EntityId, notice: &RestoreNotice) -> Result<(), RuntimeError>;

    /// Outward-facing indicator for `id`; `None` clears it.
    async fn set_badge(&self, id: EntityId, text: Option<&str>) -> Result<(), RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(url: Option<&str>, pending_url: Option<&str>) -> EntitySnapshot {
        EntitySnapshot {
            id: EntityId(1),
            window_id: WindowId(1),
            index: 0,
            url: url.map(str::to_string),
            pending_url: pending_url.map(str::to_string),
            pinned: true,
            status: LoadStatus::Loading,
        }
    }

    #[test]
    fn effective_url_prefers_pending_address() {
        let entity = snapshot(Some("https://old.example"), Some("https://new.example"));
        assert_eq!(entity.effective_url(), Some("https://new.example"));
    }

    #[test]
    fn effective_url_ignores_empty_addresses() {
        assert_eq!(snapshot(Some(""), Some("")).effective_url(), None);
        assert_eq!(
            snapshot(Some("https://a.example"), Some("")).effective_url(),
            Some("https://a.example")
        );
    }

    #[test]
    fn query_matches_window_and_pin_state() {
        let entity = snapshot(Some("https://a.example"), None);
        assert!(EntityQuery::default().matches(&entity));
        assert!(EntityQuery::pinned_in(WindowId(1)).matches(&entity));
        assert!(!EntityQuery::pinned_in(WindowId(2)).matches(&entity));
        assert!(
            !EntityQuery {
                window_id: None,
                pinned: Some(false),
            }
            .matches(&entity)
        );
    }

    #[test]
    fn restore_notice_serializes_with_type_tag() {
        let notice = RestoreNotice {
            origin_url: "https://a.example".to_string(),
        };
        let value = serde_json::to_value(&notice).expect("notice should serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "type": "managed-entity-restored",
                "originUrl": "https://a.example",
            })
        );
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::HashMap;

use crate::runtime::EntityId;

/// Result of [`ProtectionRegistry::tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagChange {
    Inserted,
    Replaced,
    Unchanged,
}

/// Which live entities are under management, and the desired URL each one
/// stands for.
///
/// An entry exists iff the entity's disappearance should trigger recreation
/// (unless overridden). The entity handle is ephemeral; the origin URL is
/// the stable key.
#[derive(Debug, Default)]
pub struct ProtectionRegistry {
    origins: HashMap<EntityId, String>,
}

impl ProtectionRegistry {
    pub fn tag(&mut self, id: EntityId, origin_url: &str) -> TagChange {
        match self.origins.get_mut(&id) {
            Some(existing) if existing == origin_url => TagChange::Unchanged,
            Some(existing) => {
                *existing = origin_url.to_string();
                TagChange::Replaced
            },
            None => {
                self.origins.insert(id, origin_url.to_string());
                TagChange::Inserted
            },
        }
    }

    /// Returns the origin URL the entry held, if any.
    pub fn untag(&mut self, id: EntityId) -> Option<String> {
        self.origins.remove(&id)
    }

    pub fn lookup(&self, id: EntityId) -> Option<&str> {
        self.origins.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

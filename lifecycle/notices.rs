/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::HashMap;

use crate::runtime::EntityId;

/// Pending "this was auto-restored" notices, keyed by the recreated entity
/// that should host the notice once its load completes.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: HashMap<EntityId, String>,
}

impl NotificationQueue {
    /// At most one notice per entity; a later enqueue replaces the origin.
    pub fn enqueue(&mut self, id: EntityId, origin_url: &str) {
        self.pending.insert(id, origin_url.to_string());
    }

    /// Dequeue; the notice is gone whether or not it is delivered.
    pub fn take(&mut self, id: EntityId) -> Option<String> {
        self.pending.remove(&id)
    }

    pub fn is_pending(&self, id: EntityId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

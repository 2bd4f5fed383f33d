/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Reconciliation and protection engine.
//!
//! [`Reconciler`] owns the process-local bookkeeping ([`LifecycleBook`]) and
//! the handles to the runtime and the pin store. Window projection lives in
//! [`window_projector`], the event-driven control loop in
//! [`event_reconciler`].
//!
//! Bookkeeping is mutated synchronously between suspension points and the
//! book's lock is never held across an `.await`.

pub mod event_reconciler;
pub mod notices;
pub mod overrides;
pub mod protection;
pub mod window_locks;
pub mod window_projector;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::RepinConfig;
use crate::persistence::{PinSetWriter, PinStore};
use crate::runtime::{EntityId, Runtime};
use crate::services::address::AddressPolicy;

pub use event_reconciler::{
    CommandOutcome, EventOutcome, NoticeOutcome, PinChangeOutcome, RemovalOutcome,
    ReorderOutcome, ReplaceOutcome,
};
pub use notices::NotificationQueue;
pub use overrides::{OverrideLedger, PinEchoLedger};
pub use protection::{ProtectionRegistry, TagChange};
pub use window_locks::{WindowGuard, WindowLocks};
pub use window_projector::ProjectionReport;

/// In-memory state consulted and mutated by every handler. Never persisted.
#[derive(Debug, Default)]
pub struct LifecycleBook {
    pub protection: ProtectionRegistry,
    pub overrides: OverrideLedger,
    pub notices: NotificationQueue,
    pub pin_echoes: PinEchoLedger,
}

impl LifecycleBook {
    /// Drop every trace of an entity that no longer exists.
    fn forget(&mut self, id: EntityId) {
        self.protection.untag(id);
        self.overrides.consume(id);
        self.notices.take(id);
        self.pin_echoes.consume(id);
    }
}

pub struct Reconciler {
    runtime: Arc<dyn Runtime>,
    store: Arc<dyn PinStore>,
    writer: PinSetWriter,
    book: Mutex<LifecycleBook>,
    window_locks: WindowLocks,
    addresses: AddressPolicy,
    badge_text: String,
}

impl Reconciler {
    pub fn new(
        runtime: Arc<dyn Runtime>,
        store: Arc<dyn PinStore>,
        writer: PinSetWriter,
        config: &RepinConfig,
    ) -> Self {
        Self {
            runtime,
            store,
            writer,
            book: Mutex::new(LifecycleBook::default()),
            window_locks: WindowLocks::default(),
            addresses: AddressPolicy::from_config(config),
            badge_text: config.badge_text.clone(),
        }
    }

    pub fn origin_of(&self, id: EntityId) -> Option<String> {
        self.book.lock().protection.lookup(id).map(str::to_string)
    }

    pub fn is_protected(&self, id: EntityId) -> bool {
        self.book.lock().protection.lookup(id).is_some()
    }

    pub fn protected_count(&self) -> usize {
        self.book.lock().protection.len()
    }

    pub fn has_override(&self, id: EntityId) -> bool {
        self.book.lock().overrides.is_granted(id)
    }

    pub fn has_pending_notice(&self, id: EntityId) -> bool {
        self.book.lock().notices.is_pending(id)
    }

    pub fn pending_notice_count(&self) -> usize {
        self.book.lock().notices.len()
    }

    pub fn tracked_window_count(&self) -> usize {
        self.window_locks.len()
    }

    /// Tag `id` and show the indicator when the entry changed.
    async fn protect(&self, id: EntityId, origin_url: &str) {
        let change = self.book.lock().protection.tag(id, origin_url);
        if change != TagChange::Unchanged {
            self.show_badge(id).await;
        }
    }

    /// Untag a live entity and clear its indicator.
    async fn unprotect(&self, id: EntityId) {
        let removed = self.book.lock().protection.untag(id);
        if removed.is_some() {
            self.clear_badge(id).await;
        }
    }

    async fn show_badge(&self, id: EntityId) {
        if let Err(e) = self.runtime.set_badge(id, Some(&self.badge_text)).await {
            log::debug!("lifecycle: badge for {id} not shown ({e})");
        }
    }

    async fn clear_badge(&self, id: EntityId) {
        if let Err(e) = self.runtime.set_badge(id, None).await {
            log::debug!("lifecycle: badge for {id} not cleared ({e})");
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("book", &*self.book.lock())
            .field("window_locks", &self.window_locks)
            .field("addresses", &self.addresses)
            .finish_non_exhaustive()
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Event-driven control loop.
//!
//! Each runtime event or inbound command is handled on its own. Handlers
//! never fail: external failures are logged and reported through the
//! returned outcome, and every path that drops an entity also drops its
//! bookkeeping so no stale protection can trigger a later recreation.

use crate::persistence::{Settings, load_desired_set};
use crate::runtime::{
    ContentRequest, CreateEntity, EntityId, EntityQuery, EntitySnapshot, InboundCommand,
    LoadStatus, RestoreNotice, RuntimeEvent, WindowId, WindowKind,
};

use super::{ProjectionReport, Reconciler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Projected(ProjectionReport),
    Ignored,
    Removal(RemovalOutcome),
    Replacement(ReplaceOutcome),
    Updated {
        notice: Option<NoticeOutcome>,
        pin: Option<PinChangeOutcome>,
    },
    Reorder(ReorderOutcome),
    WindowForgotten,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// Part of a window teardown; bookkeeping dropped, nothing recreated.
    WindowClosing,
    OverrideConsumed,
    Untracked,
    Restored { new_id: EntityId, index: usize },
    RestoreFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Untracked,
    Transferred { origin_url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeOutcome {
    NotPending,
    /// The resolved address cannot host a notice.
    Dropped,
    Delivered,
    DeliveryFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinChangeOutcome {
    /// Auto-track is off and the entity was pinned.
    Ignored,
    Untagged,
    /// Unpin issued by the projector itself.
    Echo,
    Appended { url: String },
    AlreadyTracked,
    Removed { url: String },
    StoreFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderOutcome {
    Disabled,
    NotPinned,
    EntityGone,
    QueryFailed,
    Adopted,
    Unchanged,
    StoreFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Projected(ProjectionReport),
    NoWindow,
    OverrideGranted,
    Reset { origin_url: String },
    ResetFailed,
    NotManaged,
    Closed { removed_from_set: bool },
    CloseFailed,
}

impl Reconciler {
    pub async fn handle_event(&self, event: RuntimeEvent) -> EventOutcome {
        match event {
            RuntimeEvent::WindowCreated { window_id, kind } => {
                if kind != WindowKind::Normal {
                    log::debug!("reconciler: ignoring {kind:?} {window_id}");
                    return EventOutcome::Ignored;
                }
                EventOutcome::Projected(self.project_desired_set_onto(window_id).await)
            },
            RuntimeEvent::WindowRemoved { window_id } => {
                self.window_locks.forget(window_id);
                EventOutcome::WindowForgotten
            },
            RuntimeEvent::EntityRemoved {
                entity_id,
                window_id,
                window_closing,
            } => EventOutcome::Removal(
                self.on_entity_removed(entity_id, window_id, window_closing)
                    .await,
            ),
            RuntimeEvent::EntityReplaced { added, removed } => {
                EventOutcome::Replacement(self.on_entity_replaced(added, removed).await)
            },
            RuntimeEvent::EntityUpdated {
                entity_id,
                change,
                entity,
            } => {
                let notice = match change.status {
                    Some(LoadStatus::Complete) => Some(self.on_load_complete(entity_id, &entity).await),
                    _ => None,
                };
                let pin = match change.pinned {
                    Some(pinned) => Some(self.on_pin_changed(entity_id, pinned, &entity).await),
                    None => None,
                };
                if notice.is_none() && pin.is_none() {
                    return EventOutcome::Ignored;
                }
                EventOutcome::Updated { notice, pin }
            },
            RuntimeEvent::EntityMoved {
                entity_id,
                window_id,
                ..
            } => EventOutcome::Reorder(self.on_entity_moved(entity_id, window_id).await),
        }
    }

    pub async fn handle_command(&self, command: InboundCommand) -> CommandOutcome {
        match command {
            InboundCommand::ApplyDesiredSet => {
                let window_id = match self.runtime.last_focused_window(WindowKind::Normal).await {
                    Ok(window_id) => window_id,
                    Err(e) => {
                        log::warn!("reconciler: nothing to apply the desired set to ({e})");
                        return CommandOutcome::NoWindow;
                    },
                };
                let report = self.project_desired_set_onto(window_id).await;
                if report.desired_was_empty {
                    log::info!("reconciler: desired set is empty, nothing to restore");
                }
                CommandOutcome::Projected(report)
            },
            InboundCommand::AllowCloseOnce { entity_id } => {
                self.book.lock().overrides.grant_once(entity_id);
                self.unprotect(entity_id).await;
                log::debug!("reconciler: {entity_id} may close once");
                CommandOutcome::OverrideGranted
            },
            InboundCommand::ResetToOrigin { entity_id } => self.reset_to_origin(entity_id).await,
            InboundCommand::Content { entity_id, request } => {
                self.close_on_request(entity_id, request == ContentRequest::CloseAndRemove)
                    .await
            },
        }
    }

    async fn on_entity_removed(
        &self,
        id: EntityId,
        window_id: WindowId,
        window_closing: bool,
    ) -> RemovalOutcome {
        if window_closing {
            self.book.lock().forget(id);
            return RemovalOutcome::WindowClosing;
        }

        let origin_url = {
            let mut book = self.book.lock();
            if book.overrides.consume(id) {
                book.forget(id);
                log::debug!("reconciler: {id} closed with override");
                return RemovalOutcome::OverrideConsumed;
            }
            book.protection.lookup(id).map(str::to_string)
        };
        let Some(origin_url) = origin_url else {
            self.book.lock().forget(id);
            return RemovalOutcome::Untracked;
        };

        let outcome = self.restore(&origin_url, window_id).await;
        self.book.lock().forget(id);
        outcome
    }

    async fn restore(&self, origin_url: &str, window_id: WindowId) -> RemovalOutcome {
        let desired = load_desired_set(self.store.as_ref()).await;
        let index = desired
            .rank_of(origin_url)
            .map_or(0, |rank| rank.saturating_sub(1) as usize);

        let _row_guard = self.window_locks.acquire(window_id).await;
        let create = CreateEntity {
            window_id,
            url: origin_url.to_string(),
            pinned: true,
            active: true,
            index,
        };
        match self.runtime.create_entity(create).await {
            Ok(created) => {
                {
                    let mut book = self.book.lock();
                    book.protection.tag(created.id, origin_url);
                    book.notices.enqueue(created.id, origin_url);
                }
                self.show_badge(created.id).await;
                log::info!("reconciler: restored {origin_url} as {} at {index}", created.id);
                RemovalOutcome::Restored {
                    new_id: created.id,
                    index,
                }
            },
            Err(e) => {
                log::warn!("reconciler: failed to restore {origin_url} in {window_id} ({e})");
                RemovalOutcome::RestoreFailed
            },
        }
    }

    async fn on_entity_replaced(&self, added: EntityId, removed: EntityId) -> ReplaceOutcome {
        let origin_url = {
            let mut book = self.book.lock();
            if book.overrides.consume(removed) {
                book.overrides.grant_once(added);
            }
            if let Some(pending) = book.notices.take(removed) {
                book.notices.enqueue(added, &pending);
            }
            book.pin_echoes.consume(removed);
            let origin_url = book.protection.untag(removed);
            if let Some(origin_url) = &origin_url {
                book.protection.tag(added, origin_url);
            }
            origin_url
        };
        match origin_url {
            Some(origin_url) => {
                self.show_badge(added).await;
                log::debug!("reconciler: protection moved from {removed} to {added}");
                ReplaceOutcome::Transferred { origin_url }
            },
            None => ReplaceOutcome::Untracked,
        }
    }

    async fn on_load_complete(&self, id: EntityId, entity: &EntitySnapshot) -> NoticeOutcome {
        let Some(origin_url) = self.book.lock().notices.take(id) else {
            return NoticeOutcome::NotPending;
        };
        // A snapshot without any address is judged by the address it was
        // restored to.
        let address = entity.effective_url().unwrap_or(origin_url.as_str()).to_string();
        if !self.addresses.can_host_notice(&address) {
            log::debug!("reconciler: dropping restore notice for {id}, {address} cannot host it");
            return NoticeOutcome::Dropped;
        }
        match self
            .runtime
            .deliver_notice(id, &RestoreNotice { origin_url })
            .await
        {
            Ok(()) => NoticeOutcome::Delivered,
            Err(e) => {
                log::debug!("reconciler: restore notice for {id} at {address} not delivered ({e})");
                NoticeOutcome::DeliveryFailed
            },
        }
    }

    async fn on_pin_changed(
        &self,
        id: EntityId,
        pinned: bool,
        entity: &EntitySnapshot,
    ) -> PinChangeOutcome {
        if !pinned {
            let echo = self.book.lock().pin_echoes.consume(id);
            let origin_url = self.origin_of(id);
            self.unprotect(id).await;
            if echo {
                return PinChangeOutcome::Echo;
            }
            if !Settings::load(self.store.as_ref()).await.auto_track_pinned {
                return PinChangeOutcome::Untagged;
            }
            let Some(url) = origin_url.or_else(|| entity.effective_url().map(str::to_string))
            else {
                return PinChangeOutcome::Untagged;
            };
            return match self.writer.remove(&url).await {
                Ok(outcome) if outcome.changed => PinChangeOutcome::Removed { url },
                Ok(_) => PinChangeOutcome::Untagged,
                Err(e) => {
                    log::warn!("reconciler: failed to drop {url} from desired set ({e})");
                    PinChangeOutcome::StoreFailed
                },
            };
        }

        if !Settings::load(self.store.as_ref()).await.auto_track_pinned {
            return PinChangeOutcome::Ignored;
        }
        let Some(url) = entity.effective_url() else {
            return PinChangeOutcome::Ignored;
        };
        match self.writer.append(url).await {
            Ok(outcome) => {
                if outcome.set.contains(url) {
                    self.protect(id, url).await;
                }
                if outcome.changed {
                    PinChangeOutcome::Appended {
                        url: url.to_string(),
                    }
                } else {
                    PinChangeOutcome::AlreadyTracked
                }
            },
            Err(e) => {
                log::warn!("reconciler: failed to add {url} to desired set ({e})");
                PinChangeOutcome::StoreFailed
            },
        }
    }

    async fn on_entity_moved(&self, id: EntityId, window_id: WindowId) -> ReorderOutcome {
        if !Settings::load(self.store.as_ref()).await.auto_track_pinned {
            return ReorderOutcome::Disabled;
        }

        let _row_guard = self.window_locks.acquire(window_id).await;
        match self.runtime.get_entity(id).await {
            Ok(entity) if entity.pinned => {},
            Ok(_) => return ReorderOutcome::NotPinned,
            Err(e) => {
                log::debug!("reconciler: moved {id} is gone ({e})");
                return ReorderOutcome::EntityGone;
            },
        }
        let mut pinned = match self.runtime.query_entities(EntityQuery::pinned_in(window_id)).await {
            Ok(pinned) => pinned,
            Err(e) => {
                log::warn!("reconciler: cannot read pinned row of {window_id} ({e})");
                return ReorderOutcome::QueryFailed;
            },
        };
        pinned.sort_by_key(|entity| entity.index);
        let row: Vec<String> = pinned
            .iter()
            .filter_map(|entity| entity.effective_url().map(str::to_string))
            .collect();

        match self.writer.adopt_window_order(row).await {
            Ok(outcome) if outcome.changed => {
                log::debug!("reconciler: adopted order of {window_id} ({} entries)", outcome.set.len());
                ReorderOutcome::Adopted
            },
            Ok(_) => ReorderOutcome::Unchanged,
            Err(e) => {
                log::warn!("reconciler: failed to adopt order of {window_id} ({e})");
                ReorderOutcome::StoreFailed
            },
        }
    }

    async fn reset_to_origin(&self, id: EntityId) -> CommandOutcome {
        let Some(origin_url) = self.origin_of(id) else {
            return CommandOutcome::NotManaged;
        };
        match self.runtime.navigate(id, &origin_url).await {
            Ok(()) => CommandOutcome::Reset { origin_url },
            Err(e) => {
                log::warn!("reconciler: failed to reset {id} to {origin_url} ({e})");
                CommandOutcome::ResetFailed
            },
        }
    }

    async fn close_on_request(&self, id: EntityId, remove_from_set: bool) -> CommandOutcome {
        let origin_url = {
            let mut book = self.book.lock();
            book.overrides.grant_once(id);
            book.protection.untag(id)
        };

        if let Err(e) = self.runtime.remove_entities(&[id]).await {
            log::warn!("reconciler: failed to close {id} on request ({e})");
            let mut book = self.book.lock();
            book.overrides.consume(id);
            if let Some(origin_url) = &origin_url {
                book.protection.tag(id, origin_url);
            }
            return CommandOutcome::CloseFailed;
        }

        let removed_from_set = match (remove_from_set, origin_url) {
            (true, Some(url)) => match self.writer.remove(&url).await {
                Ok(outcome) => outcome.changed,
                Err(e) => {
                    log::warn!("reconciler: failed to drop {url} from desired set ({e})");
                    false
                },
            },
            _ => false,
        };
        CommandOutcome::Closed { removed_from_set }
    }
}

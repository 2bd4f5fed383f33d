/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Projection of the desired set onto one window's pinned row.

use crate::persistence::{DESIRED_SET_KEY, DesiredPinSet};
use crate::runtime::{CreateEntity, EntityId, EntityQuery, EntitySnapshot, WindowId};

use super::Reconciler;

/// What one projection pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionReport {
    pub window_id: Option<WindowId>,
    pub created: usize,
    pub moved: usize,
    pub kept: usize,
    pub unpinned: usize,
    pub skipped_privileged: usize,
    /// Per-entity commands that failed and were skipped.
    pub failures: usize,
    pub desired_was_empty: bool,
    /// The window or the desired set could not be read; nothing was touched.
    pub aborted: bool,
}

impl ProjectionReport {
    fn new(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            ..Self::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.moved == 0 && self.unpinned == 0
    }
}

/// One pre-existing pinned entity in the working model of the row.
#[derive(Debug)]
struct PinnedSlot {
    id: EntityId,
    url: Option<String>,
    claimed: bool,
}

impl PinnedSlot {
    fn from_snapshot(entity: &EntitySnapshot) -> Self {
        Self {
            id: entity.id,
            url: entity.effective_url().map(str::to_string),
            claimed: false,
        }
    }
}

impl Reconciler {
    /// Reconcile `window_id`'s pinned row to the desired set.
    ///
    /// Holds the window's lock for the whole pass. Per-entity failures are
    /// logged and skipped; only a failed read of the window or of the store
    /// aborts, since acting on a partial view would unpin live entries.
    pub async fn project_desired_set_onto(&self, window_id: WindowId) -> ProjectionReport {
        let _row_guard = self.window_locks.acquire(window_id).await;
        let mut report = ProjectionReport::new(window_id);

        let mut entities = match self.runtime.query_entities(EntityQuery::window(window_id)).await {
            Ok(entities) => entities,
            Err(e) => {
                log::warn!("projector: cannot read {window_id} ({e}), skipping projection");
                report.aborted = true;
                return report;
            },
        };
        let desired = match self.store.get(DESIRED_SET_KEY).await {
            Ok(value) => DesiredPinSet::from_value(value.as_ref()),
            Err(e) => {
                log::warn!("projector: cannot read desired set ({e}), leaving {window_id} as is");
                report.aborted = true;
                return report;
            },
        };
        report.desired_was_empty = desired.is_empty();

        entities.sort_by_key(|entity| entity.index);
        // Pinned entities occupy the front of the row, so a slot's position
        // in this list is its runtime index.
        let mut row: Vec<PinnedSlot> = entities
            .iter()
            .filter(|entity| entity.pinned)
            .map(PinnedSlot::from_snapshot)
            .collect();

        let mut target = 0usize;
        for url in desired.urls() {
            if self.addresses.is_privileged(url) {
                // An existing entity is claimed so the sweep leaves it pinned.
                // It is never moved or tagged.
                if let Some(position) = row
                    .iter()
                    .position(|slot| !slot.claimed && slot.url.as_deref() == Some(url.as_str()))
                {
                    row[position].claimed = true;
                    if position == target {
                        target += 1;
                    }
                }
                log::debug!("projector: not recreating privileged address {url}");
                report.skipped_privileged += 1;
                continue;
            }

            let existing = row
                .iter()
                .position(|slot| !slot.claimed && slot.url.as_deref() == Some(url.as_str()));
            match existing {
                Some(position) => {
                    let id = row[position].id;
                    row[position].claimed = true;
                    if position != target {
                        if let Err(e) = self.runtime.move_entity(id, target).await {
                            log::warn!("projector: failed to move {id} to {target} ({e})");
                            report.failures += 1;
                            continue;
                        }
                        let slot = row.remove(position);
                        row.insert(target.min(row.len()), slot);
                        report.moved += 1;
                    } else {
                        report.kept += 1;
                    }
                    self.protect(id, url).await;
                },
                None => {
                    let create = CreateEntity {
                        window_id,
                        url: url.clone(),
                        pinned: true,
                        active: false,
                        index: target,
                    };
                    match self.runtime.create_entity(create).await {
                        Ok(created) => {
                            row.insert(
                                target.min(row.len()),
                                PinnedSlot {
                                    id: created.id,
                                    url: Some(url.clone()),
                                    claimed: true,
                                },
                            );
                            report.created += 1;
                            self.protect(created.id, url).await;
                        },
                        Err(e) => {
                            log::warn!("projector: failed to create {url} in {window_id} ({e})");
                            report.failures += 1;
                            continue;
                        },
                    }
                },
            }
            target += 1;
        }

        // Whatever is left over is either not desired or a duplicate of an
        // entry claimed above. Unpin, never close: it may hold user data.
        let leftovers: Vec<EntityId> = row
            .iter()
            .filter(|slot| !slot.claimed)
            .map(|slot| slot.id)
            .collect();
        for id in leftovers {
            self.book.lock().pin_echoes.expect_unpin(id);
            match self.runtime.set_pinned(id, false).await {
                Ok(()) => {
                    self.unprotect(id).await;
                    report.unpinned += 1;
                },
                Err(e) => {
                    self.book.lock().pin_echoes.consume(id);
                    log::debug!("projector: failed to unpin {id} ({e})");
                    report.failures += 1;
                },
            }
        }

        if report.desired_was_empty {
            log::info!(
                "projector: desired set is empty, unpinned {} entities in {window_id}",
                report.unpinned
            );
        } else {
            log::debug!("projector: {window_id} {report:?}");
        }
        report
    }
}

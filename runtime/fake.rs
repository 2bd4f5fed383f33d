/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! In-memory runtime double.
//!
//! Models windows as ordered entity rows with the pinned-first layout of a
//! tab strip. Commands issued through [`Runtime`] are recorded so tests can
//! assert on exactly what the engine asked for. Events are never emitted on
//! their own: the `*_event` helpers mutate the model the way a user or the
//! browser would and hand back the event to feed into the engine.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    CreateEntity, EntityChange, EntityId, EntityQuery, EntitySnapshot, LoadStatus,
    RestoreNotice, Runtime, RuntimeError, RuntimeEvent, WindowId, WindowKind,
};

/// A command observed by the fake, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCommand {
    Create {
        window_id: WindowId,
        url: String,
        pinned: bool,
        active: bool,
        index: usize,
        id: EntityId,
    },
    Move {
        id: EntityId,
        index: usize,
    },
    SetPinned {
        id: EntityId,
        pinned: bool,
    },
    Navigate {
        id: EntityId,
        url: String,
    },
    Remove {
        ids: Vec<EntityId>,
    },
    Notice {
        id: EntityId,
        origin_url: String,
    },
}

/// Command class used for one-shot failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Create,
    Move,
    SetPinned,
    Navigate,
    Remove,
    Query,
    Notice,
    Badge,
}

#[derive(Debug)]
struct FakeWindow {
    kind: WindowKind,
    row: Vec<EntitySnapshot>,
}

impl FakeWindow {
    fn reindex(&mut self) {
        for (index, entity) in self.row.iter_mut().enumerate() {
            entity.index = index;
        }
    }

    fn pinned_count(&self) -> usize {
        self.row.iter().filter(|e| e.pinned).count()
    }

    fn take(&mut self, id: EntityId) -> Option<EntitySnapshot> {
        let pos = self.row.iter().position(|e| e.id == id)?;
        Some(self.row.remove(pos))
    }

    /// Insert keeping pinned entities ahead of unpinned ones.
    fn place(&mut self, entity: EntitySnapshot, index: usize) {
        let pinned_count = self.pinned_count();
        let index = if entity.pinned {
            index.min(pinned_count)
        } else {
            index.clamp(pinned_count, self.row.len())
        };
        self.row.insert(index, entity);
        self.reindex();
    }
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u64,
    windows: HashMap<WindowId, FakeWindow>,
    window_order: Vec<WindowId>,
    focused: Option<WindowId>,
    commands: Vec<RuntimeCommand>,
    badges: HashMap<EntityId, String>,
    failures: HashSet<CommandKind>,
}

impl FakeState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn fail(&mut self, kind: CommandKind) -> Result<(), RuntimeError> {
        if self.failures.remove(&kind) {
            return Err(RuntimeError::Unavailable(format!("injected {kind:?} failure")));
        }
        Ok(())
    }

    fn window_of(&self, id: EntityId) -> Option<WindowId> {
        self.windows
            .iter()
            .find(|(_, window)| window.row.iter().any(|e| e.id == id))
            .map(|(window_id, _)| *window_id)
    }

    fn entity(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.windows
            .values()
            .flat_map(|window| window.row.iter())
            .find(|e| e.id == id)
    }

    fn entity_mut(&mut self, id: EntityId) -> Option<&mut EntitySnapshot> {
        self.windows
            .values_mut()
            .flat_map(|window| window.row.iter_mut())
            .find(|e| e.id == id)
    }

    fn repin(&mut self, id: EntityId, pinned: bool) -> Result<(), RuntimeError> {
        let window_id = self.window_of(id).ok_or(RuntimeError::EntityMissing(id))?;
        let window = self
            .windows
            .get_mut(&window_id)
            .ok_or(RuntimeError::WindowMissing(window_id))?;
        let Some(mut entity) = window.take(id) else {
            return Err(RuntimeError::EntityMissing(id));
        };
        let was_pinned = entity.pinned;
        entity.pinned = pinned;
        let index = if was_pinned != pinned {
            window.pinned_count()
        } else {
            entity.index
        };
        window.place(entity, index);
        Ok(())
    }
}

/// Shared in-memory runtime; cheap to wrap in an `Arc` and hand to the engine.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_window(&self, kind: WindowKind) -> WindowId {
        let mut state = self.state.lock();
        let window_id = WindowId(state.next_id());
        state.windows.insert(
            window_id,
            FakeWindow {
                kind,
                row: Vec::new(),
            },
        );
        state.window_order.push(window_id);
        state.focused = Some(window_id);
        window_id
    }

    pub fn focus_window(&self, window_id: WindowId) {
        self.state.lock().focused = Some(window_id);
    }

    /// Seed an entity as if the browser restored or the user opened it.
    pub fn add_entity(&self, window_id: WindowId, url: &str, pinned: bool) -> EntityId {
        let mut state = self.state.lock();
        let id = EntityId(state.next_id());
        if let Some(window) = state.windows.get_mut(&window_id) {
            let index = if pinned {
                window.pinned_count()
            } else {
                window.row.len()
            };
            window.place(
                EntitySnapshot {
                    id,
                    window_id,
                    index,
                    url: Some(url.to_string()),
                    pending_url: None,
                    pinned,
                    status: LoadStatus::Complete,
                },
                index,
            );
        }
        id
    }

    pub fn entity(&self, id: EntityId) -> Option<EntitySnapshot> {
        self.state.lock().entity(id).cloned()
    }

    pub fn entities(&self, window_id: WindowId) -> Vec<EntitySnapshot> {
        self.state
            .lock()
            .windows
            .get(&window_id)
            .map(|window| window.row.clone())
            .unwrap_or_default()
    }

    pub fn pinned_urls(&self, window_id: WindowId) -> Vec<String> {
        self.entities(window_id)
            .into_iter()
            .filter(|e| e.pinned)
            .filter_map(|e| e.effective_url().map(str::to_string))
            .collect()
    }

    pub fn commands(&self) -> Vec<RuntimeCommand> {
        self.state.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    pub fn notices(&self) -> Vec<(EntityId, RestoreNotice)> {
        self.state
            .lock()
            .commands
            .iter()
            .filter_map(|command| match command {
                RuntimeCommand::Notice { id, origin_url } => Some((
                    *id,
                    RestoreNotice {
                        origin_url: origin_url.clone(),
                    },
                )),
                _ => None,
            })
            .collect()
    }

    pub fn badge(&self, id: EntityId) -> Option<String> {
        self.state.lock().badges.get(&id).cloned()
    }

    /// Make the next command of `kind` fail.
    pub fn fail_next(&self, kind: CommandKind) {
        self.state.lock().failures.insert(kind);
    }

    /// User or crash closes `id` outside the engine.
    pub fn close_event(&self, id: EntityId) -> Option<RuntimeEvent> {
        let mut state = self.state.lock();
        let window_id = state.window_of(id)?;
        let window = state.windows.get_mut(&window_id)?;
        window.take(id)?;
        window.reindex();
        Some(RuntimeEvent::EntityRemoved {
            entity_id: id,
            window_id,
            window_closing: false,
        })
    }

    /// Close a whole window; returns the per-entity teardown removals
    /// followed by the window removal.
    pub fn close_window_events(&self, window_id: WindowId) -> Vec<RuntimeEvent> {
        let mut state = self.state.lock();
        let Some(window) = state.windows.remove(&window_id) else {
            return Vec::new();
        };
        state.window_order.retain(|w| *w != window_id);
        if state.focused == Some(window_id) {
            state.focused = state.window_order.last().copied();
        }
        let mut events: Vec<RuntimeEvent> = window
            .row
            .iter()
            .map(|entity| RuntimeEvent::EntityRemoved {
                entity_id: entity.id,
                window_id,
                window_closing: true,
            })
            .collect();
        events.push(RuntimeEvent::WindowRemoved { window_id });
        events
    }

    pub fn load_complete_event(&self, id: EntityId) -> Option<RuntimeEvent> {
        let mut state = self.state.lock();
        let entity = state.entity_mut(id)?;
        entity.status = LoadStatus::Complete;
        if let Some(pending) = entity.pending_url.take() {
            entity.url = Some(pending);
        }
        Some(RuntimeEvent::EntityUpdated {
            entity_id: id,
            change: EntityChange::load_complete(),
            entity: entity.clone(),
        })
    }

    /// Navigate `id` to `url` without going through the engine.
    pub fn redirect(&self, id: EntityId, url: &str) {
        if let Some(entity) = self.state.lock().entity_mut(id) {
            entity.url = Some(url.to_string());
            entity.pending_url = None;
        }
    }

    pub fn pin_event(&self, id: EntityId, pinned: bool) -> Option<RuntimeEvent> {
        let mut state = self.state.lock();
        state.repin(id, pinned).ok()?;
        let entity = state.entity(id)?.clone();
        Some(RuntimeEvent::EntityUpdated {
            entity_id: id,
            change: EntityChange::pinned(pinned),
            entity,
        })
    }

    pub fn drag_event(&self, id: EntityId, to_index: usize) -> Option<RuntimeEvent> {
        let mut state = self.state.lock();
        let window_id = state.window_of(id)?;
        let window = state.windows.get_mut(&window_id)?;
        let entity = window.take(id)?;
        let from_index = entity.index;
        window.place(entity, to_index);
        let to_index = window.row.iter().position(|e| e.id == id)?;
        Some(RuntimeEvent::EntityMoved {
            entity_id: id,
            window_id,
            from_index,
            to_index,
        })
    }

    /// Swap `removed` for a fresh id that keeps its place and state.
    pub fn replace_event(&self, removed: EntityId) -> Option<(EntityId, RuntimeEvent)> {
        let mut state = self.state.lock();
        let added = EntityId(state.next_id());
        let entity = state.entity_mut(removed)?;
        entity.id = added;
        Some((added, RuntimeEvent::EntityReplaced { added, removed }))
    }
}

#[async_trait]
impl Runtime for FakeRuntime {
    async fn create_entity(&self, create: CreateEntity) -> Result<EntitySnapshot, RuntimeError> {
        let mut state = self.state.lock();
        state.fail(CommandKind::Create)?;
        let id = EntityId(state.next_id());
        let window = state
            .windows
            .get_mut(&create.window_id)
            .ok_or(RuntimeError::WindowMissing(create.window_id))?;
        window.place(
            EntitySnapshot {
                id,
                window_id: create.window_id,
                index: create.index,
                url: None,
                pending_url: Some(create.url.clone()),
                pinned: create.pinned,
                status: LoadStatus::Loading,
            },
            create.index,
        );
        let snapshot = window
            .row
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(RuntimeError::EntityMissing(id))?;
        state.commands.push(RuntimeCommand::Create {
            window_id: create.window_id,
            url: create.url,
            pinned: create.pinned,
            active: create.active,
            index: create.index,
            id,
        });
        Ok(snapshot)
    }

    async fn move_entity(&self, id: EntityId, index: usize) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.fail(CommandKind::Move)?;
        let window_id = state.window_of(id).ok_or(RuntimeError::EntityMissing(id))?;
        let window = state
            .windows
            .get_mut(&window_id)
            .ok_or(RuntimeError::WindowMissing(window_id))?;
        let entity = window.take(id).ok_or(RuntimeError::EntityMissing(id))?;
        window.place(entity, index);
        state.commands.push(RuntimeCommand::Move { id, index });
        Ok(())
    }

    async fn set_pinned(&self, id: EntityId, pinned: bool) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.fail(CommandKind::SetPinned)?;
        state.repin(id, pinned)?;
        state.commands.push(RuntimeCommand::SetPinned { id, pinned });
        Ok(())
    }

    async fn navigate(&self, id: EntityId, url: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.fail(CommandKind::Navigate)?;
        let entity = state.entity_mut(id).ok_or(RuntimeError::EntityMissing(id))?;
        entity.pending_url = Some(url.to_string());
        entity.status = LoadStatus::Loading;
        state.commands.push(RuntimeCommand::Navigate {
            id,
            url: url.to_string(),
        });
        Ok(())
    }

    async fn remove_entities(&self, ids: &[EntityId]) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.fail(CommandKind::Remove)?;
        for id in ids {
            if let Some(window_id) = state.window_of(*id)
                && let Some(window) = state.windows.get_mut(&window_id)
            {
                window.take(*id);
                window.reindex();
            }
        }
        state.commands.push(RuntimeCommand::Remove { ids: ids.to_vec() });
        Ok(())
    }

    async fn query_entities(&self, query: EntityQuery) -> Result<Vec<EntitySnapshot>, RuntimeError> {
        let mut state = self.state.lock();
        state.fail(CommandKind::Query)?;
        if let Some(window_id) = query.window_id
            && !state.windows.contains_key(&window_id)
        {
            return Err(RuntimeError::WindowMissing(window_id));
        }
        Ok(state
            .window_order
            .iter()
            .filter_map(|window_id| state.windows.get(window_id))
            .flat_map(|window| window.row.iter())
            .filter(|entity| query.matches(entity))
            .cloned()
            .collect())
    }

    async fn get_entity(&self, id: EntityId) -> Result<EntitySnapshot, RuntimeError> {
        self.state
            .lock()
            .entity(id)
            .cloned()
            .ok_or(RuntimeError::EntityMissing(id))
    }

    async fn last_focused_window(&self, kind: WindowKind) -> Result<WindowId, RuntimeError> {
        let state = self.state.lock();
        state
            .focused
            .filter(|window_id| state.windows.get(window_id).is_some_and(|w| w.kind == kind))
            .or_else(|| {
                state
                    .window_order
                    .iter()
                    .rev()
                    .find(|window_id| state.windows.get(window_id).is_some_and(|w| w.kind == kind))
                    .copied()
            })
            .ok_or(RuntimeError::NoFocusedWindow(kind))
    }

    async fn deliver_notice(&self, id: EntityId, notice: &RestoreNotice) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.fail(CommandKind::Notice)?;
        if state.entity(id).is_none() {
            return Err(RuntimeError::EntityMissing(id));
        }
        state.commands.push(RuntimeCommand::Notice {
            id,
            origin_url: notice.origin_url.clone(),
        });
        Ok(())
    }

    async fn set_badge(&self, id: EntityId, text: Option<&str>) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.fail(CommandKind::Badge)?;
        match text {
            Some(text) => {
                state.badges.insert(id, text.to_string());
            },
            None => {
                state.badges.remove(&id);
            },
        }
        Ok(())
    }
}

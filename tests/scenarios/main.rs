/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! End-to-end scenarios driving `RepinApp` against the in-memory runtime.

use std::sync::Arc;

use repin::VERSION;
use repin::app::RepinApp;
use repin::config::RepinConfig;
use repin::lifecycle::{CommandOutcome, EventOutcome, RemovalOutcome};
use repin::persistence::{AUTO_TRACK_KEY, DESIRED_SET_KEY, DesiredPinSet, FilePinStore, PinStore};
use repin::runtime::{
    ContentRequest, EntityId, InboundCommand, RuntimeEvent, WindowId, WindowKind,
};
use repin::test_utils::{CommandKind, FakeRuntime, MemoryPinStore, RuntimeCommand};
use serde_json::json;

struct Harness {
    app: RepinApp,
    runtime: Arc<FakeRuntime>,
    store: Arc<MemoryPinStore>,
}

impl Harness {
    fn with_desired(urls: &[&str]) -> Self {
        let runtime = Arc::new(FakeRuntime::new());
        let store = Arc::new(MemoryPinStore::with_desired_set(&DesiredPinSet::from_urls(
            urls.iter().copied(),
        )));
        let app = RepinApp::start(runtime.clone(), store.clone(), &RepinConfig::default());
        Self {
            app,
            runtime,
            store,
        }
    }

    async fn event(&self, event: RuntimeEvent) -> EventOutcome {
        self.app.reconciler().handle_event(event).await
    }

    async fn command(&self, command: InboundCommand) -> CommandOutcome {
        self.app.reconciler().handle_command(command).await
    }

    async fn open_managed_window(&self) -> WindowId {
        let window_id = self.runtime.open_window(WindowKind::Normal);
        self.event(RuntimeEvent::WindowCreated {
            window_id,
            kind: WindowKind::Normal,
        })
        .await;
        window_id
    }

    fn pinned_ids(&self, window_id: WindowId) -> Vec<EntityId> {
        self.runtime
            .entities(window_id)
            .into_iter()
            .filter(|e| e.pinned)
            .map(|e| e.id)
            .collect()
    }
}

#[test]
fn scenarios_binary_smoke_runs() {
    assert!(!VERSION.is_empty());
}

#[tokio::test]
async fn new_window_receives_desired_set_in_rank_order() {
    let h = Harness::with_desired(&["https://a", "https://b"]);

    let window = h.open_managed_window().await;

    let creates: Vec<(String, usize)> = h
        .runtime
        .commands()
        .into_iter()
        .filter_map(|command| match command {
            RuntimeCommand::Create { url, index, pinned: true, .. } => Some((url, index)),
            _ => None,
        })
        .collect();
    assert_eq!(
        creates,
        vec![("https://a".to_string(), 0), ("https://b".to_string(), 1)]
    );
    let pinned = h.pinned_ids(window);
    assert_eq!(pinned.len(), 2);
    assert_eq!(h.app.reconciler().origin_of(pinned[0]).as_deref(), Some("https://a"));
    assert_eq!(h.app.reconciler().origin_of(pinned[1]).as_deref(), Some("https://b"));
    h.app.shutdown().await;
}

#[tokio::test]
async fn repeated_projection_is_idempotent() {
    let h = Harness::with_desired(&["https://a", "https://b", "https://c"]);
    let window = h.runtime.open_window(WindowKind::Normal);
    h.runtime.add_entity(window, "https://c", true);
    h.runtime.add_entity(window, "https://x", true);
    h.runtime.add_entity(window, "https://a", true);

    let first = h.command(InboundCommand::ApplyDesiredSet).await;
    let after_first = h.runtime.commands().len();
    let second = h.command(InboundCommand::ApplyDesiredSet).await;

    assert!(matches!(first, CommandOutcome::Projected(report) if !report.is_noop()));
    assert!(matches!(second, CommandOutcome::Projected(report) if report.is_noop()));
    assert_eq!(h.runtime.commands().len(), after_first);
    assert_eq!(
        h.runtime.pinned_urls(window),
        vec!["https://a", "https://b", "https://c"]
    );
    h.app.shutdown().await;
}

#[tokio::test]
async fn duplicate_pinned_entities_collapse_to_one() {
    let h = Harness::with_desired(&["https://a"]);
    let window = h.runtime.open_window(WindowKind::Normal);
    h.runtime.add_entity(window, "https://a", true);
    h.runtime.add_entity(window, "https://a", true);

    h.command(InboundCommand::ApplyDesiredSet).await;

    assert_eq!(h.runtime.pinned_urls(window), vec!["https://a"]);
    assert_eq!(h.runtime.entities(window).len(), 2);
    h.app.shutdown().await;
}

#[tokio::test]
async fn privileged_desired_entries_are_never_created() {
    let h = Harness::with_desired(&["chrome://settings", "https://a", "chrome-extension://id/page"]);

    let window = h.open_managed_window().await;

    assert!(!h.runtime.commands().iter().any(|command| matches!(
        command,
        RuntimeCommand::Create { url, .. } if url.starts_with("chrome")
    )));
    assert_eq!(h.runtime.pinned_urls(window), vec!["https://a"]);
    h.app.shutdown().await;
}

#[tokio::test]
async fn unauthorized_close_restores_entity_and_notifies_once() {
    let h = Harness::with_desired(&["https://a", "https://b"]);
    let window = h.open_managed_window().await;
    let a = h.pinned_ids(window)[0];

    let removal = h.runtime.close_event(a).expect("entity should exist");
    let outcome = h.event(removal).await;

    let EventOutcome::Removal(RemovalOutcome::Restored { new_id, index }) = outcome else {
        panic!("expected a restore, got {outcome:?}");
    };
    assert_eq!(index, 0);
    assert!(h.runtime.commands().contains(&RuntimeCommand::Create {
        window_id: window,
        url: "https://a".to_string(),
        pinned: true,
        active: true,
        index: 0,
        id: new_id,
    }));
    assert_eq!(h.pinned_ids(window)[0], new_id);
    assert!(h.app.reconciler().is_protected(new_id));
    assert!(!h.app.reconciler().is_protected(a));
    assert!(h.app.reconciler().has_pending_notice(new_id));

    let loaded = h.runtime.load_complete_event(new_id).expect("entity should exist");
    h.event(loaded.clone()).await;
    h.event(loaded).await;

    let notices = h.runtime.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0, new_id);
    assert_eq!(notices[0].1.origin_url, "https://a");
    assert!(!h.app.reconciler().has_pending_notice(new_id));
    h.app.shutdown().await;
}

#[tokio::test]
async fn override_is_consumed_by_exactly_one_removal() {
    let h = Harness::with_desired(&["https://a"]);
    let window = h.open_managed_window().await;
    let a = h.pinned_ids(window)[0];
    let removal = RuntimeEvent::EntityRemoved {
        entity_id: a,
        window_id: window,
        window_closing: false,
    };

    h.command(InboundCommand::AllowCloseOnce { entity_id: a }).await;
    assert_eq!(
        h.event(removal.clone()).await,
        EventOutcome::Removal(RemovalOutcome::OverrideConsumed)
    );

    // The entity is still live in this window, so re-applying protects it again.
    h.command(InboundCommand::ApplyDesiredSet).await;
    assert!(h.app.reconciler().is_protected(a));
    assert!(matches!(
        h.event(removal).await,
        EventOutcome::Removal(RemovalOutcome::Restored { .. })
    ));
    h.app.shutdown().await;
}

#[tokio::test]
async fn identity_replacement_transfers_protection_silently() {
    let h = Harness::with_desired(&["https://x"]);
    let window = h.open_managed_window().await;
    let a = h.pinned_ids(window)[0];

    let (b, replaced) = h.runtime.replace_event(a).expect("entity should exist");
    h.event(replaced).await;

    assert_eq!(h.app.reconciler().origin_of(b).as_deref(), Some("https://x"));
    assert!(!h.app.reconciler().is_protected(a));
    assert_eq!(h.app.reconciler().pending_notice_count(), 0);

    // The new handle is the one that gets restored on close.
    let removal = h.runtime.close_event(b).expect("entity should exist");
    assert!(matches!(
        h.event(removal).await,
        EventOutcome::Removal(RemovalOutcome::Restored { .. })
    ));
    h.app.shutdown().await;
}

#[tokio::test]
async fn closing_window_never_recreates() {
    let h = Harness::with_desired(&["https://a", "https://b"]);
    let window = h.open_managed_window().await;
    h.runtime.clear_commands();

    for event in h.runtime.close_window_events(window) {
        h.event(event).await;
    }

    assert!(h.runtime.commands().is_empty());
    assert_eq!(h.app.reconciler().protected_count(), 0);
    h.app.shutdown().await;
}

#[tokio::test]
async fn close_and_remove_keeps_entity_closed_and_set_dense() {
    let h = Harness::with_desired(&["https://a", "https://b", "https://c"]);
    let window = h.open_managed_window().await;
    let b = h.pinned_ids(window)[1];

    let outcome = h
        .command(InboundCommand::Content {
            entity_id: b,
            request: ContentRequest::CloseAndRemove,
        })
        .await;
    let removal = RuntimeEvent::EntityRemoved {
        entity_id: b,
        window_id: window,
        window_closing: false,
    };

    assert_eq!(outcome, CommandOutcome::Closed { removed_from_set: true });
    assert_eq!(
        h.event(removal).await,
        EventOutcome::Removal(RemovalOutcome::OverrideConsumed)
    );
    assert_eq!(
        h.store.peek(DESIRED_SET_KEY),
        Some(json!({"https://a": 1, "https://c": 2}))
    );
    assert_eq!(h.runtime.pinned_urls(window), vec!["https://a", "https://c"]);
    h.app.shutdown().await;
}

#[tokio::test]
async fn auto_track_follows_manual_pin_unpin_and_drag() {
    let h = Harness::with_desired(&["https://a"]);
    h.store.put(AUTO_TRACK_KEY, json!(true));
    let window = h.open_managed_window().await;
    let loose = h.runtime.add_entity(window, "https://n", false);

    let pinned = h.runtime.pin_event(loose, true).expect("entity should exist");
    h.event(pinned).await;
    assert_eq!(h.store.desired_set().urls(), ["https://a", "https://n"]);
    assert!(h.app.reconciler().is_protected(loose));

    let dragged = h.runtime.drag_event(loose, 0).expect("entity should exist");
    h.event(dragged).await;
    assert_eq!(h.store.desired_set().urls(), ["https://n", "https://a"]);

    let unpinned = h.runtime.pin_event(loose, false).expect("entity should exist");
    h.event(unpinned).await;
    assert_eq!(h.store.desired_set().urls(), ["https://a"]);
    assert!(!h.app.reconciler().is_protected(loose));
    h.app.shutdown().await;
}

#[tokio::test]
async fn concurrent_handlers_keep_every_desired_set_update() {
    let mut h = Harness::with_desired(&["https://a", "https://b"]);
    h.store.put(AUTO_TRACK_KEY, json!(true));
    let window = h.runtime.open_window(WindowKind::Normal);
    let a = h.runtime.add_entity(window, "https://a", true);
    h.runtime.add_entity(window, "https://b", true);
    let c = h.runtime.add_entity(window, "https://c", false);

    let drag = h.runtime.drag_event(a, 1).expect("entity should exist");
    let pin = h.runtime.pin_event(c, true).expect("entity should exist");
    h.app.dispatch(drag);
    h.app.dispatch(pin);
    h.app.settle().await;

    let desired = h.store.desired_set();
    assert!(desired.contains("https://c"));
    assert_eq!(desired.len(), 3);
    assert_eq!(desired.rank_of("https://b"), Some(1));
    h.app.shutdown().await;
}

#[tokio::test]
async fn explicit_apply_with_empty_set_unpins_without_creating() {
    let h = Harness::with_desired(&[]);
    let window = h.runtime.open_window(WindowKind::Normal);
    h.runtime.add_entity(window, "https://a", true);

    let outcome = h.command(InboundCommand::ApplyDesiredSet).await;

    let CommandOutcome::Projected(report) = outcome else {
        panic!("expected a projection, got {outcome:?}");
    };
    assert!(report.desired_was_empty);
    assert_eq!(report.created, 0);
    assert!(h.runtime.pinned_urls(window).is_empty());
    h.app.shutdown().await;
}

#[tokio::test]
async fn runtime_failures_never_leak_protection() {
    let h = Harness::with_desired(&["https://a"]);
    let window = h.open_managed_window().await;
    let a = h.pinned_ids(window)[0];
    h.runtime.fail_next(CommandKind::Create);

    let removal = h.runtime.close_event(a).expect("entity should exist");
    assert_eq!(
        h.event(removal).await,
        EventOutcome::Removal(RemovalOutcome::RestoreFailed)
    );
    assert_eq!(h.app.reconciler().protected_count(), 0);
    assert_eq!(h.app.reconciler().pending_notice_count(), 0);
    h.app.shutdown().await;
}

#[tokio::test]
async fn file_store_backs_a_full_session() {
    let dir = tempfile::TempDir::new().expect("temp dir should be created");
    let store = Arc::new(FilePinStore::new(dir.path().join("store.json")));
    let runtime = Arc::new(FakeRuntime::new());
    let app = RepinApp::start(runtime.clone(), store.clone(), &RepinConfig::default());

    assert_eq!(app.initialize().await, Ok(true));
    store
        .set(DESIRED_SET_KEY, json!({"https://b": 4, "https://a": 2}))
        .await
        .expect("set should succeed");
    let window = runtime.open_window(WindowKind::Normal);
    app.reconciler()
        .handle_event(RuntimeEvent::WindowCreated {
            window_id: window,
            kind: WindowKind::Normal,
        })
        .await;

    assert_eq!(runtime.pinned_urls(window), vec!["https://a", "https://b"]);
    app.shutdown().await;
}

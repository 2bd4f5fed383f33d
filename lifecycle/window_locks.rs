/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::runtime::WindowId;

/// One async lock per window.
///
/// Projection, reorder sync and recreation each read an ordered snapshot of
/// a window's pinned row and then act on it; holding the window's lock keeps
/// two of them from interleaving on the same row. Different windows proceed
/// in parallel.
///
/// An entry lives only while some task holds or awaits its lock, so windows
/// that are gone leave nothing behind.
#[derive(Debug, Default)]
pub struct WindowLocks {
    locks: Mutex<HashMap<WindowId, Arc<tokio::sync::Mutex<()>>>>,
}

impl WindowLocks {
    pub async fn acquire(&self, window_id: WindowId) -> WindowGuard<'_> {
        let lock = self.locks.lock().entry(window_id).or_default().clone();
        let guard = lock.lock_owned().await;
        WindowGuard {
            locks: self,
            window_id,
            guard: Some(guard),
        }
    }

    /// Drop the entry of a closed window.
    pub fn forget(&self, window_id: WindowId) {
        self.locks.lock().remove(&window_id);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }

    /// Remove `window_id`'s entry when nothing but the map refers to it.
    fn release_idle(&self, window_id: WindowId) {
        let mut locks = self.locks.lock();
        // Clones are only taken under this lock, so the count cannot grow
        // while it is held.
        if locks
            .get(&window_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&window_id);
        }
    }
}

/// Exclusive hold on one window's row. Releasing the last hold drops the
/// window's entry.
#[derive(Debug)]
pub struct WindowGuard<'a> {
    locks: &'a WindowLocks,
    window_id: WindowId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WindowGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release_idle(self.window_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_window_is_exclusive() {
        let locks = WindowLocks::default();
        let held = locks.acquire(WindowId(1)).await;

        let second = tokio::time::timeout(Duration::from_millis(20), locks.acquire(WindowId(1))).await;
        assert!(second.is_err(), "second acquire should wait for the first");

        drop(held);
        let second = tokio::time::timeout(Duration::from_millis(20), locks.acquire(WindowId(1))).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn different_windows_do_not_block() {
        let locks = WindowLocks::default();
        let _first = locks.acquire(WindowId(1)).await;

        let other = tokio::time::timeout(Duration::from_millis(20), locks.acquire(WindowId(2))).await;
        assert!(other.is_ok());
        assert_eq!(locks.len(), 2);

        locks.forget(WindowId(2));
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn released_window_leaves_no_entry() {
        let locks = WindowLocks::default();
        let held = locks.acquire(WindowId(1)).await;
        assert_eq!(locks.len(), 1);

        drop(held);

        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn waiter_keeps_entry_until_it_releases() {
        let locks = Arc::new(WindowLocks::default());
        let held = locks.acquire(WindowId(1)).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(WindowId(1)).await;
                locks.len()
            })
        };
        tokio::task::yield_now().await;

        drop(held);
        assert_eq!(waiter.await.expect("waiter should finish"), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn acquire_after_forget_does_not_leak() {
        let locks = WindowLocks::default();
        locks.forget(WindowId(3));

        drop(locks.acquire(WindowId(3)).await);

        assert!(locks.is_empty());
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Serialized desired-set writer.
//!
//! Handlers run as independent tasks and would otherwise race on the
//! store's read-modify-write cycle (a pin change and a drag reorder landing
//! together lose one of the two updates). Every structural mutation is sent
//! to one task that owns the cycle: read fresh, mutate, re-normalize, write.
//! Requests are applied strictly in arrival order.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{DESIRED_SET_KEY, DesiredPinSet, PinStore, StoreError};

/// Structural change to the desired set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinSetMutation {
    /// Add after the highest rank if absent.
    Append(String),
    /// Remove if present.
    Remove(String),
    /// Adopt a window's pinned row (position order) as the new ordering.
    AdoptWindowOrder(Vec<String>),
}

/// Result of one applied mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Whether the set changed and was written back.
    pub changed: bool,
    /// The set after the mutation.
    pub set: DesiredPinSet,
}

struct WriteRequest {
    mutation: PinSetMutation,
    reply: oneshot::Sender<Result<MutationOutcome, StoreError>>,
}

/// Cloneable handle to the writer task.
#[derive(Debug, Clone)]
pub struct PinSetWriter {
    tx: mpsc::Sender<WriteRequest>,
}

impl std::fmt::Debug for WriteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteRequest")
            .field("mutation", &self.mutation)
            .finish_non_exhaustive()
    }
}

impl PinSetWriter {
    /// Spawn the writer task on the current tokio runtime.
    ///
    /// The task exits when `cancel` fires or every handle is dropped.
    pub fn spawn(
        store: Arc<dyn PinStore>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(writer_loop(store, rx, cancel));
        log::debug!("writer: desired set writer spawned");
        (Self { tx }, handle)
    }

    pub async fn apply(&self, mutation: PinSetMutation) -> Result<MutationOutcome, StoreError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(WriteRequest { mutation, reply })
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        response.await.map_err(|_| StoreError::WriterClosed)?
    }

    pub async fn append(&self, url: &str) -> Result<MutationOutcome, StoreError> {
        self.apply(PinSetMutation::Append(url.to_string())).await
    }

    pub async fn remove(&self, url: &str) -> Result<MutationOutcome, StoreError> {
        self.apply(PinSetMutation::Remove(url.to_string())).await
    }

    pub async fn adopt_window_order(
        &self,
        window_urls: Vec<String>,
    ) -> Result<MutationOutcome, StoreError> {
        self.apply(PinSetMutation::AdoptWindowOrder(window_urls)).await
    }
}

async fn writer_loop(
    store: Arc<dyn PinStore>,
    mut rx: mpsc::Receiver<WriteRequest>,
    cancel: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => None,
            request = rx.recv() => request,
        };
        let Some(request) = request else {
            log::debug!("writer: stopping");
            break;
        };
        let result = apply_mutation(store.as_ref(), &request.mutation).await;
        if let Err(e) = &result {
            log::warn!("writer: {:?} failed ({e})", request.mutation);
        }
        if request.reply.send(result).is_err() {
            log::debug!("writer: requester went away before the reply");
        }
    }
    rx.close();
    while let Ok(request) = rx.try_recv() {
        let _ = request.reply.send(Err(StoreError::WriterClosed));
    }
}

/// One read-modify-write cycle. The set is read fresh every time so changes
/// made by another process in between are kept.
async fn apply_mutation(
    store: &dyn PinStore,
    mutation: &PinSetMutation,
) -> Result<MutationOutcome, StoreError> {
    // A failed read must not be mistaken for an empty set here: writing back
    // would wipe the stored one.
    let current = store.get(DESIRED_SET_KEY).await?;
    let mut set = DesiredPinSet::from_value(current.as_ref());
    let changed = match mutation {
        PinSetMutation::Append(url) => set.append(url.as_str()),
        PinSetMutation::Remove(url) => set.remove(url),
        PinSetMutation::AdoptWindowOrder(window_urls) => {
            set.adopt_window_order(window_urls.as_slice())
        },
    };
    // Stored ranks may be sparse from an older writer; rewrite them dense.
    let stored_sparse = current.as_ref().is_some_and(|stored| *stored != set.to_value());
    if changed || stored_sparse {
        store.set(DESIRED_SET_KEY, set.to_value()).await?;
        log::debug!("writer: desired set now has {} entries", set.len());
    }
    Ok(MutationOutcome { changed, set })
}

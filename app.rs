/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Process-scoped owner of the reconciliation state.
//!
//! [`RepinApp`] builds the registries, spawns the desired-set writer and
//! runs every inbound event or command as its own supervised task. Handlers
//! are fire-and-forget: nothing they report stops the loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::RepinConfig;
use crate::lifecycle::Reconciler;
use crate::persistence::{DESIRED_SET_KEY, DesiredPinSet, PinSetWriter, PinStore, StoreError};
use crate::runtime::{InboundCommand, Runtime, RuntimeEvent};

/// One unit of work for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppInput {
    Event(RuntimeEvent),
    Command(InboundCommand),
}

impl From<RuntimeEvent> for AppInput {
    fn from(event: RuntimeEvent) -> Self {
        Self::Event(event)
    }
}

impl From<InboundCommand> for AppInput {
    fn from(command: InboundCommand) -> Self {
        Self::Command(command)
    }
}

pub struct RepinApp {
    reconciler: Arc<Reconciler>,
    store: Arc<dyn PinStore>,
    /// Stops the input loop and the writer task.
    cancel: CancellationToken,
    /// In-flight handler tasks.
    workers: JoinSet<()>,
    writer_task: Option<JoinHandle<()>>,
}

impl RepinApp {
    /// Build the state and spawn the writer. Must be called inside a tokio
    /// runtime.
    pub fn start(runtime: Arc<dyn Runtime>, store: Arc<dyn PinStore>, config: &RepinConfig) -> Self {
        let cancel = CancellationToken::new();
        let (writer, writer_task) =
            PinSetWriter::spawn(store.clone(), config.writer_queue_capacity, cancel.clone());
        let reconciler = Arc::new(Reconciler::new(runtime, store.clone(), writer, config));
        log::debug!("app: started");
        Self {
            reconciler,
            store,
            cancel,
            workers: JoinSet::new(),
            writer_task: Some(writer_task),
        }
    }

    /// Seed an empty desired set on first run. Returns whether it wrote.
    pub async fn initialize(&self) -> Result<bool, StoreError> {
        if self.store.get(DESIRED_SET_KEY).await?.is_some() {
            return Ok(false);
        }
        self.store
            .set(DESIRED_SET_KEY, DesiredPinSet::default().to_value())
            .await?;
        log::info!("app: initialized empty desired set");
        Ok(true)
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.workers.len()
    }

    /// Run `input` on its own task. Finished tasks are reaped on the way.
    pub fn dispatch(&mut self, input: impl Into<AppInput>) {
        let input = input.into();
        let reconciler = self.reconciler.clone();
        self.workers.spawn(async move {
            match input {
                AppInput::Event(event) => {
                    let outcome = reconciler.handle_event(event).await;
                    log::debug!("app: event handled: {outcome:?}");
                },
                AppInput::Command(command) => {
                    let outcome = reconciler.handle_command(command).await;
                    log::debug!("app: command handled: {outcome:?}");
                },
            }
        });
        while let Some(result) = self.workers.try_join_next() {
            reap(result);
        }
    }

    /// Consume `inputs` until the channel closes or the app is cancelled.
    pub async fn run(&mut self, mut inputs: mpsc::Receiver<AppInput>) {
        let cancel = self.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("app: input loop cancelled");
                    break;
                }
                input = inputs.recv() => match input {
                    Some(input) => self.dispatch(input),
                    None => {
                        log::debug!("app: input channel closed");
                        break;
                    }
                },
                Some(result) = self.workers.join_next(), if !self.workers.is_empty() => reap(result),
            }
        }
    }

    /// Wait for every in-flight handler to finish.
    pub async fn settle(&mut self) {
        while let Some(result) = self.workers.join_next().await {
            reap(result);
        }
    }

    /// Let in-flight handlers finish, then stop the writer.
    pub async fn shutdown(mut self) {
        log::debug!("app: shutdown requested, {} handlers in flight", self.workers.len());
        self.settle().await;
        self.cancel.cancel();
        if let Some(writer_task) = self.writer_task.take()
            && let Err(e) = writer_task.await
        {
            log::error!("app: writer task failed ({e})");
        }
        log::debug!("app: shut down");
    }
}

fn reap(result: Result<(), JoinError>) {
    if let Err(e) = result {
        log::error!("app: handler task failed ({e})");
    }
}

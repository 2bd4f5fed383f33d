/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Keeps an ordered set of pinned resources alive inside a browser runtime
//! that freely destroys, recreates and renumbers them.

pub mod app;
pub mod config;
pub mod lifecycle;
pub mod persistence;
pub mod runtime;
pub mod services;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(feature = "test-utils")]
pub mod test_utils {
    pub use crate::persistence::MemoryPinStore;
    pub use crate::runtime::fake::{CommandKind, FakeRuntime, RuntimeCommand};
}

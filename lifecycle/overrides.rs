/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! One-shot exemptions.

use std::collections::HashSet;

use crate::runtime::EntityId;

/// User-authorized closures ("close only this time", "close and remove").
///
/// An entry suppresses auto-restore for exactly one removal of its entity.
/// A second disappearance of the same id is treated as unauthorized.
#[derive(Debug, Default)]
pub struct OverrideLedger {
    granted: HashSet<EntityId>,
}

impl OverrideLedger {
    pub fn grant_once(&mut self, id: EntityId) {
        self.granted.insert(id);
    }

    /// Returns `true` and deletes the entry if one was granted.
    pub fn consume(&mut self, id: EntityId) -> bool {
        self.granted.remove(&id)
    }

    pub fn is_granted(&self, id: EntityId) -> bool {
        self.granted.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.granted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.granted.is_empty()
    }
}

/// Unpins issued by the engine itself.
///
/// The runtime reports them back as ordinary pin-state changes; consuming
/// the expectation keeps those echoes from rewriting the desired set.
#[derive(Debug, Default)]
pub struct PinEchoLedger {
    expected_unpins: HashSet<EntityId>,
}

impl PinEchoLedger {
    pub fn expect_unpin(&mut self, id: EntityId) {
        self.expected_unpins.insert(id);
    }

    pub fn consume(&mut self, id: EntityId) -> bool {
        self.expected_unpins.remove(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.expected_unpins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_is_consumed_exactly_once() {
        let mut ledger = OverrideLedger::default();
        ledger.grant_once(EntityId(3));
        ledger.grant_once(EntityId(3));

        assert!(ledger.is_granted(EntityId(3)));
        assert!(ledger.consume(EntityId(3)));
        assert!(!ledger.consume(EntityId(3)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn override_for_other_entity_does_not_apply() {
        let mut ledger = OverrideLedger::default();
        ledger.grant_once(EntityId(1));

        assert!(!ledger.consume(EntityId(2)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn pin_echo_is_one_shot() {
        let mut echoes = PinEchoLedger::default();
        echoes.expect_unpin(EntityId(9));

        assert!(echoes.consume(EntityId(9)));
        assert!(!echoes.consume(EntityId(9)));
        assert!(echoes.is_empty());
    }
}

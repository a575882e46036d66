//! The in-flight set named in spec.md §4.F/§9: which MACs currently
//! have a GATT session open. Spec.md §9 explicitly flags the source's
//! single `device_being_processed` boolean as racy across two
//! scanners and asks that it not be reproduced; this is a small
//! mutex-guarded `HashSet` shared between every Scanner and the
//! Connector instead (P6, P7).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use blerecon_domain::Mac;

#[derive(Clone, Default)]
pub struct InFlightSet(Arc<Mutex<HashSet<Mac>>>);

impl InFlightSet {
    #[must_use]
    pub fn new() -> Self {
        InFlightSet::default()
    }

    #[must_use]
    pub fn contains(&self, mac: &Mac) -> bool {
        self.0.lock().expect("in-flight lock poisoned").contains(mac)
    }

    /// Returns `true` if `mac` was newly inserted (i.e. it was not
    /// already in-flight).
    pub fn insert(&self, mac: Mac) -> bool {
        self.0.lock().expect("in-flight lock poisoned").insert(mac)
    }

    pub fn remove(&self, mac: &Mac) {
        self.0.lock().expect("in-flight lock poisoned").remove(mac);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().expect("in-flight lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// RAII guard that removes `mac` from the set on every exit path,
/// including a cancelled Connector task (spec.md §5's cancellation
/// guarantee).
pub struct InFlightGuard {
    set: InFlightSet,
    mac: Mac,
}

impl InFlightGuard {
    /// Atomically reserves `mac`, returning `None` if it was already
    /// reserved. This is the only way to acquire a reservation that
    /// wasn't already held — callers must not proceed on `None`.
    #[must_use]
    pub fn try_enter(set: InFlightSet, mac: Mac) -> Option<Self> {
        if set.insert(mac) {
            Some(InFlightGuard { set, mac })
        } else {
            None
        }
    }

    /// Wraps a reservation already made by [`InFlightSet::insert`]
    /// (e.g. the one the Scanner makes at enqueue time) so it is
    /// guaranteed to be released when this guard drops. Does not
    /// insert `mac` itself — the caller must already hold it.
    #[must_use]
    pub fn adopt(set: InFlightSet, mac: Mac) -> Self {
        InFlightGuard { set, mac }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.mac);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(n: u8) -> Mac {
        Mac::from_bytes([0xaa, 0xbb, 0xcc, 0xdd, 0xee, n])
    }

    #[test]
    fn a_mac_cannot_appear_twice() {
        let set = InFlightSet::new();
        assert!(set.insert(mac(1)));
        assert!(!set.insert(mac(1)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn guard_removes_on_drop() {
        let set = InFlightSet::new();
        {
            let _guard = InFlightGuard::try_enter(set.clone(), mac(2)).expect("not yet reserved");
            assert!(set.contains(&mac(2)));
        }
        assert!(!set.contains(&mac(2)));
    }

    #[test]
    fn a_second_concurrent_reservation_is_refused() {
        let set = InFlightSet::new();
        let _first = InFlightGuard::try_enter(set.clone(), mac(3)).expect("first reservation succeeds");
        assert!(InFlightGuard::try_enter(set.clone(), mac(3)).is_none());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn reservation_is_available_again_once_the_guard_drops() {
        let set = InFlightSet::new();
        {
            let _guard = InFlightGuard::try_enter(set.clone(), mac(4)).expect("first reservation succeeds");
        }
        assert!(InFlightGuard::try_enter(set.clone(), mac(4)).is_some());
    }
}

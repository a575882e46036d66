use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Instant;

/// Freshness window named in spec.md §4.B/§9: a location fix older than
/// this is considered stale.
pub const LOCATION_FRESHNESS_SECS: u64 = 300;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LocationStatus {
    Online,
    Offline,
}

struct LocationFix {
    lat: f64,
    lon: f64,
    at: Instant,
}

/// Process-wide runtime state (spec.md §3 "Runtime state", §4.B).
/// Readers (the Scanner, on every advertisement) are cheap: the hot
/// path only takes a short read lock on the location fix. Writers
/// (Location Ingress, Supervisor, Connector workers) take a short
/// mutation lock; there is no long-lived handle shared across tasks.
pub struct RuntimeState {
    location: RwLock<Option<LocationFix>>,
    location_status: AtomicBool, // true = online
    scanning_started: AtomicBool,
    use_location: bool,
    max_concurrent_connects: usize,
}

impl RuntimeState {
    #[must_use]
    pub fn new(use_location: bool, max_concurrent_connects: usize) -> Self {
        RuntimeState {
            location: RwLock::new(None),
            location_status: AtomicBool::new(false),
            scanning_started: AtomicBool::new(false),
            use_location,
            max_concurrent_connects: max_concurrent_connects.max(1),
        }
    }

    pub fn use_location(&self) -> bool {
        self.use_location
    }

    pub fn max_concurrent_connects(&self) -> usize {
        self.max_concurrent_connects
    }

    /// Called by the Location Ingress's `POST /gps` handler.
    pub fn record_location(&self, lat: f64, lon: f64) {
        let mut guard = self.location.write().expect("location lock poisoned");
        *guard = Some(LocationFix { lat, lon, at: Instant::now() });
    }

    /// spec.md §4.B fresh-location predicate (P5): false whenever
    /// `use_location` is false, otherwise true iff the last fix is no
    /// older than [`LOCATION_FRESHNESS_SECS`].
    #[must_use]
    pub fn is_location_fresh(&self) -> bool {
        if !self.use_location {
            return false;
        }
        let guard = self.location.read().expect("location lock poisoned");
        match guard.as_ref() {
            Some(fix) => fix.at.elapsed().as_secs() <= LOCATION_FRESHNESS_SECS,
            None => false,
        }
    }

    /// The GPS stamp the Scanner attaches to an observation (spec.md
    /// §4.E step 3), present only while the fix is fresh.
    #[must_use]
    pub fn fresh_location(&self) -> Option<(f64, f64)> {
        if !self.is_location_fresh() {
            return None;
        }
        let guard = self.location.read().expect("location lock poisoned");
        guard.as_ref().map(|fix| (fix.lat, fix.lon))
    }

    /// The background ticker in `blerecon-location` calls this once a
    /// second (spec.md §4.C) and the return value tells it whether the
    /// status just changed, so it can log the transition once.
    pub fn refresh_location_status(&self) -> Option<LocationStatus> {
        let fresh = self.is_location_fresh();
        let previous = self.location_status.swap(fresh, Ordering::SeqCst);
        if previous == fresh {
            None
        } else {
            Some(if fresh { LocationStatus::Online } else { LocationStatus::Offline })
        }
    }

    #[must_use]
    pub fn location_status(&self) -> LocationStatus {
        if self.location_status.load(Ordering::SeqCst) {
            LocationStatus::Online
        } else {
            LocationStatus::Offline
        }
    }

    pub fn set_scanning_started(&self, started: bool) {
        self.scanning_started.store(started, Ordering::SeqCst);
    }

    #[must_use]
    pub fn scanning_started(&self) -> bool {
        self.scanning_started.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_predicate_false_when_location_disabled() {
        let state = RuntimeState::new(false, 5);
        state.record_location(10.0, 20.0);
        assert!(!state.is_location_fresh());
        assert_eq!(state.fresh_location(), None);
    }

    #[test]
    fn fresh_predicate_true_immediately_after_a_fix() {
        let state = RuntimeState::new(true, 5);
        state.record_location(10.0, 20.0);
        assert!(state.is_location_fresh());
        assert_eq!(state.fresh_location(), Some((10.0, 20.0)));
    }

    #[test]
    fn fresh_predicate_false_with_no_fix_yet() {
        let state = RuntimeState::new(true, 5);
        assert!(!state.is_location_fresh());
    }

    #[test]
    fn status_change_reported_once() {
        let state = RuntimeState::new(true, 5);
        assert_eq!(state.refresh_location_status(), None); // offline -> offline
        state.record_location(1.0, 2.0);
        assert_eq!(state.refresh_location_status(), Some(LocationStatus::Online));
        assert_eq!(state.refresh_location_status(), None); // stays online
    }
}

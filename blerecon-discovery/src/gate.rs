//! The enrichment gate, spec.md §4.E step 6 / P8, pulled out as a
//! pure function so it can be unit tested without a radio.

use blerecon_domain::Mac;

use crate::in_flight::InFlightSet;

/// Session detections required before a device is considered for
/// enrichment (`bluetooth_scanner.py`'s `detection_threshold`).
pub const DETECTION_THRESHOLD: u32 = 3;

/// Minimum RSSI (closer-than-threshold) a device must advertise at to
/// qualify (`bluetooth_scanner.py`'s `rssi_threshold`).
pub const RSSI_THRESHOLD: i16 = -70;

/// spec.md §4.E.6 / P8's non-reservation conditions: whether `mac`
/// would be a candidate for enrichment, ignoring whether a GATT
/// session is already in flight for it.
#[must_use]
pub fn meets_detection_criteria(is_connect_adapter: bool, session_count: u32, rssi: i16, has_service: bool) -> bool {
    is_connect_adapter && session_count >= DETECTION_THRESHOLD && rssi >= RSSI_THRESHOLD && !has_service
}

/// spec.md §4.F's "at most one in-flight GATT session per MAC"
/// invariant: the detection criteria and the in-flight reservation
/// must be checked and claimed in the same step, not in two steps
/// with a gap a second advertisement can land in. A MAC that still
/// qualifies on every later advertisement (session count only grows)
/// must not be reserved twice just because the first reservation is
/// still queued behind the Connector's semaphore.
#[must_use]
pub fn try_reserve_for_enrichment(
    is_connect_adapter: bool,
    session_count: u32,
    rssi: i16,
    has_service: bool,
    in_flight: &InFlightSet,
    mac: Mac,
) -> bool {
    meets_detection_criteria(is_connect_adapter, session_count, rssi, has_service) && in_flight.insert(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(n: u8) -> Mac {
        Mac::from_bytes([0xaa, 0xbb, 0xcc, 0xdd, 0xee, n])
    }

    #[test]
    fn qualifies_once_every_condition_holds() {
        assert!(meets_detection_criteria(true, 3, -70, false));
    }

    #[test]
    fn rejects_when_not_the_connect_adapter() {
        assert!(!meets_detection_criteria(false, 10, -40, false));
    }

    #[test]
    fn rejects_below_detection_threshold() {
        assert!(!meets_detection_criteria(true, 2, -40, false));
    }

    #[test]
    fn rejects_weak_signal() {
        assert!(!meets_detection_criteria(true, 5, -71, false));
    }

    #[test]
    fn rejects_already_enriched() {
        assert!(!meets_detection_criteria(true, 5, -40, true));
    }

    #[test]
    fn reservation_is_refused_while_already_in_flight() {
        let in_flight = InFlightSet::new();
        assert!(in_flight.insert(mac(1)));
        assert!(!try_reserve_for_enrichment(true, 5, -40, false, &in_flight, mac(1)));
    }

    #[test]
    fn a_second_advertisement_cannot_reserve_a_mac_still_queued_on_the_first() {
        let in_flight = InFlightSet::new();
        // First qualifying advertisement reserves the MAC, exactly as
        // `Scanner::handle_event` does before handing it to the
        // Connector's queue.
        assert!(try_reserve_for_enrichment(true, 3, -40, false, &in_flight, mac(2)));
        // The Connector hasn't picked it up yet (permits all held), but
        // the device is still advertising and still clears every
        // non-reservation condition. It must not be reserved twice.
        assert!(!try_reserve_for_enrichment(true, 4, -40, false, &in_flight, mac(2)));
        assert_eq!(in_flight.len(), 1);
    }

    #[test]
    fn does_not_reserve_when_criteria_fail() {
        let in_flight = InFlightSet::new();
        assert!(!try_reserve_for_enrichment(true, 1, -40, false, &in_flight, mac(3)));
        assert!(in_flight.is_empty());
    }
}

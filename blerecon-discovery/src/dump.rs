//! Textual GATT dump rendering, spec.md §4.F.3, normative format taken
//! from `device_connector.py`'s per-service/per-characteristic writer
//! (§2 of SPEC_FULL.md). Split out as a pure function over already-read
//! values so it can be unit tested without a real peripheral.

use std::fmt::Write as _;

use btleplug::api::CharPropFlags;
use uuid::Uuid;

/// One characteristic's rendered line: its UUID, properties, and
/// either the bytes read back or the error the read failed with.
/// `value` is `None` for characteristics without the READ property,
/// which are listed but never attempted.
pub struct CharacteristicReading {
    pub uuid: Uuid,
    pub properties: CharPropFlags,
    pub value: Option<Result<Vec<u8>, String>>,
}

pub struct ServiceReading {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicReading>,
}

/// Renders the deterministic dump spec.md §4.F.3 calls for. `uuidstr_to_str`
/// (the source's human GATT name lookup) has no equivalent crate in this
/// workspace's dependency set, so names fall back to the raw UUID
/// (documented in DESIGN.md).
#[must_use]
pub fn render(services: &[ServiceReading]) -> String {
    let mut out = String::new();
    for service in services {
        let _ = writeln!(out, "Service: {uuid} (UUID: {uuid})", uuid = service.uuid);
        for ch in &service.characteristics {
            let _ = writeln!(out, "  \u{251c}\u{2500} Characteristic: {}", ch.uuid);
            let _ = writeln!(out, "     Properties: {:?}", ch.properties);
            match &ch.value {
                Some(Ok(bytes)) => {
                    let _ = writeln!(out, "     Value: {}", render_value(bytes));
                }
                Some(Err(e)) => {
                    let _ = writeln!(out, "     Read error: {e}");
                }
                None => {
                    let _ = writeln!(out, "     Value: (not readable)");
                }
            }
        }
    }
    out
}

fn render_value(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.chars().all(|c| !c.is_control() || c == '\n') => s.to_string(),
        _ => bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_readable_and_unreadable_and_failed_characteristics() {
        let battery = Uuid::parse_str("00002a19-0000-1000-8000-00805f9b34fb").unwrap();
        let name = Uuid::parse_str("00002a00-0000-1000-8000-00805f9b34fb").unwrap();
        let broken = Uuid::parse_str("00002a01-0000-1000-8000-00805f9b34fb").unwrap();
        let service_uuid = Uuid::parse_str("0000180f-0000-1000-8000-00805f9b34fb").unwrap();

        let dump = render(&[ServiceReading {
            uuid: service_uuid,
            characteristics: vec![
                CharacteristicReading {
                    uuid: battery,
                    properties: CharPropFlags::READ,
                    value: Some(Ok(vec![0x00, 0x01])),
                },
                CharacteristicReading {
                    uuid: name,
                    properties: CharPropFlags::WRITE,
                    value: None,
                },
                CharacteristicReading {
                    uuid: broken,
                    properties: CharPropFlags::READ,
                    value: Some(Err("gatt error: timed out".to_string())),
                },
            ],
        }]);

        assert!(dump.contains("Service: 0000180f"));
        assert!(dump.contains("Characteristic: 00002a19"));
        assert!(dump.contains("Value: 0001"));
        assert!(dump.contains("Value: (not readable)"));
        assert!(dump.contains("Read error: gatt error: timed out"));
    }

    #[test]
    fn empty_service_list_renders_empty_text() {
        assert_eq!(render(&[]), "");
    }
}

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::mac::{is_mac_address, Mac};

/// Sentinel RSSI for "unknown", per spec.md §3.
pub const UNKNOWN_RSSI: i16 = -100;

/// A single normalized advertisement frame, as produced by the Scanner
/// (spec.md §4.E step 1) before it becomes a `DeviceObservation`.
#[derive(Clone, Debug, PartialEq)]
pub struct Advertisement {
    pub address: Mac,
    pub local_name: Option<String>,
    pub rssi: Option<i16>,
    pub tx_power: Option<i16>,
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
    pub service_uuids: Vec<String>,
    pub service_data: BTreeMap<String, Vec<u8>>,
    pub platform_data: Option<String>,
    pub adapter: String,
    pub timestamp: NaiveDateTime,
}

impl Advertisement {
    /// `device_name := name if present and not itself a MAC, else "Unknown"`
    /// (spec.md §4.E step 2).
    #[must_use]
    pub fn device_name(&self) -> String {
        match &self.local_name {
            Some(name) if !is_mac_address(name) => name.clone(),
            _ => "Unknown".to_string(),
        }
    }

    #[must_use]
    pub fn rssi_or_unknown(&self) -> i16 {
        self.rssi.unwrap_or(UNKNOWN_RSSI)
    }

    #[must_use]
    pub fn tx_power_text(&self) -> String {
        match self.tx_power {
            Some(p) => p.to_string(),
            None => "Unknown".to_string(),
        }
    }

    /// Opaque textual rendering of `manufacturer_data`, round-trippable
    /// via [`parse_manufacturer_data`].
    #[must_use]
    pub fn manufacturer_data_text(&self) -> String {
        serde_json::to_string(&self.manufacturer_data).unwrap_or_default()
    }

    #[must_use]
    pub fn service_uuids_text(&self) -> String {
        serde_json::to_string(&self.service_uuids).unwrap_or_default()
    }

    #[must_use]
    pub fn service_data_text(&self) -> String {
        serde_json::to_string(&self.service_data).unwrap_or_default()
    }
}

/// Inverse of [`Advertisement::manufacturer_data_text`], used by tests and
/// by any future consumer that needs the opaque column back as structured
/// data.
pub fn parse_manufacturer_data(text: &str) -> BTreeMap<u16, Vec<u8>> {
    serde_json::from_str(text).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> Advertisement {
        Advertisement {
            address: "aa:bb:cc:dd:ee:01".parse().unwrap(),
            local_name: Some("sensor".to_string()),
            rssi: Some(-55),
            tx_power: None,
            manufacturer_data: BTreeMap::from([(0x004c, vec![1, 2, 3])]),
            service_uuids: vec!["0000180d-0000-1000-8000-00805f9b34fb".to_string()],
            service_data: BTreeMap::new(),
            platform_data: None,
            adapter: "hci0".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn device_name_passes_through_real_names() {
        assert_eq!(sample().device_name(), "sensor");
    }

    #[test]
    fn device_name_falls_back_when_name_is_a_mac() {
        let mut adv = sample();
        adv.local_name = Some("AA:BB:CC:DD:EE:02".to_string());
        assert_eq!(adv.device_name(), "Unknown");
    }

    #[test]
    fn device_name_falls_back_when_absent() {
        let mut adv = sample();
        adv.local_name = None;
        assert_eq!(adv.device_name(), "Unknown");
    }

    #[test]
    fn manufacturer_data_round_trips() {
        let adv = sample();
        let text = adv.manufacturer_data_text();
        let parsed = parse_manufacturer_data(&text);
        assert_eq!(parsed, adv.manufacturer_data);
    }

    #[test]
    fn rssi_defaults_to_sentinel() {
        let mut adv = sample();
        adv.rssi = None;
        assert_eq!(adv.rssi_or_unknown(), UNKNOWN_RSSI);
    }
}

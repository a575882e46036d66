use chrono::NaiveDateTime;

use crate::advertisement::Advertisement;
use crate::mac::Mac;

/// Textual time format used everywhere a `timestamp` or
/// `last_count_update` crosses the Store boundary (spec.md §3).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The row-shaped view the Store persists for an advertisement sighting.
/// Built from an [`Advertisement`] plus a location stamp (spec.md §3).
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceObservation {
    pub mac: Mac,
    pub name: String,
    pub rssi: i16,
    pub timestamp: NaiveDateTime,
    pub adapter: String,
    pub manufacturer_data: String,
    pub service_uuids: String,
    pub service_data: String,
    pub tx_power: String,
    pub platform_data: Option<String>,
    pub gps: Option<(f64, f64)>,
}

impl DeviceObservation {
    #[must_use]
    pub fn from_advertisement(adv: &Advertisement, gps: Option<(f64, f64)>) -> Self {
        DeviceObservation {
            mac: adv.address,
            name: adv.device_name(),
            rssi: adv.rssi_or_unknown(),
            timestamp: adv.timestamp,
            adapter: adv.adapter.clone(),
            manufacturer_data: adv.manufacturer_data_text(),
            service_uuids: adv.service_uuids_text(),
            service_data: adv.service_data_text(),
            tx_power: adv.tx_power_text(),
            platform_data: adv.platform_data.clone(),
            gps,
        }
    }

    /// `"<lat>, <lon>"` as spec.md §3 requires, or absent.
    #[must_use]
    pub fn gps_text(&self) -> Option<String> {
        self.gps.map(|(lat, lon)| format!("{lat}, {lon}"))
    }

    #[must_use]
    pub fn timestamp_text(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

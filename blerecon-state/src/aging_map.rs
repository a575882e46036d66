use std::collections::HashMap;
use std::path::Path;

use blerecon_domain::{Mac, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;

/// Process-restart bootstrap for the aging-window rule (spec.md §3,
/// §6, §9). The source persisted this as a pickle file; the
/// redesign note in §9 calls for a plain textual mapping instead, so
/// the on-disk format here is one `MAC TIMESTAMP` pair per line,
/// language-neutral and human-repairable. Absence of the file is
/// equivalent to an empty map.
#[derive(Default, Debug, Clone)]
pub struct AgingMap {
    entries: HashMap<Mac, NaiveDateTime>,
}

impl AgingMap {
    #[must_use]
    pub fn load_from(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return AgingMap::default();
        };
        let mut entries = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((mac_text, ts_text)) = line.split_once(' ') else {
                tracing::warn!(line, "skipping malformed aging-map line");
                continue;
            };
            let (Ok(mac), Ok(ts)) = (
                mac_text.parse::<Mac>(),
                NaiveDateTime::parse_from_str(ts_text, TIMESTAMP_FORMAT),
            ) else {
                tracing::warn!(line, "skipping malformed aging-map line");
                continue;
            };
            entries.insert(mac, ts);
        }
        AgingMap { entries }
    }

    pub fn save_to(&self, path: &Path) {
        let mut text = String::new();
        for (mac, ts) in &self.entries {
            text.push_str(&format!("{mac} {}\n", ts.format(TIMESTAMP_FORMAT)));
        }
        if let Err(e) = std::fs::write(path, text) {
            tracing::error!(error = %e, "failed to flush aging map to disk");
        }
    }

    pub fn get(&self, mac: &Mac) -> Option<NaiveDateTime> {
        self.entries.get(mac).copied()
    }

    pub fn set(&mut self, mac: Mac, ts: NaiveDateTime) {
        self.entries.insert(mac, ts);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("blerecon-aging-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("device_last_count_update.txt");

        let mut map = AgingMap::default();
        let mac: Mac = "aa:bb:cc:dd:ee:01".parse().unwrap();
        let ts = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        map.set(mac, ts);
        map.save_to(&path);

        let loaded = AgingMap::load_from(&path);
        assert_eq!(loaded.get(&mac), Some(ts));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_is_an_empty_map() {
        let map = AgingMap::load_from(Path::new("/nonexistent/device_last_count_update.txt"));
        assert!(map.is_empty());
    }
}

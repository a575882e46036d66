//! Persistent catalogue of devices and GATT dumps (spec.md §4.A).
//!
//! Every public method here catches storage engine errors itself,
//! logs them, and returns the neutral value the spec calls for; the
//! scan/connect pipeline above this crate never sees an `sqlx::Error`.

mod error;

use std::path::Path;

use blerecon_domain::{DeviceObservation, GattDump, Mac, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

pub use error::StoreError;

/// The aging window named in spec.md §3/§4.A/§9: repeated sightings of
/// the same MAC within this many seconds of the last count bump do not
/// increase `detection_count`. The spec's Open Question (600s vs
/// 1800s) is resolved in favor of the canonical 1800s value.
pub const AGING_WINDOW_SECS: i64 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    New,
    Updated,
    Exists,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: i64,
    pub named: i64,
    pub with_service: i64,
}

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// spec.md §4.A `initialize()`: create the containers if missing,
    /// run additive migrations. Idempotent.
    pub async fn initialize(path: &Path) -> Result<Self, StoreError> {
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new().connect(&url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Store { pool })
    }

    /// In-memory store for tests; skips the filesystem entirely.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Store { pool })
    }

    pub async fn exists(&self, mac: &Mac) -> bool {
        match self.row_exists(mac).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, %mac, "store error checking existence");
                false
            }
        }
    }

    async fn row_exists(&self, mac: &Mac) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices WHERE mac = ?")
            .bind(mac.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// spec.md §4.A `upsert_observation`, the advertisement-only call
    /// path: `service` is never supplied, so I4 holds by construction.
    pub async fn record_advertisement(
        &self,
        obs: &DeviceObservation,
        update_existing: bool,
    ) -> UpsertOutcome {
        match self.try_record_advertisement(obs, update_existing).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, mac = %obs.mac, "store error recording advertisement");
                UpsertOutcome::Exists
            }
        }
    }

    async fn try_record_advertisement(
        &self,
        obs: &DeviceObservation,
        update_existing: bool,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        if !self.row_exists(&obs.mac).await? {
            self.insert_row(obs).await?;
            return Ok(UpsertOutcome::New);
        }
        if !update_existing {
            return Ok(UpsertOutcome::Exists);
        }
        self.update_row(
            &obs.mac,
            obs.timestamp,
            UpdateFields {
                name: Some(&obs.name),
                rssi: Some(obs.rssi),
                adapter: Some(&obs.adapter),
                manufacturer_data: Some(&obs.manufacturer_data),
                service_uuids: Some(&obs.service_uuids),
                service_data: Some(&obs.service_data),
                tx_power: Some(&obs.tx_power),
                platform_data: obs.platform_data.as_deref(),
                gps: obs.gps_text().as_deref(),
                service: None,
            },
        )
        .await?;
        Ok(UpsertOutcome::Updated)
    }

    async fn insert_row(&self, obs: &DeviceObservation) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO devices (
                name, mac, rssi, timestamp, adapter, manufacturer_data,
                service_uuids, service_data, tx_power, platform_data, gps,
                service, detection_count, last_count_update
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, 1, ?)",
        )
        .bind(&obs.name)
        .bind(obs.mac.to_string())
        .bind(obs.rssi)
        .bind(obs.timestamp_text())
        .bind(&obs.adapter)
        .bind(&obs.manufacturer_data)
        .bind(&obs.service_uuids)
        .bind(&obs.service_data)
        .bind(&obs.tx_power)
        .bind(&obs.platform_data)
        .bind(obs.gps_text())
        .bind(obs.timestamp_text())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// spec.md §4.F.4: writes the secondary `gatt_dumps` table,
    /// atomic per MAC via `INSERT ... ON CONFLICT`.
    pub async fn upsert_gatt_dump(&self, mac: &Mac, dump: &GattDump) -> bool {
        match self.try_upsert_gatt_dump(mac, dump).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, %mac, "store error writing gatt dump");
                false
            }
        }
    }

    async fn try_upsert_gatt_dump(&self, mac: &Mac, dump: &GattDump) -> Result<(), sqlx::Error> {
        let now = chrono::Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string();
        sqlx::query(
            "INSERT INTO gatt_dumps (mac, dump, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(mac) DO UPDATE SET dump = excluded.dump, updated_at = excluded.updated_at",
        )
        .bind(mac.to_string())
        .bind(dump.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// spec.md §4.F.4: updates only `devices.service` (and `adapter`/
    /// `timestamp`, matching the source's enrichment write), leaving
    /// every advertisement-only field untouched so I4/P3 hold.
    pub async fn record_enrichment(
        &self,
        mac: &Mac,
        dump: &GattDump,
        adapter: &str,
        timestamp: NaiveDateTime,
    ) {
        if let Err(e) = self.try_record_enrichment(mac, dump, adapter, timestamp).await {
            tracing::error!(error = %e, %mac, "store error recording enrichment");
        }
    }

    async fn try_record_enrichment(
        &self,
        mac: &Mac,
        dump: &GattDump,
        adapter: &str,
        timestamp: NaiveDateTime,
    ) -> Result<(), sqlx::Error> {
        if !self.row_exists(mac).await? {
            tracing::warn!(%mac, "enrichment for unknown device, dropping");
            return Ok(());
        }
        self.update_row(
            mac,
            timestamp,
            UpdateFields {
                name: None,
                rssi: None,
                adapter: Some(adapter),
                manufacturer_data: None,
                service_uuids: None,
                service_data: None,
                tx_power: None,
                platform_data: None,
                gps: None,
                service: Some(dump.as_str()),
            },
        )
        .await
    }

    /// Shared UPDATE core: builds the SET list from only the fields
    /// actually supplied, and applies the aging-window rule (I2, I3,
    /// P1, P2) to `detection_count`/`last_count_update`.
    async fn update_row(
        &self,
        mac: &Mac,
        incoming_ts: NaiveDateTime,
        fields: UpdateFields<'_>,
    ) -> Result<(), sqlx::Error> {
        let row = sqlx::query("SELECT detection_count, last_count_update FROM devices WHERE mac = ?")
            .bind(mac.to_string())
            .fetch_one(&self.pool)
            .await?;
        let mut detection_count: i64 = row.try_get(0)?;
        let last_count_update: Option<String> = row.try_get(1)?;

        let should_increment = match &last_count_update {
            None => true,
            Some(text) => match NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT) {
                Ok(prev) => (incoming_ts - prev).num_seconds() >= AGING_WINDOW_SECS,
                Err(_) => true,
            },
        };
        let new_last_count_update = if should_increment {
            detection_count += 1;
            incoming_ts.format(TIMESTAMP_FORMAT).to_string()
        } else {
            last_count_update.unwrap_or_else(|| incoming_ts.format(TIMESTAMP_FORMAT).to_string())
        };

        let mut clauses: Vec<&str> = Vec::new();
        if fields.name.is_some() {
            clauses.push("name = ?");
        }
        if fields.rssi.is_some() {
            clauses.push("rssi = ?");
        }
        clauses.push("timestamp = ?");
        if fields.adapter.is_some() {
            clauses.push("adapter = ?");
        }
        if fields.manufacturer_data.is_some() {
            clauses.push("manufacturer_data = ?");
        }
        if fields.service_uuids.is_some() {
            clauses.push("service_uuids = ?");
        }
        if fields.service_data.is_some() {
            clauses.push("service_data = ?");
        }
        if fields.tx_power.is_some() {
            clauses.push("tx_power = ?");
        }
        if fields.platform_data.is_some() {
            clauses.push("platform_data = ?");
        }
        if fields.gps.is_some() {
            clauses.push("gps = ?");
        }
        if fields.service.is_some() {
            clauses.push("service = ?");
        }
        clauses.push("detection_count = ?");
        clauses.push("last_count_update = ?");

        let sql = format!("UPDATE devices SET {} WHERE mac = ?", clauses.join(", "));
        let mut query = sqlx::query(&sql);
        if let Some(v) = fields.name {
            query = query.bind(v);
        }
        if let Some(v) = fields.rssi {
            query = query.bind(v);
        }
        query = query.bind(incoming_ts.format(TIMESTAMP_FORMAT).to_string());
        if let Some(v) = fields.adapter {
            query = query.bind(v);
        }
        if let Some(v) = fields.manufacturer_data {
            query = query.bind(v);
        }
        if let Some(v) = fields.service_uuids {
            query = query.bind(v);
        }
        if let Some(v) = fields.service_data {
            query = query.bind(v);
        }
        if let Some(v) = fields.tx_power {
            query = query.bind(v);
        }
        if let Some(v) = fields.platform_data {
            query = query.bind(v);
        }
        if let Some(v) = fields.gps {
            query = query.bind(v);
        }
        if let Some(v) = fields.service {
            query = query.bind(v);
        }
        query = query.bind(detection_count);
        query = query.bind(new_last_count_update);
        query = query.bind(mac.to_string());
        query.execute(&self.pool).await?;
        Ok(())
    }

    /// spec.md §4.A `statistics()`.
    pub async fn statistics(&self) -> Stats {
        match self.try_statistics().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "store error computing statistics");
                Stats::default()
            }
        }
    }

    async fn try_statistics(&self) -> Result<Stats, sqlx::Error> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices")
            .fetch_one(&self.pool)
            .await?;
        let named: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices WHERE name != 'Unknown'")
            .fetch_one(&self.pool)
            .await?;
        let with_service: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM devices WHERE service IS NOT NULL AND service != ''",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(Stats { total, named, with_service })
    }

    /// spec.md §4.A `detection_count(mac)`.
    pub async fn detection_count(&self, mac: &Mac) -> i64 {
        let result: Result<Option<i64>, sqlx::Error> =
            sqlx::query_scalar("SELECT detection_count FROM devices WHERE mac = ?")
                .bind(mac.to_string())
                .fetch_optional(&self.pool)
                .await;
        match result {
            Ok(Some(count)) => count,
            Ok(None) => 0,
            Err(e) => {
                tracing::error!(error = %e, %mac, "store error reading detection count");
                0
            }
        }
    }

    /// spec.md §4.A `service_of(mac)`: empty and NULL both mean "no
    /// service yet" (used by the Scanner's enrichment gate, P8).
    pub async fn service_of(&self, mac: &Mac) -> Option<GattDump> {
        let result: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT service FROM devices WHERE mac = ?")
                .bind(mac.to_string())
                .fetch_optional(&self.pool)
                .await
                .map(|opt| opt.flatten());
        match result {
            Ok(Some(text)) if !text.trim().is_empty() => Some(GattDump::from(text)),
            Ok(_) => None,
            Err(e) => {
                tracing::error!(error = %e, %mac, "store error reading service");
                None
            }
        }
    }

    /// Every `(mac, last_count_update)` pair currently on record, used
    /// by the Supervisor to seed the on-disk aging map at clean
    /// shutdown (spec.md §3/§9: the Store's in-DB value is the
    /// authoritative source, the aging map file is a restart bootstrap
    /// copy of it).
    pub async fn all_last_count_updates(&self) -> Vec<(Mac, NaiveDateTime)> {
        match self.try_all_last_count_updates().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "store error reading aging snapshot");
                Vec::new()
            }
        }
    }

    async fn try_all_last_count_updates(&self) -> Result<Vec<(Mac, NaiveDateTime)>, sqlx::Error> {
        let rows: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT mac, last_count_update FROM devices")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(mac, ts)| {
                let mac: Mac = mac.parse().ok()?;
                let ts = NaiveDateTime::parse_from_str(&ts?, TIMESTAMP_FORMAT).ok()?;
                Some((mac, ts))
            })
            .collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

struct UpdateFields<'a> {
    name: Option<&'a str>,
    rssi: Option<i16>,
    adapter: Option<&'a str>,
    manufacturer_data: Option<&'a str>,
    service_uuids: Option<&'a str>,
    service_data: Option<&'a str>,
    tx_power: Option<&'a str>,
    platform_data: Option<&'a str>,
    gps: Option<&'a str>,
    service: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use blerecon_domain::Advertisement;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn adv(mac: &str, ts: NaiveDateTime, rssi: i16) -> Advertisement {
        Advertisement {
            address: mac.parse().unwrap(),
            local_name: Some("sensor".to_string()),
            rssi: Some(rssi),
            tx_power: None,
            manufacturer_data: BTreeMap::new(),
            service_uuids: vec![],
            service_data: BTreeMap::new(),
            platform_data: None,
            adapter: "hci0".to_string(),
            timestamp: ts,
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, s).unwrap()
    }

    #[tokio::test]
    async fn first_sight_inserts_with_count_one() {
        let store = Store::in_memory().await.unwrap();
        let obs = DeviceObservation::from_advertisement(
            &adv("aa:bb:cc:dd:ee:01", at(2025, 1, 1, 0, 0, 0), -55),
            None,
        );
        let outcome = store.record_advertisement(&obs, true).await;
        assert_eq!(outcome, UpsertOutcome::New);
        assert_eq!(store.detection_count(&obs.mac).await, 1);
        let stats = store.statistics().await;
        assert_eq!((stats.total, stats.named, stats.with_service), (1, 1, 0));
    }

    #[tokio::test]
    async fn name_matching_mac_pattern_becomes_unknown() {
        let store = Store::in_memory().await.unwrap();
        let mut a = adv("aa:bb:cc:dd:ee:02", at(2025, 1, 1, 0, 0, 0), -70);
        a.local_name = Some("AA:BB:CC:DD:EE:02".to_string());
        let obs = DeviceObservation::from_advertisement(&a, None);
        assert_eq!(obs.name, "Unknown");
        store.record_advertisement(&obs, true).await;
        let stats = store.statistics().await;
        assert_eq!((stats.total, stats.named), (1, 0));
    }

    #[tokio::test]
    async fn aging_window_suppresses_then_allows_increment() {
        let store = Store::in_memory().await.unwrap();
        let mac = "aa:bb:cc:dd:ee:01";
        let first = DeviceObservation::from_advertisement(&adv(mac, at(2025, 1, 1, 0, 0, 0), -55), None);
        store.record_advertisement(&first, true).await;

        let second = DeviceObservation::from_advertisement(&adv(mac, at(2025, 1, 1, 0, 15, 0), -55), None);
        store.record_advertisement(&second, true).await;
        assert_eq!(store.detection_count(&second.mac).await, 1);

        let third = DeviceObservation::from_advertisement(&adv(mac, at(2025, 1, 1, 0, 45, 0), -55), None);
        store.record_advertisement(&third, true).await;
        assert_eq!(store.detection_count(&third.mac).await, 2);
    }

    #[tokio::test]
    async fn update_existing_false_is_a_no_op_on_existing_row() {
        let store = Store::in_memory().await.unwrap();
        let mac = "aa:bb:cc:dd:ee:01";
        let first = DeviceObservation::from_advertisement(&adv(mac, at(2025, 1, 1, 0, 0, 0), -55), None);
        store.record_advertisement(&first, true).await;

        let second = DeviceObservation::from_advertisement(&adv(mac, at(2025, 1, 1, 1, 0, 0), -40), None);
        let outcome = store.record_advertisement(&second, false).await;
        assert_eq!(outcome, UpsertOutcome::Exists);
        assert_eq!(store.detection_count(&second.mac).await, 1);
    }

    #[tokio::test]
    async fn enrichment_never_clears_service_and_leaves_advertisement_fields_alone() {
        let store = Store::in_memory().await.unwrap();
        let mac: Mac = "aa:bb:cc:dd:ee:03".parse().unwrap();
        let first = DeviceObservation::from_advertisement(&adv("aa:bb:cc:dd:ee:03", at(2025, 1, 1, 0, 0, 0), -55), None);
        store.record_advertisement(&first, true).await;
        assert_eq!(store.service_of(&mac).await, None);

        let dump = GattDump::from("Service: Battery (UUID: 180f)".to_string());
        store.upsert_gatt_dump(&mac, &dump).await;
        store.record_enrichment(&mac, &dump, "hci0", at(2025, 1, 1, 0, 1, 0)).await;
        assert_eq!(store.service_of(&mac).await, Some(dump.clone()));

        let later = DeviceObservation::from_advertisement(&adv("aa:bb:cc:dd:ee:03", at(2025, 1, 1, 0, 2, 0), -60), None);
        store.record_advertisement(&later, true).await;
        assert_eq!(store.service_of(&mac).await, Some(dump));
    }

    #[tokio::test]
    async fn exists_reports_known_devices() {
        let store = Store::in_memory().await.unwrap();
        let mac: Mac = "aa:bb:cc:dd:ee:04".parse().unwrap();
        assert!(!store.exists(&mac).await);
        let obs = DeviceObservation::from_advertisement(&adv("aa:bb:cc:dd:ee:04", at(2025, 1, 1, 0, 0, 0), -55), None);
        store.record_advertisement(&obs, true).await;
        assert!(store.exists(&mac).await);
    }
}

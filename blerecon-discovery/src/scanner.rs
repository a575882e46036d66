//! The Scanner, spec.md §4.E: drives one adapter in passive scan mode
//! and turns its event stream into Store updates and connect
//! candidates.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use blerecon_domain::{Advertisement, DeviceObservation, Mac};
use blerecon_state::{LocationStatus, RuntimeState};
use blerecon_store::{Store, UpsertOutcome};
use btleplug::api::{Central, CentralEvent, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Peripheral};
use colored::Colorize;
use futures::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::gate::try_reserve_for_enrichment;
use crate::in_flight::InFlightSet;

/// How often `Store::statistics()` is logged (spec.md §4.E step 7).
const STATS_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// A peripheral that cleared the enrichment gate, handed off to the
/// Connector. Carries the already-resolved `btleplug` peripheral
/// handle so the Connector doesn't need to re-discover it.
pub struct ConnectCandidate {
    pub mac: Mac,
    pub peripheral: Peripheral,
    pub adapter_id: String,
}

pub struct Scanner {
    adapter: Adapter,
    adapter_id: String,
    store: Arc<Store>,
    runtime: Arc<RuntimeState>,
    in_flight: InFlightSet,
    connect_tx: Option<mpsc::UnboundedSender<ConnectCandidate>>,
    update_existing: bool,
    is_connect_adapter: bool,
    session_counts: HashMap<Mac, u32>,
}

impl Scanner {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapter: Adapter,
        adapter_id: String,
        store: Arc<Store>,
        runtime: Arc<RuntimeState>,
        in_flight: InFlightSet,
        connect_tx: Option<mpsc::UnboundedSender<ConnectCandidate>>,
        update_existing: bool,
        is_connect_adapter: bool,
    ) -> Self {
        Scanner {
            adapter,
            adapter_id,
            store,
            runtime,
            in_flight,
            connect_tx,
            update_existing,
            is_connect_adapter,
            session_counts: HashMap::new(),
        }
    }

    /// Runs the passive scan loop until `shutdown` fires. Never panics
    /// the Supervisor: a failure to start the adapter is logged and
    /// this returns (spec.md §4.E contract).
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        if let Err(e) = self.adapter.start_scan(ScanFilter::default()).await {
            tracing::error!(adapter = %self.adapter_id, error = %e, "failed to start scanner");
            return;
        }
        self.runtime.set_scanning_started(true);

        let mut events = match self.adapter.events().await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(adapter = %self.adapter_id, error = %e, "failed to subscribe to adapter events");
                self.runtime.set_scanning_started(false);
                return;
            }
        };

        let mut last_report = Instant::now();
        let mut last_status = self.runtime.location_status();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                event = events.next() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
            }

            let status = self.runtime.location_status();
            if status != last_status {
                print_status_change(status);
                last_status = status;
            }

            if last_report.elapsed() >= STATS_REPORT_INTERVAL {
                let stats = self.store.statistics().await;
                tracing::info!(
                    adapter = %self.adapter_id,
                    total = stats.total,
                    named = stats.named,
                    with_service = stats.with_service,
                    "{}",
                    "[INFO]".blue(),
                );
                last_report = Instant::now();
            }
        }

        if let Err(e) = self.adapter.stop_scan().await {
            tracing::warn!(adapter = %self.adapter_id, error = %e, "failed to stop scanner cleanly");
        }
        self.runtime.set_scanning_started(false);
    }

    async fn handle_event(&mut self, event: CentralEvent) {
        let id = match &event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id.clone(),
            _ => return,
        };

        let peripheral = match self.adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "could not resolve peripheral for event");
                return;
            }
        };
        let Ok(Some(properties)) = peripheral.properties().await else {
            return;
        };

        let mac = match properties.address.as_ref().try_into() {
            Ok(bytes) => Mac::from_bytes(bytes),
            Err(_) => return,
        };

        let manufacturer_data: BTreeMap<u16, Vec<u8>> = properties.manufacturer_data.into_iter().collect();
        let service_uuids: Vec<String> = properties.services.iter().map(ToString::to_string).collect();
        let service_data: BTreeMap<String, Vec<u8>> =
            properties.service_data.into_iter().map(|(uuid, data)| (uuid.to_string(), data)).collect();

        let advertisement = Advertisement {
            address: mac,
            local_name: properties.local_name,
            rssi: properties.rssi,
            tx_power: properties.tx_power_level,
            manufacturer_data,
            service_uuids,
            service_data,
            platform_data: None,
            adapter: self.adapter_id.clone(),
            timestamp: chrono::Local::now().naive_local(),
        };

        let gps = self.runtime.fresh_location();
        let observation = DeviceObservation::from_advertisement(&advertisement, gps);
        let rssi = observation.rssi;

        let session_count = {
            let counter = self.session_counts.entry(mac).or_insert(0);
            *counter += 1;
            *counter
        };

        let outcome = self.store.record_advertisement(&observation, self.update_existing).await;
        log_outcome(outcome, &mac);

        if let Some(tx) = &self.connect_tx {
            let has_service = self.store.service_of(&mac).await.is_some();
            // Reserving and deciding must happen together: this is the
            // one place that may claim `mac` in `self.in_flight`, so no
            // second advertisement for the same still-queued device can
            // slip through and spawn a duplicate GATT session.
            let reserved =
                try_reserve_for_enrichment(self.is_connect_adapter, session_count, rssi, has_service, &self.in_flight, mac);
            if reserved {
                let candidate = ConnectCandidate { mac, peripheral, adapter_id: self.adapter_id.clone() };
                if tx.send(candidate).is_err() {
                    self.in_flight.remove(&mac);
                }
            }
        }
    }
}

fn log_outcome(outcome: UpsertOutcome, mac: &Mac) {
    match outcome {
        UpsertOutcome::New => tracing::info!("{} {mac}", "[NEW]".green()),
        UpsertOutcome::Updated => tracing::info!("{} {mac}", "[UPDATED]".yellow()),
        UpsertOutcome::Exists => tracing::debug!("{} {mac}", "[exists]".yellow()),
    }
}

fn print_status_change(status: LocationStatus) {
    match status {
        LocationStatus::Online => tracing::info!("{}", "[GPS STATUS] online".cyan()),
        LocationStatus::Offline => tracing::warn!("{}", "[GPS STATUS] offline".red()),
    }
}

//! The Connector, spec.md §4.F: a bounded worker pool that drains the
//! connect queue, enumerates GATT services/characteristics, and
//! writes the result back to the Store.

use std::sync::Arc;
use std::time::Duration;

use blerecon_domain::GattDump;
use blerecon_store::Store;
use btleplug::api::{CharPropFlags, Peripheral as _};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::dump::{self, CharacteristicReading, ServiceReading};
use crate::in_flight::{InFlightGuard, InFlightSet};
use crate::scanner::ConnectCandidate;

/// Cooldown after each GATT session, spec.md §4.F step 6 ("backoff to
/// avoid hammering the radio").
const POST_CONNECT_BACKOFF: Duration = Duration::from_secs(1);

pub struct Connector {
    store: Arc<Store>,
    in_flight: InFlightSet,
    semaphore: Arc<Semaphore>,
}

impl Connector {
    #[must_use]
    pub fn new(store: Arc<Store>, in_flight: InFlightSet, max_concurrent_connects: usize) -> Self {
        Connector {
            store,
            in_flight,
            semaphore: Arc::new(Semaphore::new(max_concurrent_connects.max(1))),
        }
    }

    /// Drains `rx`, spawning one cancellable task per candidate
    /// (spec.md §4.F, §5). Exits once `shutdown` fires, aborting any
    /// tasks still in flight; their `InFlightGuard`s and semaphore
    /// permits are released by drop glue regardless (§5's
    /// cancellation guarantee).
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<ConnectCandidate>, mut shutdown: broadcast::Receiver<()>) {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                candidate = rx.recv() => {
                    match candidate {
                        Some(candidate) => {
                            let store = self.store.clone();
                            let in_flight = self.in_flight.clone();
                            let semaphore = self.semaphore.clone();
                            tasks.spawn(process(candidate, store, in_flight, semaphore));
                        }
                        None => break,
                    }
                }
            }
        }
        tasks.shutdown().await;
    }
}

async fn process(candidate: ConnectCandidate, store: Arc<Store>, in_flight: InFlightSet, semaphore: Arc<Semaphore>) {
    let Ok(permit) = semaphore.acquire_owned().await else {
        return;
    };
    // The Scanner already reserved `candidate.mac` in `in_flight` at
    // enqueue time (see `try_reserve_for_enrichment`); this guard only
    // takes ownership of releasing that reservation on every exit path.
    let _guard = InFlightGuard::adopt(in_flight, candidate.mac);

    let dump = match connect_and_enumerate(&candidate).await {
        Ok(dump) => Some(dump),
        Err(e) => {
            tracing::warn!(mac = %candidate.mac, error = %e, "gatt connection failed");
            None
        }
    };

    if let Some(dump) = dump {
        let dump = GattDump::from(dump);
        store.upsert_gatt_dump(&candidate.mac, &dump).await;
        store
            .record_enrichment(&candidate.mac, &dump, &candidate.adapter_id, chrono::Local::now().naive_local())
            .await;
    }

    let _ = candidate.peripheral.disconnect().await;
    tokio::time::sleep(POST_CONNECT_BACKOFF).await;
    drop(permit);
}

async fn connect_and_enumerate(candidate: &ConnectCandidate) -> Result<String, btleplug::Error> {
    candidate.peripheral.connect().await?;
    candidate.peripheral.discover_services().await?;

    let mut services = Vec::new();
    for service in candidate.peripheral.services() {
        let mut characteristics = Vec::new();
        for ch in &service.characteristics {
            let value = if ch.properties.contains(CharPropFlags::READ) {
                Some(candidate.peripheral.read(ch).await.map_err(|e| e.to_string()))
            } else {
                None
            };
            characteristics.push(CharacteristicReading { uuid: ch.uuid, properties: ch.properties, value });
        }
        services.push(ServiceReading { uuid: service.uuid, characteristics });
    }
    Ok(dump::render(&services))
}

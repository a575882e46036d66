//! The Supervisor, spec.md §4.G: owns startup ordering, wires
//! Scanner↔Connector queues, and handles graceful shutdown.

mod args;
mod logging;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use args::{Config, OperatingMode};
use blerecon_discovery::{Connector, ConnectCandidate, InFlightSet, Scanner};
use blerecon_radio::RadioInterface;
use blerecon_state::{AgingMap, RuntimeState};
use blerecon_store::Store;
use btleplug::api::Manager as _;
use btleplug::platform::{Adapter, Manager};
use clap::Parser;
use colored::Colorize;
use tokio::sync::{broadcast, mpsc};

const DB_PATH: &str = "bluetooth_devices.db";
const AGING_MAP_PATH: &str = "device_last_count_update.txt";
const APP_LOG_PATH: &str = "app.log";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(Path::new(APP_LOG_PATH))?;

    let config = args::Args::parse().resolve();

    // Step 1: Store.initialize()
    let store = Arc::new(Store::initialize(Path::new(DB_PATH)).await?);
    let aging_map = AgingMap::load_from(Path::new(AGING_MAP_PATH));
    tracing::info!(entries = aging_map.len(), "loaded aging map");

    let runtime = Arc::new(RuntimeState::new(config.use_gps, config.max_concurrent_connects));

    // Step 2: location ingress, block on first fix (no timeout: "we
    // don't start scanning until we know where we are").
    let mut location_tasks = Vec::new();
    if config.use_gps {
        let addr: SocketAddr = args::DEFAULT_GPS_ADDR.parse().expect("default gps addr is valid");
        let ingress = blerecon_location::spawn(addr, runtime.clone()).await?;
        tracing::info!("{}", "[INFO] waiting for first GPS fix".blue());
        let _ = ingress.first_fix.await;
        location_tasks.push(ingress.server);
        location_tasks.push(ingress.ticker);
    }

    // Step 3: enumerate radios.
    let radios = blerecon_radio::enumerate().await;
    if radios.is_empty() {
        tracing::error!("no Bluetooth adapters found");
        std::process::exit(1);
    }

    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    // Step 4: pick scan adapter (+ connect adapter in dual-radio mode).
    let plan = match resolve_plan(config.mode, &radios, &adapters) {
        Ok(plan) => plan,
        Err(message) => {
            tracing::error!("{message}");
            std::process::exit(1);
        }
    };

    run_pipeline(store.clone(), runtime.clone(), adapters, plan, &config).await;

    // Step 6: flush the aging map on clean shutdown.
    let snapshot = store.all_last_count_updates().await;
    let mut aging_map = aging_map;
    for (mac, ts) in snapshot {
        aging_map.set(mac, ts);
    }
    aging_map.save_to(Path::new(AGING_MAP_PATH));

    for task in location_tasks {
        task.abort();
    }
    store.close().await;
    Ok(())
}

enum Plan {
    ScanOnly { scan: usize },
    DualRadio { scan: usize, connect: usize },
    SingleRadioConnect { adapter: usize },
}

fn resolve_plan(mode: OperatingMode, radios: &[RadioInterface], adapters: &[Adapter]) -> Result<Plan, String> {
    let bound = radios.len().min(adapters.len());
    let check = |idx: usize| -> Result<(), String> {
        if idx >= bound {
            Err(format!("adapter index {idx} out of range (only {bound} adapters enumerated)"))
        } else {
            Ok(())
        }
    };

    match mode {
        OperatingMode::ScanOnly { scan_adapter } => {
            check(scan_adapter)?;
            Ok(Plan::ScanOnly { scan: scan_adapter })
        }
        OperatingMode::DualRadio { scan_adapter, connect_adapter } => {
            check(scan_adapter)?;
            check(connect_adapter)?;
            if scan_adapter == connect_adapter {
                return Err("scan-adapter and connect-adapter must differ in dual-radio mode".to_string());
            }
            Ok(Plan::DualRadio { scan: scan_adapter, connect: connect_adapter })
        }
        OperatingMode::SingleRadioConnect { adapter_index } => {
            check(adapter_index)?;
            Ok(Plan::SingleRadioConnect { adapter: adapter_index })
        }
    }
}

async fn run_pipeline(store: Arc<Store>, runtime: Arc<RuntimeState>, adapters: Vec<Adapter>, plan: Plan, config: &Config) {
    let in_flight = InFlightSet::new();
    let (shutdown_tx, _) = broadcast::channel(8);
    let mut handles = Vec::new();

    match plan {
        Plan::ScanOnly { scan } => {
            let scanner = Scanner::new(
                adapters[scan].clone(),
                format!("hci{scan}"),
                store.clone(),
                runtime.clone(),
                in_flight.clone(),
                None,
                config.update_existing,
                false,
            );
            handles.push(tokio::spawn(scanner.run(shutdown_tx.subscribe())));
        }
        Plan::DualRadio { scan, connect } => {
            let (tx, rx) = mpsc::unbounded_channel::<ConnectCandidate>();

            let scan_only = Scanner::new(
                adapters[scan].clone(),
                format!("hci{scan}"),
                store.clone(),
                runtime.clone(),
                in_flight.clone(),
                None,
                config.update_existing,
                false,
            );
            handles.push(tokio::spawn(scan_only.run(shutdown_tx.subscribe())));

            let connect_scanner = Scanner::new(
                adapters[connect].clone(),
                format!("hci{connect}"),
                store.clone(),
                runtime.clone(),
                in_flight.clone(),
                Some(tx),
                config.update_existing,
                true,
            );
            handles.push(tokio::spawn(connect_scanner.run(shutdown_tx.subscribe())));

            let connector = Connector::new(store.clone(), in_flight.clone(), config.max_concurrent_connects);
            handles.push(tokio::spawn(connector.run(rx, shutdown_tx.subscribe())));
        }
        Plan::SingleRadioConnect { adapter } => {
            let (tx, rx) = mpsc::unbounded_channel::<ConnectCandidate>();

            let scanner = Scanner::new(
                adapters[adapter].clone(),
                format!("hci{adapter}"),
                store.clone(),
                runtime.clone(),
                in_flight.clone(),
                Some(tx),
                config.update_existing,
                true,
            );
            handles.push(tokio::spawn(scanner.run(shutdown_tx.subscribe())));

            let connector = Connector::new(store.clone(), in_flight.clone(), config.max_concurrent_connects);
            handles.push(tokio::spawn(connector.run(rx, shutdown_tx.subscribe())));
        }
    }

    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("{}", "[INFO] shutdown requested".blue());
    }
    let _ = shutdown_tx.send(());
    for handle in handles {
        let _ = handle.await;
    }
}

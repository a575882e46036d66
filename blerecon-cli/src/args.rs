//! The CLI surface, spec.md §6. Every flag may also be supplied
//! interactively when omitted (the source's `input(...)` prompts);
//! [`Args::resolve`] does the prompting so the rest of the Supervisor
//! only ever sees a fully-resolved [`Config`].

use std::io::Write as _;

use clap::Parser;

/// Default `max_concurrent_connects` (spec.md §3).
pub const DEFAULT_MAX_CONNECT: usize = 5;

/// Default Location Ingress bind address (spec.md §4.C).
pub const DEFAULT_GPS_ADDR: &str = "0.0.0.0:5000";

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "BLE reconnaissance agent", long_about = None)]
pub struct Args {
    /// Enable location ingress and wait for the first fix (y/n).
    #[arg(long)]
    pub use_gps: Option<String>,

    /// 1 = single-radio scan-only, 2 = dual-radio scan+connect.
    #[arg(long)]
    pub mode: Option<u8>,

    /// Index into the enumerated adapter list, used as the scan adapter.
    #[arg(long)]
    pub scan_adapter: Option<usize>,

    /// Index into the enumerated adapter list, used as the connect adapter; must differ from scan-adapter.
    #[arg(long)]
    pub connect_adapter: Option<usize>,

    /// 1 = never overwrite an existing row's advertisement fields, 2 = always update them.
    #[arg(long)]
    pub update_mode: Option<u8>,

    /// Reserved: lets the scan adapter also enrich known devices (y/n). No-op (spec.md §9).
    #[arg(long)]
    pub helper_mode: Option<String>,

    /// Bound on concurrent GATT connections.
    #[arg(long)]
    pub max_connect: Option<usize>,

    /// Single-radio continuous scan+connect mode: one adapter index used for both roles.
    #[arg(long)]
    pub adapter_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    ScanOnly { scan_adapter: usize },
    DualRadio { scan_adapter: usize, connect_adapter: usize },
    SingleRadioConnect { adapter_index: usize },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub use_gps: bool,
    pub mode: OperatingMode,
    pub update_existing: bool,
    /// Reserved (spec.md §9): parsed and carried through, but no
    /// downstream behavior is defined for it yet.
    #[allow(dead_code)]
    pub helper_mode: bool,
    pub max_concurrent_connects: usize,
}

impl Args {
    /// Resolves every field to a concrete value, prompting on stdin
    /// for anything not passed on the command line (spec.md §6).
    pub fn resolve(self) -> Config {
        let use_gps = yes_no(self.use_gps, "Use GPS location? (y/n): ");
        let update_existing = self.update_mode.unwrap_or_else(|| prompt_u8("Update mode (1=keep existing, 2=overwrite): ")) == 2;
        let helper_mode = yes_no(self.helper_mode, "Helper mode? (y/n): ");
        let max_concurrent_connects = self.max_connect.unwrap_or(DEFAULT_MAX_CONNECT);

        let mode = if let Some(adapter_index) = self.adapter_index {
            OperatingMode::SingleRadioConnect { adapter_index }
        } else {
            match self.mode.unwrap_or_else(|| prompt_u8("Mode (1=scan only, 2=scan+connect): ")) {
                2 => OperatingMode::DualRadio {
                    scan_adapter: self.scan_adapter.unwrap_or_else(|| prompt_usize("Scan adapter index: ")),
                    connect_adapter: self.connect_adapter.unwrap_or_else(|| prompt_usize("Connect adapter index: ")),
                },
                _ => OperatingMode::ScanOnly {
                    scan_adapter: self.scan_adapter.unwrap_or_else(|| prompt_usize("Scan adapter index: ")),
                },
            }
        };

        Config { use_gps, mode, update_existing, helper_mode, max_concurrent_connects }
    }
}

fn yes_no(value: Option<String>, message: &str) -> bool {
    let value = value.unwrap_or_else(|| prompt(message));
    matches!(value.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn prompt(message: &str) -> String {
    print!("{message}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).unwrap_or_default();
    line.trim().to_string()
}

fn prompt_u8(message: &str) -> u8 {
    prompt(message).parse().unwrap_or(1)
}

fn prompt_usize(message: &str) -> usize {
    prompt(message).parse().unwrap_or(0)
}

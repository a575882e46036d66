use thiserror::Error;

/// Leaf error type shared by every crate that doesn't need its own
/// richer variant set. Storage, radio, and connection errors are all
/// neutralized at their respective component boundaries (spec.md §7);
/// this type exists for the few cases that must propagate (invalid
/// user-supplied data, startup failures).
#[derive(Debug, Error)]
pub enum BleReconError {
    #[error("not a valid MAC address: {0}")]
    InvalidMac(String),
}

pub mod advertisement;
pub mod error;
pub mod gatt;
pub mod mac;
pub mod observation;

pub use advertisement::{Advertisement, UNKNOWN_RSSI};
pub use error::BleReconError;
pub use gatt::GattDump;
pub use mac::{is_mac_address, Mac};
pub use observation::{DeviceObservation, TIMESTAMP_FORMAT};

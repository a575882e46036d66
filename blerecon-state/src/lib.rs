pub mod aging_map;
pub mod runtime_state;

pub use aging_map::AgingMap;
pub use runtime_state::{LocationStatus, RuntimeState, LOCATION_FRESHNESS_SECS};

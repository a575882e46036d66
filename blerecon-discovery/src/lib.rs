//! The Scanner and Connector, spec.md §4.E/§4.F: the scan/connect
//! pipeline that is the core of this system.

pub mod connector;
pub mod dump;
pub mod gate;
pub mod in_flight;
pub mod scanner;

pub use connector::Connector;
pub use in_flight::InFlightSet;
pub use scanner::{ConnectCandidate, Scanner};

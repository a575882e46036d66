use std::fmt;

/// The flattened textual GATT enumeration produced by the Connector
/// (spec.md §4.F.3), stored both as `devices.service` and as its own
/// row in `gatt_dumps` (§3's intentional duplication).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct GattDump(pub String);

impl GattDump {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for GattDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for GattDump {
    fn from(value: String) -> Self {
        GattDump(value)
    }
}

//! Radio Enumerator (spec.md §4.D): discovers host BLE adapters by
//! shelling out to `hciconfig` and parsing its output, the same
//! algorithm as the source's `get_bluetooth_interfaces`.

use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusTag {
    Usb,
    Uart,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioInterface {
    pub id: String,
    pub bus: BusTag,
}

/// Runs `hciconfig` and parses its stdout. On any failure (binary
/// missing, non-zero exit, nothing to parse) logs and returns an
/// empty list — the Supervisor is responsible for treating that as a
/// fatal configuration error (spec.md §4.D, §4.G step 3).
pub async fn enumerate() -> Vec<RadioInterface> {
    let output = match Command::new("hciconfig").output().await {
        Ok(out) if out.status.success() => out,
        Ok(out) => {
            tracing::error!(status = %out.status, "hciconfig exited with a non-zero status");
            return Vec::new();
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to run hciconfig");
            return Vec::new();
        }
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_hciconfig(&stdout)
}

/// Pure parser, split out from [`enumerate`] so it can be unit tested
/// without a `hciconfig` binary present.
fn parse_hciconfig(text: &str) -> Vec<RadioInterface> {
    let mut interfaces = Vec::new();
    let mut current: Option<(String, BusTag)> = None;

    for line in text.lines() {
        if line.starts_with(char::is_whitespace) || !line.contains(':') {
            continue;
        }
        if let Some((id, bus)) = current.take() {
            interfaces.push(RadioInterface { id, bus });
        }
        let id = line.split(':').next().unwrap_or("").trim().to_string();
        if id.is_empty() {
            continue;
        }
        let bus = if line.contains("Bus: USB") {
            BusTag::Usb
        } else if line.contains("Bus: UART") {
            BusTag::Uart
        } else {
            BusTag::Unknown
        };
        current = Some((id, bus));
    }
    if let Some((id, bus)) = current.take() {
        interfaces.push(RadioInterface { id, bus });
    }
    interfaces
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "hci0:\tType: Primary  Bus: USB\n\tBD Address: AA:BB:CC:DD:EE:FF  ACL MTU: 1021:8  SCO MTU: 64:1\n\tUP RUNNING\n\nhci1:\tType: Primary  Bus: UART\n\tBD Address: 11:22:33:44:55:66  ACL MTU: 1021:8  SCO MTU: 64:1\n\tUP RUNNING\n";

    #[test]
    fn parses_interface_ids_and_bus_tags() {
        let interfaces = parse_hciconfig(SAMPLE);
        assert_eq!(
            interfaces,
            vec![
                RadioInterface { id: "hci0".to_string(), bus: BusTag::Usb },
                RadioInterface { id: "hci1".to_string(), bus: BusTag::Uart },
            ]
        );
    }

    #[test]
    fn empty_output_yields_empty_list() {
        assert!(parse_hciconfig("").is_empty());
    }

    #[test]
    fn unrecognized_bus_defaults_to_unknown() {
        let text = "hci0:\tType: Primary  Bus: PCI\n";
        let interfaces = parse_hciconfig(text);
        assert_eq!(interfaces, vec![RadioInterface { id: "hci0".to_string(), bus: BusTag::Unknown }]);
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::BleReconError;

/// A 48-bit BLE hardware address, canonicalized to lowercase
/// `aa:bb:cc:dd:ee:ff` on construction (I1: MAC is unique, one row per
/// device, compared case-insensitively).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Mac([u8; 6]);

impl Mac {
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        Mac(bytes)
    }

    pub fn as_bytes(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for Mac {
    type Err = BleReconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_mac_address(s) {
            return Err(BleReconError::InvalidMac(s.to_string()));
        }
        let chars: Vec<char> = s.chars().collect();
        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let start = i * 3;
            let hex: String = [chars[start], chars[start + 1]].iter().collect();
            *byte = u8::from_str_radix(&hex, 16).map_err(|_| BleReconError::InvalidMac(s.to_string()))?;
        }
        Ok(Mac(bytes))
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Debug for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mac({self})")
    }
}

/// Recognizer for the literal pattern spec.md §4.E.2 names:
/// `([0-9A-Fa-f]{2}[:-]){5}[0-9A-Fa-f]{2}`, applied fully (no partial
/// match). Mirrors the source's `re.fullmatch` including its
/// permissiveness: each of the five separators is independently `:`
/// or `-`, so a mixed-separator string like `aa:bb-cc:dd:ee:ff` still
/// matches (P4 requires bit-for-bit equivalence with the stated
/// pattern, not a "tidier" reinterpretation of it).
#[must_use]
pub fn is_mac_address(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() != 17 {
        return false;
    }
    for i in 0..6 {
        let start = i * 3;
        if !chars[start].is_ascii_hexdigit() || !chars[start + 1].is_ascii_hexdigit() {
            return false;
        }
        if i < 5 {
            let sep = chars[start + 2];
            if sep != ':' && sep != '-' {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_form() {
        let mac: Mac = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn rejects_bad_length() {
        assert!("aa:bb:cc:dd:ee".parse::<Mac>().is_err());
    }

    #[test]
    fn mixed_separators_match_like_the_source_regex() {
        assert!(is_mac_address("aa:bb-cc:dd:ee:ff"));
    }

    #[test]
    fn is_mac_address_rejects_local_names() {
        assert!(!is_mac_address("sensor"));
        assert!(!is_mac_address(""));
    }

    #[test]
    fn equality_is_case_insensitive() {
        let a: Mac = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        let b: Mac = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(a, b);
    }
}

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A 6-byte Bluetooth device address, displayed canonically as `XX:XX:XX:XX:XX:XX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BluetoothAddress([u8; 6]);

impl BluetoothAddress {
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        BluetoothAddress(bytes)
    }

    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for BluetoothAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(Error::invalid(format!("'{s}' is not a colon-separated 6-byte address")));
        }
        let mut out = [0u8; 6];
        for (slot, part) in out.iter_mut().zip(parts.iter()) {
            *slot = u8::from_str_radix(part, 16).map_err(|_| Error::invalid(format!("'{part}' is not valid hex")))?;
        }
        Ok(BluetoothAddress(out))
    }
}

impl From<btleplug::api::BDAddr> for BluetoothAddress {
    fn from(addr: btleplug::api::BDAddr) -> Self {
        // BDAddr already displays as colon-separated upper-hex, matching our canonical form.
        addr.to_string().parse().expect("BDAddr always formats as a valid address")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_canonically() {
        let addr: BluetoothAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn rejects_malformed_address() {
        assert!("aa:bb:cc".parse::<BluetoothAddress>().is_err());
        assert!("zz:bb:cc:dd:ee:ff".parse::<BluetoothAddress>().is_err());
    }

    #[test]
    fn equality_is_by_bytes() {
        let a: BluetoothAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        let b: BluetoothAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(a, b);
    }
}

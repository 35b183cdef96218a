use uuid::Uuid;

use consts::{COMPANY_ID_DUMMY, COMPANY_ID_LAIRD, DEFAULT_RSSI_DBM};

use crate::address::BluetoothAddress;

/// The kind of sensor a raw advertisement has been classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Bt510,
    Dummy,
    Unknown,
}

/// The result of classifying a raw advertising record (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceClassification {
    pub kind: DeviceKind,
    pub company_id: u16,
}

/// A discovery event, normalised from whatever the host BLE daemon reports.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvertisementRecord {
    pub name: String,
    pub address: BluetoothAddress,
    /// dBm; defaults to [`DEFAULT_RSSI_DBM`] when the adapter can't report one.
    pub rssi: i16,
    pub uuids: Vec<Uuid>,
    pub manufacturer_data: std::collections::BTreeMap<u16, Vec<u8>>,
}

impl AdvertisementRecord {
    pub fn with_default_rssi(
        name: String,
        address: BluetoothAddress,
        rssi: Option<i16>,
        uuids: Vec<Uuid>,
        manufacturer_data: std::collections::BTreeMap<u16, Vec<u8>>,
    ) -> Self {
        AdvertisementRecord { name, address, rssi: rssi.unwrap_or(DEFAULT_RSSI_DBM), uuids, manufacturer_data }
    }
}

/// Classifies an advertisement into a [`DeviceClassification`], and extracts the
/// fields a [`crate::session::DeviceSession`] skeleton needs. Never connects.
pub struct DeviceFactory;

impl DeviceFactory {
    /// Maps the first `manufacturer_data` entry to a classification (spec §4.8 table):
    /// Laird's company id is BT510, `0x0000` or an empty map is the `Dummy` test
    /// double, and anything else defaults to BT510 too (the gateway's BLE stack only
    /// ever really deals with one family of sensor in the field).
    pub fn classify(record: &AdvertisementRecord) -> DeviceClassification {
        match record.manufacturer_data.iter().next() {
            None => DeviceClassification { kind: DeviceKind::Dummy, company_id: COMPANY_ID_DUMMY },
            Some((&company_id, _)) if company_id == COMPANY_ID_DUMMY => {
                DeviceClassification { kind: DeviceKind::Dummy, company_id }
            }
            Some((&company_id, _)) if company_id == COMPANY_ID_LAIRD => {
                DeviceClassification { kind: DeviceKind::Bt510, company_id }
            }
            Some((&company_id, _)) => DeviceClassification { kind: DeviceKind::Bt510, company_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(manufacturer_data: BTreeMap<u16, Vec<u8>>) -> AdvertisementRecord {
        AdvertisementRecord::with_default_rssi(
            "test".into(),
            BluetoothAddress::from_bytes([1, 2, 3, 4, 5, 6]),
            None,
            vec![],
            manufacturer_data,
        )
    }

    #[test]
    fn laird_company_id_classifies_as_bt510() {
        let r = record(BTreeMap::from([(COMPANY_ID_LAIRD, vec![1, 2, 3])]));
        let c = DeviceFactory::classify(&r);
        assert_eq!(c.kind, DeviceKind::Bt510);
    }

    #[test]
    fn zero_company_id_classifies_as_dummy() {
        let r = record(BTreeMap::from([(COMPANY_ID_DUMMY, vec![])]));
        assert_eq!(DeviceFactory::classify(&r).kind, DeviceKind::Dummy);
    }

    #[test]
    fn empty_manufacturer_data_classifies_as_dummy() {
        let r = record(BTreeMap::new());
        assert_eq!(DeviceFactory::classify(&r).kind, DeviceKind::Dummy);
    }

    #[test]
    fn unknown_company_id_defaults_to_bt510() {
        let r = record(BTreeMap::from([(0x1234, vec![])]));
        assert_eq!(DeviceFactory::classify(&r).kind, DeviceKind::Bt510);
    }

    #[test]
    fn missing_rssi_defaults_to_minus_fifty() {
        let r = record(BTreeMap::new());
        assert_eq!(r.rssi, DEFAULT_RSSI_DBM);
    }
}

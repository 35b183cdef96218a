use async_trait::async_trait;
use uuid::Uuid;

use crate::address::BluetoothAddress;

/// The pairing/authentication agent contract (spec §6.2): a thin dispatcher over
/// whatever agent interface the host BLE daemon exposes. Only the contract lives in
/// this crate; a real deployment wires this to the daemon's actual agent registration.
#[async_trait]
pub trait AuthAgent: Send + Sync {
    async fn request_pin_code(&self, address: BluetoothAddress, name: &str) -> String;
    async fn request_passkey(&self, address: BluetoothAddress, name: &str) -> u32;
    async fn request_confirmation(&self, address: BluetoothAddress, passkey: u32, name: &str) -> bool;
    async fn request_authorization(&self, address: BluetoothAddress, name: &str) -> bool;
    async fn authorize_service(&self, address: BluetoothAddress, service_uuid: Uuid, name: &str) -> bool;
}

/// Reference "fixed-pin / auto-authorise" agent: answers every passkey/confirmation
/// prompt affirmatively and always offers the same configured PIN. Good enough for
/// BT510 sensors, which don't challenge pairing beyond a fixed code.
pub struct FixedPinAgent {
    pin: String,
}

impl FixedPinAgent {
    pub fn new(pin: impl Into<String>) -> Self {
        FixedPinAgent { pin: pin.into() }
    }
}

impl Default for FixedPinAgent {
    fn default() -> Self {
        FixedPinAgent::new("000000")
    }
}

#[async_trait]
impl AuthAgent for FixedPinAgent {
    async fn request_pin_code(&self, _address: BluetoothAddress, _name: &str) -> String {
        self.pin.clone()
    }

    async fn request_passkey(&self, _address: BluetoothAddress, _name: &str) -> u32 {
        self.pin.parse().unwrap_or(0)
    }

    async fn request_confirmation(&self, _address: BluetoothAddress, _passkey: u32, _name: &str) -> bool {
        true
    }

    async fn request_authorization(&self, _address: BluetoothAddress, _name: &str) -> bool {
        true
    }

    async fn authorize_service(&self, _address: BluetoothAddress, _service_uuid: Uuid, _name: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_pin_agent_auto_authorises_everything() {
        let agent = FixedPinAgent::new("123456");
        let addr = BluetoothAddress::from_bytes([0, 0, 0, 0, 0, 1]);
        assert_eq!(agent.request_pin_code(addr, "sensor").await, "123456");
        assert_eq!(agent.request_passkey(addr, "sensor").await, 123456);
        assert!(agent.request_confirmation(addr, 123456, "sensor").await);
        assert!(agent.request_authorization(addr, "sensor").await);
        assert!(agent.authorize_service(addr, Uuid::nil(), "sensor").await);
    }
}

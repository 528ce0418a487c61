//! Device identity derived from the factory MAC address.
//!
//! The last three MAC bytes give a stable id `RC-XXYYZZ` for labels and
//! logs, and the advertised BLE name `repclip-xxyyzz`.  The same three
//! bytes travel in the `Handshake` packet.

use core::fmt::Write;

use crate::app::service::DeviceIdentity;

/// "RC-XXYYZZ".
pub type DeviceIdString = heapless::String<16>;

pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: the buffer is exactly the six bytes the call writes.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: a fixed, locally administered MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0x02, 0x00, 0x00, 0xC0, 0xFF, 0xEE]
}

/// Last three MAC bytes.
pub fn tag(mac: &MacAddress) -> [u8; 3] {
    [mac[3], mac[4], mac[5]]
}

pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    let _ = write!(id, "RC-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}

/// Advertised name, lowercase.
pub fn ble_name(mac: &MacAddress) -> heapless::String<24> {
    let mut name = heapless::String::<24>::new();
    let _ = write!(name, "repclip-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    name
}

/// Identity for the service, from this unit's MAC.
pub fn identity(mac: &MacAddress) -> DeviceIdentity {
    DeviceIdentity {
        name: ble_name(mac),
        tag: tag(mac),
        firmware: DeviceIdentity::firmware_version(),
    }
}

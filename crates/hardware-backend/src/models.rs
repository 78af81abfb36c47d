//! Hardware record and NetBox API models
//!
//! The file models follow the hardware document layout used for static
//! inventories; only the fields needed for admission are decoded and
//! everything else in a record is ignored. The NetBox models are trimmed
//! versions of the REST serializers (IPAddressSerializer,
//! InterfaceSerializer, DeviceSerializer).

use serde::{Deserialize, Serialize};

/// One machine in a static hardware file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hardware {
    #[serde(default)]
    pub network: Option<HardwareNetwork>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareNetwork {
    #[serde(default)]
    pub interfaces: Vec<HardwareInterface>,
}

/// A network interface and its boot policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareInterface {
    #[serde(default)]
    pub dhcp: Option<Dhcp>,
    /// Absent means the interface may not PXE boot
    #[serde(default)]
    pub netboot: Option<Netboot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dhcp {
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub ip: Option<DhcpIp>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DhcpIp {
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Netboot {
    #[serde(default)]
    pub allow_pxe: bool,
}

/// NetBox API response wrapper (for paginated responses)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub count: u64,
    pub next: Option<String>,
    pub results: Vec<T>,
}

/// IP address as returned by `/api/ipam/ip-addresses/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpAddressRecord {
    pub id: u64,
    pub address: String, // e.g., "192.168.2.3/24"
    pub assigned_object_type: Option<String>,
    pub assigned_object_id: Option<u64>,
}

/// Interface as returned by `/api/dcim/interfaces/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub id: u64,
    pub name: String,
    pub mac_address: Option<String>,
    pub device: NestedDevice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedDevice {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

/// Device as returned by `/api/dcim/devices/{id}/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub custom_fields: serde_json::Value,
}

impl DeviceRecord {
    /// The `allow_pxe` custom field; unset or non-boolean reads as `false`
    pub fn allow_pxe(&self) -> bool {
        self.custom_fields
            .get("allow_pxe")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

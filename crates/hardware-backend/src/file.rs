//! Static hardware file backend
//!
//! Loads a JSON array of [`Hardware`] records once and answers every
//! lookup from memory. A client is matched by IP address first; when no
//! interface carries that IP, by the MAC address the client presented.

use crate::error::HardwareError;
use crate::models::{Hardware, HardwareInterface};
use async_trait::async_trait;
use pxe_server::{AdmissionBackend, BackendError, MacAddr};
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;

/// Admission backend over an in-memory list of hardware records
#[derive(Debug, Clone, Default)]
pub struct FileBackend {
    records: Vec<Hardware>,
}

impl FileBackend {
    pub fn new(records: Vec<Hardware>) -> Self {
        Self { records }
    }

    /// Read and decode a hardware file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, HardwareError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| HardwareError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let records: Vec<Hardware> =
            serde_json::from_slice(&data).map_err(|source| HardwareError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), records = records.len(), "loaded hardware file");
        Ok(Self::new(records))
    }

    pub fn from_json(json: &str) -> Result<Self, HardwareError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn interfaces(&self) -> impl Iterator<Item = &HardwareInterface> {
        self.records
            .iter()
            .filter_map(|hw| hw.network.as_ref())
            .flat_map(|network| network.interfaces.iter())
    }

    /// Finds the interface for this client: IP match wins over MAC match.
    /// Record entries that do not parse simply never match.
    fn find(&self, ip: IpAddr, mac: Option<MacAddr>) -> Result<&HardwareInterface, HardwareError> {
        let by_ip = self.interfaces().find(|iface| {
            iface
                .dhcp
                .as_ref()
                .and_then(|dhcp| dhcp.ip.as_ref())
                .and_then(|addr| addr.address.parse::<IpAddr>().ok())
                == Some(ip)
        });
        let by_mac = || {
            let mac = mac?;
            self.interfaces().find(|iface| {
                iface
                    .dhcp
                    .as_ref()
                    .and_then(|dhcp| dhcp.mac.parse::<MacAddr>().ok())
                    == Some(mac)
            })
        };

        by_ip.or_else(by_mac).ok_or_else(|| match mac {
            Some(mac) => HardwareError::NotFound(format!("no hardware record for {ip} or {mac}")),
            None => HardwareError::NotFound(format!("no hardware record for {ip}")),
        })
    }
}

#[async_trait]
impl AdmissionBackend for FileBackend {
    async fn resolve_identity(
        &self,
        ip: IpAddr,
        mac: Option<MacAddr>,
    ) -> Result<MacAddr, BackendError> {
        let iface = self.find(ip, mac)?;
        let recorded = iface.dhcp.as_ref().map(|dhcp| dhcp.mac.as_str()).unwrap_or_default();
        recorded.parse().map_err(|err| {
            BackendError::InvalidRecord(format!("hardware record for {ip}: {err}"))
        })
    }

    async fn is_allowed(&self, ip: IpAddr, mac: Option<MacAddr>) -> Result<bool, BackendError> {
        let iface = self.find(ip, mac)?;
        Ok(iface.netboot.as_ref().is_some_and(|netboot| netboot.allow_pxe))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const RECORDS: &str = r#"[
        {
            "id": "8d1c8a4e-0b8f-4e4c-9b0c-6c2d0a3a5f11",
            "network": {
                "interfaces": [
                    {
                        "dhcp": {
                            "mac": "0a:00:27:00:00:00",
                            "ip": { "address": "192.168.2.3", "netmask": "255.255.255.0" }
                        },
                        "netboot": { "allow_pxe": true, "allow_workflow": true }
                    }
                ]
            }
        },
        {
            "network": {
                "interfaces": [
                    {
                        "dhcp": { "mac": "0a:00:27:00:00:01", "ip": { "address": "192.168.2.4" } },
                        "netboot": { "allow_pxe": false }
                    },
                    {
                        "dhcp": { "mac": "0a:00:27:00:00:02", "ip": { "address": "192.168.2.5" } }
                    }
                ]
            }
        }
    ]"#;

    fn backend() -> FileBackend {
        FileBackend::from_json(RECORDS).unwrap()
    }

    fn mac(s: &str) -> MacAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_resolve_identity_by_ip() {
        let got = backend()
            .resolve_identity("192.168.2.3".parse().unwrap(), None)
            .await
            .unwrap();
        assert_eq!(got, mac("0a:00:27:00:00:00"));
    }

    #[tokio::test]
    async fn test_resolve_identity_falls_back_to_mac() {
        let got = backend()
            .resolve_identity("10.9.9.9".parse().unwrap(), Some(mac("0A-00-27-00-00-01")))
            .await
            .unwrap();
        assert_eq!(got, mac("0a:00:27:00:00:01"));
    }

    #[tokio::test]
    async fn test_resolve_identity_not_found() {
        let err = backend()
            .resolve_identity("10.9.9.9".parse().unwrap(), Some(mac("00:00:00:00:00:00")))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_is_allowed_follows_netboot_policy() {
        let backend = backend();
        assert!(backend.is_allowed("192.168.2.3".parse().unwrap(), None).await.unwrap());
        assert!(!backend.is_allowed("192.168.2.4".parse().unwrap(), None).await.unwrap());
        // no netboot section at all
        assert!(!backend.is_allowed("192.168.2.5".parse().unwrap(), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_ip_match_wins_over_mac_match() {
        // IP of the denied interface, MAC of the allowed one
        let allowed = backend()
            .is_allowed("192.168.2.4".parse().unwrap(), Some(mac("0a:00:27:00:00:00")))
            .await
            .unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn test_unknown_client_is_not_found_not_denied() {
        let err = backend()
            .is_allowed("10.9.9.9".parse().unwrap(), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BackendError::NotFound("no hardware record for 10.9.9.9".to_string())
        );
    }

    #[tokio::test]
    async fn test_unparseable_recorded_mac_is_invalid_record() {
        let backend = FileBackend::from_json(
            r#"[{"network":{"interfaces":[{"dhcp":{"mac":"not-a-mac","ip":{"address":"10.0.0.7"}}}]}}]"#,
        )
        .unwrap();
        let err = backend
            .resolve_identity("10.0.0.7".parse().unwrap(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidRecord(_)));
    }

    #[test]
    fn test_from_path_reads_file() {
        let path = std::env::temp_dir().join(format!("hardware-{}.json", std::process::id()));
        std::fs::File::create(&path)
            .unwrap()
            .write_all(RECORDS.as_bytes())
            .unwrap();

        let backend = FileBackend::from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn test_from_path_errors_name_the_file() {
        let missing = std::env::temp_dir().join("does-not-exist-hardware.json");
        let err = FileBackend::from_path(&missing).unwrap_err();
        assert!(matches!(err, HardwareError::Read { .. }));
        assert!(err.to_string().contains("does-not-exist-hardware.json"));

        let path = std::env::temp_dir().join(format!("hardware-bad-{}.json", std::process::id()));
        std::fs::write(&path, b"{\"not\": \"an array\"}").unwrap();
        let err = FileBackend::from_path(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, HardwareError::Parse { .. }));
    }
}

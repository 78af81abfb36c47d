//! NetBox inventory backend
//!
//! Resolves a client through the NetBox REST API:
//! IP address (`/api/ipam/ip-addresses/`) → assigned interface
//! (`/api/dcim/interfaces/{id}/`) → device (`/api/dcim/devices/{id}/`).
//! When the IP is not on record and the client presented a MAC address, the
//! interface is looked up by MAC instead. The device's `allow_pxe` custom
//! field is the admission answer.

use crate::error::HardwareError;
use crate::models::{DeviceRecord, InterfaceRecord, IpAddressRecord, PaginatedResponse};
use async_trait::async_trait;
use pxe_server::{AdmissionBackend, BackendError, MacAddr};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

/// Per-request timeout against the inventory
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Admission backend backed by a NetBox instance
#[derive(Debug, Clone)]
pub struct NetBoxBackend {
    client: Client,
    base_url: String,
    token: String,
}

impl NetBoxBackend {
    /// Create a new NetBox backend
    ///
    /// # Arguments
    /// * `base_url` - NetBox base URL (e.g., "http://netbox:80")
    /// * `token` - API token for authentication
    pub fn new(base_url: String, token: String) -> Result<Self, HardwareError> {
        Self::with_timeout(base_url, token, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: String,
        token: String,
        timeout: Duration,
    ) -> Result<Self, HardwareError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Validate the API token by making a simple authenticated request.
    ///
    /// Run once at startup so a wrong token or an unreachable NetBox fails
    /// the process instead of every boot request.
    pub async fn validate_token(&self) -> Result<(), HardwareError> {
        let url = format!("{}/api/status/", self.base_url);
        debug!("Validating NetBox token and connectivity");

        let response = self.request(&url).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == 401 || status == 403 {
            return Err(HardwareError::Authentication(format!(
                "Invalid token: {status} - {body}"
            )));
        }
        if !status.is_success() {
            return Err(HardwareError::Api(format!(
                "Failed to validate token: {status} - {body}"
            )));
        }

        debug!("Token validated successfully");
        Ok(())
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, HardwareError> {
        debug!(url, "NetBox request");
        let response = self.request(url).send().await?;
        let status = response.status();

        if status == 404 {
            return Err(HardwareError::NotFound(url.to_string()));
        }
        if status == 401 || status == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(HardwareError::Authentication(format!("{status} - {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HardwareError::Api(format!("{url}: {status} - {body}")));
        }

        // Keep the body for the error message if it does not decode
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            HardwareError::Api(format!(
                "error decoding response body: {} - Response (first 500 chars): {}",
                e,
                text.chars().take(500).collect::<String>()
            ))
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        path: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<T>, HardwareError> {
        let query: Vec<String> = filters
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        let url = format!("{}/api/{}/?{}", self.base_url, path, query.join("&"));
        let page: PaginatedResponse<T> = self.get_json(&url).await?;
        Ok(page.results)
    }

    /// Interface holding this IP, if NetBox has the IP assigned to one
    async fn interface_by_ip(&self, ip: IpAddr) -> Result<Option<InterfaceRecord>, HardwareError> {
        let address = ip.to_string();
        let addresses: Vec<IpAddressRecord> =
            self.query("ipam/ip-addresses", &[("address", &address)]).await?;

        let Some(interface_id) = addresses
            .iter()
            .filter(|a| a.assigned_object_type.as_deref() == Some("dcim.interface"))
            .find_map(|a| a.assigned_object_id)
        else {
            debug!(%ip, matches = addresses.len(), "IP not assigned to an interface");
            return Ok(None);
        };

        let url = format!("{}/api/dcim/interfaces/{}/", self.base_url, interface_id);
        self.get_json(&url).await.map(Some)
    }

    async fn interface_by_mac(&self, mac: MacAddr) -> Result<Option<InterfaceRecord>, HardwareError> {
        let mac = mac.to_string();
        let interfaces: Vec<InterfaceRecord> =
            self.query("dcim/interfaces", &[("mac_address", &mac)]).await?;
        Ok(interfaces.into_iter().next())
    }

    /// Interface for this client: by IP first, then by the presented MAC
    pub async fn find_interface(
        &self,
        ip: IpAddr,
        mac: Option<MacAddr>,
    ) -> Result<InterfaceRecord, HardwareError> {
        if let Some(iface) = self.interface_by_ip(ip).await? {
            return Ok(iface);
        }
        if let Some(mac) = mac
            && let Some(iface) = self.interface_by_mac(mac).await?
        {
            return Ok(iface);
        }
        Err(match mac {
            Some(mac) => HardwareError::NotFound(format!("no interface for {ip} or {mac}")),
            None => HardwareError::NotFound(format!("no interface for {ip}")),
        })
    }

    pub async fn get_device(&self, id: u64) -> Result<DeviceRecord, HardwareError> {
        let url = format!("{}/api/dcim/devices/{}/", self.base_url, id);
        self.get_json(&url).await
    }
}

#[async_trait]
impl AdmissionBackend for NetBoxBackend {
    async fn resolve_identity(
        &self,
        ip: IpAddr,
        mac: Option<MacAddr>,
    ) -> Result<MacAddr, BackendError> {
        let iface = self.find_interface(ip, mac).await?;
        let recorded = iface.mac_address.as_deref().ok_or_else(|| {
            BackendError::InvalidRecord(format!("interface {} has no MAC address", iface.id))
        })?;
        recorded.parse().map_err(|err| {
            BackendError::InvalidRecord(format!("interface {}: {err}", iface.id))
        })
    }

    async fn is_allowed(&self, ip: IpAddr, mac: Option<MacAddr>) -> Result<bool, BackendError> {
        let iface = self.find_interface(ip, mac).await?;
        let device = self.get_device(iface.device.id).await?;
        let allowed = device.allow_pxe();
        debug!(
            %ip,
            device = device.name.as_deref().unwrap_or_default(),
            interface = %iface.name,
            allowed,
            "NetBox admission answer"
        );
        Ok(allowed)
    }
}

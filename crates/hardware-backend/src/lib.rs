//! Admission backends for the PXE server
//!
//! Two implementations of [`pxe_server::AdmissionBackend`]:
//!
//! - [`FileBackend`]: a static JSON array of hardware records loaded once at startup
//! - [`NetBoxBackend`]: live lookups against the NetBox REST API
//!
//! # Example
//!
//! ```no_run
//! use hardware_backend::{FileBackend, NetBoxBackend};
//! use pxe_server::AdmissionBackend;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend: Arc<dyn AdmissionBackend> = if std::env::var("USE_NETBOX").is_ok() {
//!     let netbox = NetBoxBackend::new(
//!         "http://netbox:80".to_string(),
//!         "your-api-token".to_string(),
//!     )?;
//!     netbox.validate_token().await?;
//!     Arc::new(netbox)
//! } else {
//!     Arc::new(FileBackend::from_path("/etc/ipxe/hardware.json")?)
//! };
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod file;
pub mod models;
pub mod netbox;


pub use error::HardwareError;
pub use file::FileBackend;
pub use netbox::NetBoxBackend;

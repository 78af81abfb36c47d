//! Boot artifact registry.
//!
//! The iPXE binaries served to clients are loaded once at startup and never
//! change afterwards, so the registry is shared as `Arc<BootFiles>` and read
//! by every request handler without locking.

use bytes::Bytes;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use tracing::info;

/// BIOS iPXE binary for x86 architectures.
pub const UNDIONLY_KPXE: &str = "undionly.kpxe";
/// UEFI iPXE binary for x86 architectures.
pub const IPXE_EFI: &str = "ipxe.efi";
/// UEFI iPXE binary for ARM architectures.
pub const SNP_EFI: &str = "snp.efi";

/// Artifacts every deployment is expected to provide.
pub const WELL_KNOWN: [&str; 3] = [UNDIONLY_KPXE, IPXE_EFI, SNP_EFI];

/// Immutable mapping from artifact name to content.
#[derive(Debug, Clone, Default)]
pub struct BootFiles {
    files: HashMap<String, Bytes>,
}

impl BootFiles {
    /// Builds a registry from in-memory entries.
    pub fn from_entries<I, N, C>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<Bytes>,
    {
        Self {
            files: entries
                .into_iter()
                .map(|(name, content)| (name.into(), content.into()))
                .collect(),
        }
    }

    /// Loads every [`WELL_KNOWN`] artifact from `dir`.
    ///
    /// # Errors
    ///
    /// Fails if any of the artifacts cannot be read; a boot server missing
    /// one architecture's firmware is a deployment error, not a runtime one.
    pub fn from_dir(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref();
        let mut files = HashMap::with_capacity(WELL_KNOWN.len());
        for name in WELL_KNOWN {
            let path = dir.join(name);
            let content = std::fs::read(&path).map_err(|e| {
                io::Error::new(e.kind(), format!("could not read {}: {e}", path.display()))
            })?;
            info!(file = %name, size = content.len(), "loaded boot file");
            files.insert(name.to_string(), Bytes::from(content));
        }
        Ok(Self { files })
    }

    /// Content of `name`. Callers must pass a basename.
    pub fn get(&self, name: &str) -> Option<Bytes> {
        self.files.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Registered artifact names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.files.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

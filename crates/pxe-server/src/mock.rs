//! Mock AdmissionBackend for unit testing
//!
//! Stores hardware records in memory and can be told to fail or to never
//! answer, so adapters can be tested without a real inventory.

use crate::backend::AdmissionBackend;
use crate::error::BackendError;
use crate::mac::MacAddr;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy)]
struct MockRecord {
    mac: MacAddr,
    allow_pxe: bool,
}

/// Mock backend for testing
///
/// Clones share state, so a test can keep one handle for setup and
/// assertions while the server owns another.
#[derive(Clone, Default)]
pub struct MockBackend {
    records: Arc<Mutex<HashMap<IpAddr, MockRecord>>>,
    failure: Arc<Mutex<Option<BackendError>>>,
    hang: Arc<AtomicBool>,
    resolve_calls: Arc<AtomicUsize>,
    allow_calls: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a machine (for test setup)
    pub fn add_client(&self, ip: IpAddr, mac: MacAddr, allow_pxe: bool) -> &Self {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ip, MockRecord { mac, allow_pxe });
        self
    }

    /// Make every subsequent call fail with `error`
    pub fn fail_with(&self, error: BackendError) -> &Self {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
        self
    }

    /// Make every subsequent call pend forever, until its future is dropped
    pub fn hang(&self) -> &Self {
        self.hang.store(true, Ordering::SeqCst);
        self
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn allow_calls(&self) -> usize {
        self.allow_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.resolve_calls() + self.allow_calls()
    }

    async fn lookup(&self, ip: IpAddr, mac: Option<MacAddr>) -> Result<MockRecord, BackendError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self.failure.lock().unwrap_or_else(PoisonError::into_inner).clone() {
            return Err(error);
        }

        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records
            .get(&ip)
            .or_else(|| {
                mac.and_then(|mac| records.values().find(|record| record.mac == mac))
            })
            .copied()
            .ok_or_else(|| BackendError::NotFound(format!("no hardware record for {ip}")))
    }
}

#[async_trait]
impl AdmissionBackend for MockBackend {
    async fn resolve_identity(
        &self,
        ip: IpAddr,
        mac: Option<MacAddr>,
    ) -> Result<MacAddr, BackendError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.lookup(ip, mac).await.map(|record| record.mac)
    }

    async fn is_allowed(&self, ip: IpAddr, mac: Option<MacAddr>) -> Result<bool, BackendError> {
        self.allow_calls.fetch_add(1, Ordering::SeqCst);
        self.lookup(ip, mac).await.map(|record| record.allow_pxe)
    }
}

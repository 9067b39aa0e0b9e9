//! Durable storage of the lease table.
//!
//! The directory only talks to the [`LeaseStore`] trait. [`JsonFileStore`]
//! is the stock implementation and writes the table as pretty-printed JSON:
//!
//! ```json
//! {
//!   "version": 1,
//!   "leases": [
//!     {
//!       "address": "192.168.1.100",
//!       "expiry": "2026-01-01T00:00:00Z",
//!       "hostname": "laptop",
//!       "hardware_address": "aa:bb:cc:dd:ee:ff",
//!       "is_static": false
//!     }
//!   ]
//! }
//! ```
//!
//! `expiry` is omitted for static leases.

use std::fmt::Debug;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::hwaddr::HardwareAddr;
use crate::lease::Lease;

/// Current on-disk format version.
const LEASES_FILE_VERSION: u32 = 1;

/// Persistence backend for the lease directory.
///
/// `save` receives the full table each time and must replace whatever was
/// stored before.
#[async_trait]
pub trait LeaseStore: Send + Sync + Debug {
    async fn load(&self) -> Result<Vec<Lease>>;

    async fn save(&self, leases: &[Lease]) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredLease {
    address: IpAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<DateTime<Utc>>,
    hostname: String,
    hardware_address: HardwareAddr,
    #[serde(default)]
    is_static: bool,
}

impl From<&Lease> for StoredLease {
    fn from(lease: &Lease) -> Self {
        Self {
            address: lease.ip,
            expiry: (!lease.is_static).then_some(lease.expiry),
            hostname: lease.hostname.clone(),
            hardware_address: lease.hw_addr.clone(),
            is_static: lease.is_static,
        }
    }
}

impl TryFrom<StoredLease> for Lease {
    type Error = Error;

    fn try_from(stored: StoredLease) -> Result<Self> {
        if stored.is_static {
            return Ok(Lease::new_static(
                stored.address,
                stored.hardware_address,
                stored.hostname,
            ));
        }

        let expiry = stored.expiry.ok_or_else(|| {
            Error::InvalidLease(format!(
                "dynamic lease for {} has no expiry",
                stored.address
            ))
        })?;

        Ok(Lease::new_dynamic(
            stored.address,
            stored.hardware_address,
            stored.hostname,
            expiry,
        ))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LeasesFile {
    version: u32,
    leases: Vec<StoredLease>,
}

/// Stores the lease table in a JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    /// Mutex to prevent concurrent file writes.
    save_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            save_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LeaseStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<Lease>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let file: LeasesFile = serde_json::from_str(&content)?;
        if file.version != LEASES_FILE_VERSION {
            return Err(Error::InvalidLease(format!(
                "unsupported leases file version {} in {}",
                file.version,
                self.path.display()
            )));
        }

        file.leases.into_iter().map(Lease::try_from).collect()
    }

    async fn save(&self, leases: &[Lease]) -> Result<()> {
        let file = LeasesFile {
            version: LEASES_FILE_VERSION,
            leases: leases.iter().map(StoredLease::from).collect(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        let _lock = self.save_lock.lock().await;
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

//! Concurrent lease directory.
//!
//! [`LeaseDirectory`] wraps the [`LeaseIndex`] in a single reader/writer
//! lock, so the record set and all three indices change together and
//! readers never see a half-applied mutation.
//!
//! # Thread Safety
//!
//! - [`RwLock`] guards the index (many concurrent lookups, one writer)
//! - [`Mutex`] serializes saves and remembers the newest saved generation
//!
//! Saves run after the write lock is released. A mutation that commits in
//! memory stays committed even if its save fails; the error is still
//! returned to the caller.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{ConflictField, Error, Result};
use crate::hwaddr::HardwareAddr;
use crate::index::LeaseIndex;
use crate::lease::Lease;
use crate::store::LeaseStore;

#[derive(Debug, Default)]
struct DirectoryState {
    index: LeaseIndex,
    /// Bumped on every committed mutation.
    generation: u64,
    /// Set once by [`LeaseDirectory::close`].
    closed: bool,
}

/// Lease table captured at a given generation, waiting to be saved.
#[derive(Debug)]
struct Snapshot {
    generation: u64,
    leases: Vec<Lease>,
}

/// Thread-safe, multi-indexed store of leases.
///
/// # Example
///
/// ```no_run
/// use std::net::{IpAddr, Ipv4Addr};
/// use leasedir::{HardwareAddr, Lease, LeaseDirectory};
///
/// # async fn example() -> leasedir::Result<()> {
/// let directory = LeaseDirectory::new(None);
/// let hw: HardwareAddr = "aa:bb:cc:dd:ee:01".parse()?;
/// let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
///
/// directory.add_lease(Lease::new_static(ip, hw, "printer")).await?;
/// assert_eq!(directory.host_by_ip(ip).await.as_deref(), Some("printer"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LeaseDirectory {
    state: RwLock<DirectoryState>,
    store: Option<Arc<dyn LeaseStore>>,
    /// Generation of the last snapshot written to the store.
    saved_generation: Mutex<u64>,
}

impl LeaseDirectory {
    /// Creates an empty directory. Without a store nothing is persisted.
    pub fn new(store: Option<Arc<dyn LeaseStore>>) -> Self {
        Self {
            state: RwLock::new(DirectoryState::default()),
            store,
            saved_generation: Mutex::new(0),
        }
    }

    /// Creates a directory populated from `store`.
    ///
    /// Every stored lease goes through the same validation as
    /// [`add_lease`](Self::add_lease). Dynamic leases that expired while
    /// the service was down are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read, or if a stored lease
    /// is invalid or conflicts with an earlier one.
    pub async fn load(store: Arc<dyn LeaseStore>) -> Result<Self> {
        let stored = store.load().await?;
        let now = Utc::now();

        let mut index = LeaseIndex::default();
        let mut skipped = 0;
        for lease in stored {
            if lease.is_expired_at(now) {
                debug!("Skipping expired lease {} for {}", lease.ip, lease.hw_addr);
                skipped += 1;
                continue;
            }
            let ip = lease.ip;
            if index.add(lease, now)?.is_some() {
                return Err(Error::conflict(ConflictField::Address, ip));
            }
        }

        info!(
            "Loaded {} lease(s) from storage, skipped {} expired",
            index.len(),
            skipped
        );

        Ok(Self {
            state: RwLock::new(DirectoryState {
                index,
                generation: 0,
                closed: false,
            }),
            store: Some(store),
            saved_generation: Mutex::new(0),
        })
    }

    /// Returns the hostname leased with `ip`, if any.
    pub async fn host_by_ip(&self, ip: IpAddr) -> Option<String> {
        let state = self.state.read().await;
        if state.closed {
            return None;
        }
        state.index.host_by_ip(ip, Utc::now())
    }

    /// Returns the hardware address leased with `ip`, if any.
    pub async fn hw_by_ip(&self, ip: IpAddr) -> Option<HardwareAddr> {
        let state = self.state.read().await;
        if state.closed {
            return None;
        }
        state.index.hw_by_ip(ip, Utc::now())
    }

    /// Returns the address leased to `hostname` (case-insensitive), if any.
    pub async fn ip_by_host(&self, hostname: &str) -> Option<IpAddr> {
        let state = self.state.read().await;
        if state.closed {
            return None;
        }
        state.index.ip_by_host(hostname, Utc::now())
    }

    /// Returns copies of all live leases, sorted by address.
    pub async fn leases(&self) -> Vec<Lease> {
        let state = self.state.read().await;
        if state.closed {
            return Vec::new();
        }
        state.index.snapshot(Utc::now())
    }

    /// Adds a lease, or renews a live dynamic lease with the same address
    /// and hardware address.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidLease`] for a missing field or a non-future expiry
    /// - [`Error::Conflict`] if a different live lease holds the address,
    ///   hardware address, or hostname
    /// - [`Error::Unavailable`] after shutdown
    /// - I/O errors from the save that follows a committed add
    pub async fn add_lease(&self, lease: Lease) -> Result<()> {
        let (ip, hw_addr) = (lease.ip, lease.hw_addr.clone());
        let replaced = self
            .mutate(|index, now| index.add(lease, now))
            .await?;

        match replaced {
            Some(_) => debug!("Renewed lease {} for {}", ip, hw_addr),
            None => info!("Added lease {} for {}", ip, hw_addr),
        }
        Ok(())
    }

    /// Changes the static lease identified by `lease.hw_addr`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if no static lease holds the hardware address
    /// - [`Error::InvalidLease`] or [`Error::Conflict`] as for
    ///   [`add_lease`](Self::add_lease)
    pub async fn update_static_lease(&self, lease: Lease) -> Result<()> {
        let (ip, hw_addr) = (lease.ip, lease.hw_addr.clone());
        let previous = self
            .mutate(|index, now| index.update_static(lease, now))
            .await?;

        info!(
            "Updated static lease for {}: {} -> {}",
            hw_addr, previous.ip, ip
        );
        Ok(())
    }

    /// Removes the lease matching both the address and hardware address of
    /// `lease`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] unless both fields match a live lease.
    pub async fn remove_lease(&self, lease: &Lease) -> Result<()> {
        let removed = self
            .mutate(|index, now| index.remove(lease, now))
            .await?;

        info!("Removed lease {} for {}", removed.ip, removed.hw_addr);
        Ok(())
    }

    /// Removes every lease, static and dynamic.
    pub async fn reset(&self) -> Result<()> {
        let count = self.mutate(|index, _| Ok(index.clear())).await?;
        info!("Reset lease directory, dropped {} lease(s)", count);
        Ok(())
    }

    /// Physically removes expired dynamic leases and returns how many were
    /// dropped. Saves only when something was removed.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let (count, snapshot) = {
            let mut state = self.state.write().await;
            if state.closed {
                return Err(Error::Unavailable);
            }
            let count = state.index.sweep(Utc::now());
            if count == 0 {
                return Ok(0);
            }
            (count, self.commit(&mut state))
        };

        debug!("Swept {} expired lease(s)", count);
        self.persist(snapshot).await?;
        Ok(count)
    }

    /// Forces an immediate save of the current lease table.
    pub async fn save(&self) -> Result<()> {
        let snapshot = {
            let mut state = self.state.write().await;
            self.commit(&mut state)
        };
        self.persist(snapshot).await
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    /// Number of stored records, counting expired ones not yet swept.
    #[cfg(test)]
    pub(crate) async fn stored_len(&self) -> usize {
        self.state.read().await.index.len()
    }

    /// Waits for in-flight operations, refuses new writes, and saves the
    /// final table.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires before in-flight
    /// operations drain; the directory then stays open.
    pub async fn close(&self, cancel: &CancellationToken) -> Result<()> {
        let snapshot = tokio::select! {
            biased;
            mut state = self.state.write() => {
                if state.closed {
                    return Ok(());
                }
                state.closed = true;
                info!("Lease directory closed with {} lease(s)", state.index.len());
                self.commit(&mut state)
            }
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        self.persist(snapshot).await
    }

    /// Applies `operation` under the write lock, then saves outside it.
    async fn mutate<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut LeaseIndex, DateTime<Utc>) -> Result<T>,
    {
        let (value, snapshot) = {
            let mut state = self.state.write().await;
            if state.closed {
                return Err(Error::Unavailable);
            }
            let value = operation(&mut state.index, Utc::now())?;
            (value, self.commit(&mut state))
        };

        self.persist(snapshot).await?;
        Ok(value)
    }

    /// Records a committed mutation. Captures the table only when there is
    /// a store to save it to.
    fn commit(&self, state: &mut DirectoryState) -> Option<Snapshot> {
        state.generation += 1;
        self.store.as_ref().map(|_| Snapshot {
            generation: state.generation,
            leases: state.index.snapshot(Utc::now()),
        })
    }

    async fn persist(&self, snapshot: Option<Snapshot>) -> Result<()> {
        let (Some(store), Some(snapshot)) = (&self.store, snapshot) else {
            return Ok(());
        };

        let mut saved_generation = self.saved_generation.lock().await;
        if snapshot.generation <= *saved_generation {
            debug!(
                "Skipping save of generation {}, {} already saved",
                snapshot.generation, *saved_generation
            );
            return Ok(());
        }

        if let Err(err) = store.save(&snapshot.leases).await {
            error!("Failed to save leases: {}", err);
            return Err(err);
        }
        *saved_generation = snapshot.generation;
        Ok(())
    }
}

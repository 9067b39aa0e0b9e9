//! The lease record.
//!
//! A [`Lease`] binds an IP address, a hardware address, and a hostname.
//! Static leases are administrative reservations and never expire; dynamic
//! leases carry a real deadline and become invisible once it passes.

use std::net::IpAddr;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{Error, Result};
use crate::hwaddr::HardwareAddr;

/// A single address binding.
///
/// Cloning is a deep copy, so a lease handed out by the directory never
/// shares memory with the directory's own records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// The leased IP address.
    pub ip: IpAddr,

    /// When a dynamic lease expires (UTC).
    ///
    /// Ignored for static leases, which are created with
    /// [`DateTime::<Utc>::MAX_UTC`].
    pub expiry: DateTime<Utc>,

    /// Client-supplied or generated hostname.
    pub hostname: String,

    /// Physical address of the client.
    pub hw_addr: HardwareAddr,

    /// Whether this lease is an administrative reservation.
    pub is_static: bool,
}

impl Lease {
    /// Creates a static reservation.
    pub fn new_static(ip: IpAddr, hw_addr: HardwareAddr, hostname: impl Into<String>) -> Self {
        Self {
            ip,
            expiry: DateTime::<Utc>::MAX_UTC,
            hostname: hostname.into(),
            hw_addr,
            is_static: true,
        }
    }

    /// Creates a dynamic lease expiring at `expiry`.
    pub fn new_dynamic(
        ip: IpAddr,
        hw_addr: HardwareAddr,
        hostname: impl Into<String>,
        expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            ip,
            expiry,
            hostname: hostname.into(),
            hw_addr,
            is_static: false,
        }
    }

    /// Creates a dynamic lease lasting `duration` from now.
    pub fn granted_for(
        ip: IpAddr,
        hw_addr: HardwareAddr,
        hostname: impl Into<String>,
        duration: TimeDelta,
    ) -> Self {
        Self::new_dynamic(ip, hw_addr, hostname, Utc::now() + duration)
    }

    /// Returns true if this is a dynamic lease whose deadline has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_static && now >= self.expiry
    }

    /// Returns true if the lease has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Returns seconds remaining until expiration, or `None` for static leases.
    pub fn remaining_seconds(&self) -> Option<i64> {
        if self.is_static {
            return None;
        }
        let remaining = self.expiry - Utc::now();
        Some(remaining.num_seconds().max(0))
    }

    /// Case-insensitive key used by the hostname index.
    pub(crate) fn hostname_key(&self) -> String {
        normalize_hostname(&self.hostname)
    }

    /// Checks the required fields of a lease about to be stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLease`] if:
    /// - the address is unspecified
    /// - the hardware address or hostname is empty
    /// - the lease is dynamic and `expiry` is not after `now`
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.ip.is_unspecified() {
            return Err(Error::InvalidLease("address is unspecified".to_string()));
        }

        if self.hw_addr.is_empty() {
            return Err(Error::InvalidLease(format!(
                "hardware address is empty for {}",
                self.ip
            )));
        }

        if self.hostname.trim().is_empty() {
            return Err(Error::InvalidLease(format!(
                "hostname is empty for {}",
                self.ip
            )));
        }

        if !self.is_static && self.expiry <= now {
            return Err(Error::InvalidLease(format!(
                "expiry {} of dynamic lease for {} is not in the future",
                self.expiry, self.ip
            )));
        }

        Ok(())
    }
}

pub(crate) fn normalize_hostname(hostname: &str) -> String {
    hostname.trim().to_lowercase()
}

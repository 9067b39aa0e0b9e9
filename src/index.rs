//! The record set and its three lookup indices.
//!
//! [`LeaseIndex`] owns every [`Lease`] keyed by address and keeps two
//! secondary indices (hardware address and case-insensitive hostname)
//! pointing back at that address. Every mutation goes through `attach` and
//! `detach`, so the three maps always describe the same set of records.
//!
//! The index is synchronous and takes the current time as an argument;
//! locking and persistence live in [`LeaseDirectory`](crate::LeaseDirectory).
//!
//! Expired dynamic records stay in storage until a write collides with
//! them or [`LeaseIndex::sweep`] runs, but every query treats them as
//! absent.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};

use crate::error::{ConflictField, Error, Result};
use crate::hwaddr::HardwareAddr;
use crate::lease::{Lease, normalize_hostname};

#[derive(Debug, Default)]
pub(crate) struct LeaseIndex {
    /// Authoritative record set, keyed by address.
    by_ip: HashMap<IpAddr, Lease>,
    /// Hardware address → address.
    ip_by_hw: HashMap<HardwareAddr, IpAddr>,
    /// Lowercased hostname → address.
    ip_by_host: HashMap<String, IpAddr>,
}

impl LeaseIndex {
    fn live(&self, ip: &IpAddr, now: DateTime<Utc>) -> Option<&Lease> {
        self.by_ip.get(ip).filter(|lease| !lease.is_expired_at(now))
    }

    pub(crate) fn host_by_ip(&self, ip: IpAddr, now: DateTime<Utc>) -> Option<String> {
        self.live(&ip, now).map(|lease| lease.hostname.clone())
    }

    pub(crate) fn hw_by_ip(&self, ip: IpAddr, now: DateTime<Utc>) -> Option<HardwareAddr> {
        self.live(&ip, now).map(|lease| lease.hw_addr.clone())
    }

    pub(crate) fn ip_by_host(&self, hostname: &str, now: DateTime<Utc>) -> Option<IpAddr> {
        self.ip_by_host
            .get(&normalize_hostname(hostname))
            .and_then(|ip| self.live(ip, now))
            .map(|lease| lease.ip)
    }

    /// Returns copies of all live records, sorted by address.
    pub(crate) fn snapshot(&self, now: DateTime<Utc>) -> Vec<Lease> {
        let mut leases: Vec<Lease> = self
            .by_ip
            .values()
            .filter(|lease| !lease.is_expired_at(now))
            .cloned()
            .collect();
        leases.sort_by(|left, right| left.ip.cmp(&right.ip));
        leases
    }

    /// Number of stored records, including expired ones not yet swept.
    pub(crate) fn len(&self) -> usize {
        self.by_ip.len()
    }

    /// Inserts a new lease, or replaces a live dynamic lease with the same
    /// address and hardware address (renewal).
    ///
    /// Returns the replaced lease on renewal.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidLease`] if the lease fails validation
    /// - [`Error::Conflict`] naming the first of address, hardware address,
    ///   or hostname that a different live lease already holds
    pub(crate) fn add(&mut self, lease: Lease, now: DateTime<Utc>) -> Result<Option<Lease>> {
        lease.validate(now)?;
        self.reclaim_collisions(&lease, now);

        let mut renewed = None;
        if let Some(existing) = self.by_ip.get(&lease.ip) {
            let is_renewal =
                !existing.is_static && !lease.is_static && existing.hw_addr == lease.hw_addr;
            if !is_renewal {
                return Err(Error::conflict(ConflictField::Address, lease.ip));
            }
            renewed = Some(existing.ip);
        }

        if let Some(&holder) = self.ip_by_hw.get(&lease.hw_addr)
            && Some(holder) != renewed
        {
            return Err(Error::conflict(ConflictField::HardwareAddr, &lease.hw_addr));
        }

        if let Some(&holder) = self.ip_by_host.get(&lease.hostname_key())
            && Some(holder) != renewed
        {
            return Err(Error::conflict(ConflictField::Hostname, &lease.hostname));
        }

        let replaced = renewed.and_then(|ip| self.detach(ip));
        self.attach(lease);
        Ok(replaced)
    }

    /// Replaces the static lease holding `lease.hw_addr` with `lease`.
    ///
    /// Returns the previous lease.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidLease`] if `lease` is not static or fails validation
    /// - [`Error::NotFound`] if no static lease holds the hardware address
    /// - [`Error::Conflict`] if the new address or hostname belongs to
    ///   another live lease
    pub(crate) fn update_static(&mut self, lease: Lease, now: DateTime<Utc>) -> Result<Lease> {
        if !lease.is_static {
            return Err(Error::InvalidLease(format!(
                "update of {} requires a static lease",
                lease.hw_addr
            )));
        }
        lease.validate(now)?;
        self.reclaim_collisions(&lease, now);

        let current = self
            .ip_by_hw
            .get(&lease.hw_addr)
            .and_then(|ip| self.by_ip.get(ip))
            .filter(|existing| existing.is_static)
            .map(|existing| existing.ip)
            .ok_or_else(|| {
                Error::NotFound(format!("no static lease with hardware address {}", lease.hw_addr))
            })?;

        if lease.ip != current && self.by_ip.contains_key(&lease.ip) {
            return Err(Error::conflict(ConflictField::Address, lease.ip));
        }

        if let Some(&holder) = self.ip_by_host.get(&lease.hostname_key())
            && holder != current
        {
            return Err(Error::conflict(ConflictField::Hostname, &lease.hostname));
        }

        let previous = self
            .detach(current)
            .ok_or_else(|| Error::NotFound(format!("no lease for {}", current)))?;
        self.attach(lease);
        Ok(previous)
    }

    /// Removes the live lease matching both the address and the hardware
    /// address of `lease`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] on any partial or missing match.
    pub(crate) fn remove(&mut self, lease: &Lease, now: DateTime<Utc>) -> Result<Lease> {
        self.reclaim_expired(lease.ip, now);

        let matches = self
            .by_ip
            .get(&lease.ip)
            .is_some_and(|existing| existing.hw_addr == lease.hw_addr);

        if !matches {
            return Err(Error::NotFound(format!(
                "no lease for {} with hardware address {}",
                lease.ip, lease.hw_addr
            )));
        }

        self.detach(lease.ip)
            .ok_or_else(|| Error::NotFound(format!("no lease for {}", lease.ip)))
    }

    /// Drops every record. Returns how many were stored.
    pub(crate) fn clear(&mut self) -> usize {
        let count = self.by_ip.len();
        self.by_ip.clear();
        self.ip_by_hw.clear();
        self.ip_by_host.clear();
        count
    }

    /// Physically removes every expired dynamic record.
    pub(crate) fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<IpAddr> = self
            .by_ip
            .values()
            .filter(|lease| lease.is_expired_at(now))
            .map(|lease| lease.ip)
            .collect();

        let count = expired.len();
        for ip in expired {
            self.detach(ip);
        }
        count
    }

    /// Drops expired records that hold any key of `lease`, so they cannot
    /// block it.
    fn reclaim_collisions(&mut self, lease: &Lease, now: DateTime<Utc>) {
        let holders = [
            Some(lease.ip),
            self.ip_by_hw.get(&lease.hw_addr).copied(),
            self.ip_by_host.get(&lease.hostname_key()).copied(),
        ];
        for ip in holders.into_iter().flatten() {
            self.reclaim_expired(ip, now);
        }
    }

    fn reclaim_expired(&mut self, ip: IpAddr, now: DateTime<Utc>) -> bool {
        let expired = self
            .by_ip
            .get(&ip)
            .is_some_and(|lease| lease.is_expired_at(now));
        if expired {
            self.detach(ip);
        }
        expired
    }

    fn attach(&mut self, lease: Lease) {
        self.ip_by_hw.insert(lease.hw_addr.clone(), lease.ip);
        self.ip_by_host.insert(lease.hostname_key(), lease.ip);
        self.by_ip.insert(lease.ip, lease);
    }

    fn detach(&mut self, ip: IpAddr) -> Option<Lease> {
        let lease = self.by_ip.remove(&ip)?;
        if self.ip_by_hw.get(&lease.hw_addr) == Some(&ip) {
            self.ip_by_hw.remove(&lease.hw_addr);
        }
        let host_key = lease.hostname_key();
        if self.ip_by_host.get(&host_key) == Some(&ip) {
            self.ip_by_host.remove(&host_key);
        }
        Some(lease)
    }

    /// Asserts that the three maps describe exactly the same records.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.by_ip.len(), self.ip_by_hw.len());
        assert_eq!(self.by_ip.len(), self.ip_by_host.len());
        for (ip, lease) in &self.by_ip {
            assert_eq!(*ip, lease.ip);
            assert_eq!(self.ip_by_hw.get(&lease.hw_addr), Some(ip));
            assert_eq!(self.ip_by_host.get(&lease.hostname_key()), Some(ip));
        }
    }

    #[cfg(test)]
    pub(crate) fn get_mut(&mut self, ip: IpAddr) -> Option<&mut Lease> {
        self.by_ip.get_mut(&ip)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use chrono::TimeDelta;

    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn hw(last: u8) -> HardwareAddr {
        HardwareAddr::from([0xaa, 0xbb, 0xcc, 0xdd, 0xee, last])
    }

    fn dynamic(last_ip: u8, last_hw: u8, host: &str, now: DateTime<Utc>) -> Lease {
        Lease::new_dynamic(ip(last_ip), hw(last_hw), host, now + TimeDelta::hours(1))
    }

    fn conflict_field(result: Result<Option<Lease>>) -> ConflictField {
        match result {
            Err(Error::Conflict { field, .. }) => field,
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_add_and_lookup() {
        let now = Utc::now();
        let mut index = LeaseIndex::default();
        index
            .add(Lease::new_static(ip(5), hw(1), "printer"), now)
            .unwrap();

        assert_eq!(index.host_by_ip(ip(5), now), Some("printer".to_string()));
        assert_eq!(index.hw_by_ip(ip(5), now), Some(hw(1)));
        assert_eq!(index.ip_by_host("PRINTER", now), Some(ip(5)));
        assert_eq!(index.host_by_ip(ip(6), now), None);
        index.assert_consistent();
    }

    #[test]
    fn test_add_conflicts_identify_field() {
        let now = Utc::now();
        let mut index = LeaseIndex::default();
        index.add(dynamic(5, 1, "laptop", now), now).unwrap();

        let same_ip = dynamic(5, 2, "phone", now);
        assert_eq!(conflict_field(index.add(same_ip, now)), ConflictField::Address);

        let same_hw = dynamic(6, 1, "phone", now);
        assert_eq!(
            conflict_field(index.add(same_hw, now)),
            ConflictField::HardwareAddr
        );

        let same_host = dynamic(6, 2, "LAPTOP", now);
        assert_eq!(conflict_field(index.add(same_host, now)), ConflictField::Hostname);

        assert_eq!(index.snapshot(now), vec![dynamic(5, 1, "laptop", now)]);
        index.assert_consistent();
    }

    #[test]
    fn test_dynamic_renewal_replaces() {
        let now = Utc::now();
        let mut index = LeaseIndex::default();
        index.add(dynamic(5, 1, "laptop", now), now).unwrap();

        let renewed = Lease::new_dynamic(ip(5), hw(1), "laptop-2", now + TimeDelta::hours(2));
        let replaced = index.add(renewed.clone(), now).unwrap();

        assert_eq!(replaced.map(|lease| lease.hostname), Some("laptop".to_string()));
        assert_eq!(index.snapshot(now), vec![renewed]);
        assert_eq!(index.ip_by_host("laptop", now), None);
        index.assert_consistent();
    }

    #[test]
    fn test_static_is_not_renewed_by_add() {
        let now = Utc::now();
        let mut index = LeaseIndex::default();
        index
            .add(Lease::new_static(ip(5), hw(1), "printer"), now)
            .unwrap();

        let result = index.add(Lease::new_static(ip(5), hw(1), "printer"), now);
        assert_eq!(conflict_field(result), ConflictField::Address);
    }

    #[test]
    fn test_expired_record_grants_no_claim() {
        let now = Utc::now();
        let mut index = LeaseIndex::default();
        index.add(dynamic(5, 1, "laptop", now), now).unwrap();

        let later = now + TimeDelta::hours(2);
        assert_eq!(index.host_by_ip(ip(5), later), None);
        assert_eq!(index.hw_by_ip(ip(5), later), None);
        assert_eq!(index.ip_by_host("laptop", later), None);
        assert!(index.snapshot(later).is_empty());

        index
            .add(Lease::new_static(ip(5), hw(1), "laptop"), later)
            .unwrap();
        assert_eq!(index.len(), 1);
        index.assert_consistent();
    }

    #[test]
    fn test_expired_hostname_holder_is_reclaimed() {
        let now = Utc::now();
        let mut index = LeaseIndex::default();
        index.add(dynamic(5, 1, "laptop", now), now).unwrap();

        let later = now + TimeDelta::hours(2);
        index.add(dynamic(9, 9, "Laptop", later), later).unwrap();
        assert_eq!(index.ip_by_host("laptop", later), Some(ip(9)));
        assert_eq!(index.len(), 1);
        index.assert_consistent();
    }

    #[test]
    fn test_static_survives_any_expiry() {
        let now = Utc::now();
        let mut index = LeaseIndex::default();
        let mut lease = Lease::new_static(ip(5), hw(1), "printer");
        lease.expiry = now - TimeDelta::days(365);
        index.add(lease, now).unwrap();

        let much_later = now + TimeDelta::days(3650);
        assert_eq!(index.host_by_ip(ip(5), much_later), Some("printer".to_string()));
        assert_eq!(index.sweep(much_later), 0);
    }

    #[test]
    fn test_update_static() {
        let now = Utc::now();
        let mut index = LeaseIndex::default();
        index
            .add(Lease::new_static(ip(5), hw(1), "printer"), now)
            .unwrap();
        index.add(dynamic(6, 2, "laptop", now), now).unwrap();

        let moved = Lease::new_static(ip(7), hw(1), "Printer-Office");
        let previous = index.update_static(moved.clone(), now).unwrap();
        assert_eq!(previous.ip, ip(5));
        assert_eq!(index.host_by_ip(ip(5), now), None);
        assert_eq!(index.ip_by_host("printer", now), None);
        assert_eq!(index.ip_by_host("printer-office", now), Some(ip(7)));

        let renamed_only = Lease::new_static(ip(7), hw(1), "printer-office");
        index.update_static(renamed_only, now).unwrap();
        index.assert_consistent();
    }

    #[test]
    fn test_update_static_conflicts() {
        let now = Utc::now();
        let mut index = LeaseIndex::default();
        index
            .add(Lease::new_static(ip(5), hw(1), "printer"), now)
            .unwrap();
        index.add(dynamic(6, 2, "laptop", now), now).unwrap();

        let onto_taken_ip = Lease::new_static(ip(6), hw(1), "printer");
        assert!(matches!(
            index.update_static(onto_taken_ip, now),
            Err(Error::Conflict {
                field: ConflictField::Address,
                ..
            })
        ));

        let onto_taken_host = Lease::new_static(ip(5), hw(1), "laptop");
        assert!(matches!(
            index.update_static(onto_taken_host, now),
            Err(Error::Conflict {
                field: ConflictField::Hostname,
                ..
            })
        ));

        assert_eq!(index.host_by_ip(ip(5), now), Some("printer".to_string()));
        index.assert_consistent();
    }

    #[test]
    fn test_update_static_not_found() {
        let now = Utc::now();
        let mut index = LeaseIndex::default();
        index.add(dynamic(6, 2, "laptop", now), now).unwrap();

        let on_dynamic = Lease::new_static(ip(6), hw(2), "laptop");
        assert!(matches!(
            index.update_static(on_dynamic, now),
            Err(Error::NotFound(_))
        ));

        let unknown = Lease::new_static(ip(9), hw(9), "ghost");
        assert!(matches!(index.update_static(unknown, now), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_remove_requires_full_match() {
        let now = Utc::now();
        let mut index = LeaseIndex::default();
        index
            .add(Lease::new_static(ip(5), hw(1), "printer"), now)
            .unwrap();

        let partial = Lease::new_static(ip(5), hw(2), "printer");
        assert!(matches!(index.remove(&partial, now), Err(Error::NotFound(_))));
        assert_eq!(index.len(), 1);

        let removed = index
            .remove(&Lease::new_static(ip(5), hw(1), "anything"), now)
            .unwrap();
        assert_eq!(removed.hostname, "printer");
        assert_eq!(index.len(), 0);
        index.assert_consistent();
    }

    #[test]
    fn test_remove_expired_is_not_found() {
        let now = Utc::now();
        let mut index = LeaseIndex::default();
        index.add(dynamic(5, 1, "laptop", now), now).unwrap();

        let later = now + TimeDelta::hours(2);
        let result = index.remove(&dynamic(5, 1, "laptop", now), later);
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_sweep_and_clear() {
        let now = Utc::now();
        let mut index = LeaseIndex::default();
        index.add(dynamic(5, 1, "laptop", now), now).unwrap();
        index.add(dynamic(6, 2, "phone", now), now).unwrap();
        index
            .add(Lease::new_static(ip(7), hw(3), "printer"), now)
            .unwrap();

        assert_eq!(index.sweep(now), 0);
        assert_eq!(index.sweep(now + TimeDelta::hours(2)), 2);
        assert_eq!(index.len(), 1);
        index.assert_consistent();

        assert_eq!(index.clear(), 1);
        assert_eq!(index.clear(), 0);
        index.assert_consistent();
    }

    #[test]
    fn test_snapshot_sorted_by_address() {
        let now = Utc::now();
        let mut index = LeaseIndex::default();
        for (last, name) in [(9, "c"), (2, "a"), (5, "b")] {
            index.add(dynamic(last, last, name, now), now).unwrap();
        }
        let ips: Vec<IpAddr> = index.snapshot(now).into_iter().map(|lease| lease.ip).collect();
        assert_eq!(ips, vec![ip(2), ip(5), ip(9)]);
    }
}

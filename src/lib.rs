//! # leasedir
//!
//! The authoritative in-memory lease table behind a DHCP service, shared by
//! the protocol layer, the admin interface, and DNS client resolution.
//!
//! ## Features
//!
//! - Three uniqueness indices: address, hardware address, hostname
//!   (case-insensitive), all updated atomically
//! - Static reservations that never expire, dynamic leases that expire lazily
//! - Concurrent lookups behind a single reader/writer lock
//! - Persistence to a JSON file after each committed change
//! - Enabled/disabled service variants behind one contract
//! - Persistent client identification by IP, MAC, or DHCP hostname
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::net::{IpAddr, Ipv4Addr};
//! use leasedir::{Config, DhcpService, HardwareAddr, Lease};
//!
//! #[tokio::main]
//! async fn main() -> leasedir::Result<()> {
//!     let config = Config::load_or_create("config.json")?;
//!     let service = DhcpService::new(config).await?;
//!     service.start().await?;
//!
//!     let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 150));
//!     let hw: HardwareAddr = "aa:bb:cc:dd:ee:ff".parse()?;
//!     service.add_lease(Lease::new_static(ip, hw, "printer")).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`Lease`] - One binding of address, hardware address, and hostname
//! - [`LeaseDirectory`] - Thread-safe indexed lease store with persistence
//! - [`DhcpService`] - Enabled/disabled facade used by collaborators
//! - [`LeaseStore`] - Persistence backend, [`JsonFileStore`] by default
//! - [`ClientRegistry`] - Persistent clients resolved through DHCP lookups

pub mod clients;
pub mod config;
pub mod directory;
pub mod error;
pub mod hwaddr;
mod index;
pub mod lease;
pub mod service;
pub mod store;

pub use clients::{ClientId, ClientRegistry, PersistentClient};
pub use config::Config;
pub use directory::LeaseDirectory;
pub use error::{ConflictField, Error, Result};
pub use hwaddr::HardwareAddr;
pub use lease::Lease;
pub use service::{ActiveService, DhcpService};
pub use store::{JsonFileStore, LeaseStore};

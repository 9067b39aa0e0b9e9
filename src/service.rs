//! The DHCP lease service contract.
//!
//! [`DhcpService`] is what the protocol layer, the admin API, and DNS
//! client resolution hold. It is either backed by a [`LeaseDirectory`] or
//! disabled, and the choice is made once in [`DhcpService::new`]. The
//! disabled variant answers every lookup with nothing and accepts every
//! write as a no-op, so callers never special-case a switched-off feature.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::directory::LeaseDirectory;
use crate::error::{Error, Result};
use crate::hwaddr::HardwareAddr;
use crate::lease::Lease;
use crate::store::{JsonFileStore, LeaseStore};

/// Lease service selected from configuration.
#[derive(Debug)]
pub enum DhcpService {
    Enabled(ActiveService),
    Disabled,
}

/// The enabled variant: a lease directory plus its background sweeper.
#[derive(Debug)]
pub struct ActiveService {
    config: Config,
    directory: Arc<LeaseDirectory>,
    /// Stops the sweeper.
    stop: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl DhcpService {
    /// Builds the service described by `config`.
    ///
    /// A disabled configuration yields [`DhcpService::Disabled`] without
    /// touching the leases file.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the persisted
    /// leases cannot be loaded.
    pub async fn new(config: Config) -> Result<Self> {
        if !config.enabled {
            info!("DHCP is disabled");
            return Ok(Self::Disabled);
        }
        config.validate()?;

        let directory = match &config.leases_file {
            Some(path) => {
                let store: Arc<dyn LeaseStore> = Arc::new(JsonFileStore::new(path));
                LeaseDirectory::load(store).await?
            }
            None => LeaseDirectory::new(None),
        };

        Ok(Self::with_directory(config, directory))
    }

    /// Builds an enabled service around an existing directory.
    pub fn with_directory(config: Config, directory: LeaseDirectory) -> Self {
        Self::Enabled(ActiveService {
            config,
            directory: Arc::new(directory),
            stop: CancellationToken::new(),
            sweeper: Mutex::new(None),
        })
    }

    /// Returns true if DHCP provides information about clients.
    pub fn enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Returns the active configuration, or `None` when disabled.
    pub fn config(&self) -> Option<&Config> {
        match self {
            Self::Enabled(active) => Some(&active.config),
            Self::Disabled => None,
        }
    }

    /// Starts periodic sweeping of expired leases.
    ///
    /// Starting a running service does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] after [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> Result<()> {
        let Self::Enabled(active) = self else {
            return Ok(());
        };

        if active.directory.is_closed().await {
            return Err(Error::Unavailable);
        }

        let mut sweeper = active.sweeper.lock().await;
        if sweeper.is_some() {
            debug!("DHCP service already started");
            return Ok(());
        }

        let period = Duration::from_secs(active.config.sweep_interval_seconds);
        *sweeper = Some(tokio::spawn(run_sweeper(
            Arc::clone(&active.directory),
            period,
            active.stop.clone(),
        )));

        info!(
            "DHCP service started on {} ({} - {})",
            active.config.interface_name, active.config.range_start, active.config.range_end
        );
        Ok(())
    }

    /// Stops the sweeper, waits for in-flight operations, and saves the
    /// final lease table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires before the service
    /// drains.
    pub async fn shutdown(&self, cancel: &CancellationToken) -> Result<()> {
        let Self::Enabled(active) = self else {
            return Ok(());
        };

        active.stop.cancel();
        let handle = active.sweeper.lock().await.take();
        if let Some(handle) = handle {
            tokio::select! {
                biased;
                joined = handle => {
                    if let Err(err) = joined {
                        warn!("Lease sweeper ended abnormally: {}", err);
                    }
                }
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }

        active.directory.close(cancel).await?;
        info!("DHCP service stopped");
        Ok(())
    }

    /// Returns the hostname of the client leased `ip`, if any.
    pub async fn host_by_address(&self, ip: IpAddr) -> Option<String> {
        match self {
            Self::Enabled(active) => active.directory.host_by_ip(ip).await,
            Self::Disabled => None,
        }
    }

    /// Returns the hardware address of the client leased `ip`, if any.
    pub async fn hardware_by_address(&self, ip: IpAddr) -> Option<HardwareAddr> {
        match self {
            Self::Enabled(active) => active.directory.hw_by_ip(ip).await,
            Self::Disabled => None,
        }
    }

    /// Returns the address leased to `hostname`, if any.
    pub async fn address_by_host(&self, hostname: &str) -> Option<IpAddr> {
        match self {
            Self::Enabled(active) => active.directory.ip_by_host(hostname).await,
            Self::Disabled => None,
        }
    }

    /// Returns all live leases, sorted by address.
    pub async fn leases(&self) -> Vec<Lease> {
        match self {
            Self::Enabled(active) => active.directory.leases().await,
            Self::Disabled => Vec::new(),
        }
    }

    /// Adds a new lease. See [`LeaseDirectory::add_lease`].
    pub async fn add_lease(&self, lease: Lease) -> Result<()> {
        match self {
            Self::Enabled(active) => active.directory.add_lease(lease).await,
            Self::Disabled => Ok(()),
        }
    }

    /// Changes a static lease. See [`LeaseDirectory::update_static_lease`].
    pub async fn update_static_lease(&self, lease: Lease) -> Result<()> {
        match self {
            Self::Enabled(active) => active.directory.update_static_lease(lease).await,
            Self::Disabled => Ok(()),
        }
    }

    /// Removes a lease. See [`LeaseDirectory::remove_lease`].
    pub async fn remove_lease(&self, lease: &Lease) -> Result<()> {
        match self {
            Self::Enabled(active) => active.directory.remove_lease(lease).await,
            Self::Disabled => Ok(()),
        }
    }

    /// Removes all leases.
    pub async fn reset(&self) -> Result<()> {
        match self {
            Self::Enabled(active) => active.directory.reset().await,
            Self::Disabled => Ok(()),
        }
    }

    /// Drops expired dynamic leases now instead of waiting for the sweeper.
    pub async fn sweep_expired(&self) -> Result<usize> {
        match self {
            Self::Enabled(active) => active.directory.sweep_expired().await,
            Self::Disabled => Ok(0),
        }
    }
}

async fn run_sweeper(directory: Arc<LeaseDirectory>, period: Duration, stop: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match directory.sweep_expired().await {
                    Ok(0) => {}
                    Ok(count) => info!("Reclaimed {} expired lease(s)", count),
                    Err(Error::Unavailable) => break,
                    Err(err) => warn!("Failed to sweep expired leases: {}", err),
                }
            }
            _ = stop.cancelled() => {
                debug!("Lease sweeper shutting down");
                break;
            }
        }
    }
}

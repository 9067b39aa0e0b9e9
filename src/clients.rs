//! Persistent clients and their identification by address.
//!
//! DNS query handling maps a query's source address to a
//! [`PersistentClient`] to pick per-client settings. A client can be named
//! directly by IP, or indirectly by MAC address or hostname, which are
//! resolved through the DHCP lease service.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::hwaddr::HardwareAddr;
use crate::lease::normalize_hostname;
use crate::service::DhcpService;

/// Hardware address lengths accepted as client identifiers (EUI-48,
/// EUI-64, and 20-octet InfiniBand).
const MAC_LENGTHS: [usize; 3] = [6, 8, 20];

/// One identifier of a persistent client.
///
/// Parsed in order: IP address, hardware address, then a case-insensitive
/// name matched against DHCP hostnames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ClientId {
    Ip(IpAddr),
    Mac(HardwareAddr),
    Name(String),
}

impl FromStr for ClientId {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidClient("empty client id".to_string()));
        }
        if let Ok(ip) = text.parse::<IpAddr>() {
            return Ok(Self::Ip(ip));
        }
        if let Ok(mac) = text.parse::<HardwareAddr>()
            && MAC_LENGTHS.contains(&mac.len())
        {
            return Ok(Self::Mac(mac));
        }
        Ok(Self::Name(normalize_hostname(text)))
    }
}

impl TryFrom<String> for ClientId {
    type Error = Error;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(ip) => write!(formatter, "{}", ip),
            Self::Mac(mac) => write!(formatter, "{}", mac),
            Self::Name(name) => formatter.write_str(name),
        }
    }
}

/// Administrator-defined client with its own DNS settings.
///
/// `Clone` produces a fully independent copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentClient {
    pub name: String,
    pub ids: Vec<ClientId>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub upstreams: Vec<String>,
    #[serde(default)]
    pub upstreams_cache_size: u32,
    #[serde(default)]
    pub upstreams_cache_enabled: bool,
    #[serde(default)]
    pub use_own_settings: bool,
    #[serde(default)]
    pub filtering_enabled: bool,
    #[serde(default)]
    pub safe_browsing_enabled: bool,
    #[serde(default)]
    pub parental_enabled: bool,
    #[serde(default)]
    pub safe_search_enabled: bool,
    #[serde(default)]
    pub use_own_blocked_services: bool,
    #[serde(default)]
    pub blocked_services: Vec<String>,
    #[serde(default)]
    pub ignore_query_log: bool,
    #[serde(default)]
    pub ignore_statistics: bool,
}

impl PersistentClient {
    pub fn new(name: impl Into<String>, ids: Vec<ClientId>) -> Self {
        Self {
            name: name.into(),
            ids,
            ..Default::default()
        }
    }

    /// Returns true if the client's own blocked-services list applies and
    /// contains `service`.
    pub fn blocks_service(&self, service: &str) -> bool {
        self.use_own_blocked_services
            && self
                .blocked_services
                .iter()
                .any(|blocked| blocked.eq_ignore_ascii_case(service))
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidClient("client name is empty".to_string()));
        }
        if self.ids.is_empty() {
            return Err(Error::InvalidClient(format!(
                "client {:?} has no identifiers",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ClientTable {
    by_name: HashMap<String, PersistentClient>,
    /// Identifier → client name.
    by_id: HashMap<ClientId, String>,
}

/// Thread-safe set of persistent clients indexed by name and identifier.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    table: RwLock<ClientTable>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidClient`] if the name or identifier list is empty
    /// - [`Error::ClientExists`] if the name or any identifier is taken
    pub async fn add(&self, client: PersistentClient) -> Result<()> {
        client.validate()?;
        let mut table = self.table.write().await;

        if table.by_name.contains_key(&client.name) {
            return Err(Error::ClientExists(client.name));
        }
        for id in &client.ids {
            if let Some(owner) = table.by_id.get(id) {
                return Err(Error::ClientExists(format!(
                    "{} (id {} is used by {})",
                    client.name, id, owner
                )));
            }
        }

        for id in &client.ids {
            table.by_id.insert(id.clone(), client.name.clone());
        }
        info!("Added persistent client {}", client.name);
        table.by_name.insert(client.name.clone(), client);
        Ok(())
    }

    /// Removes a client by name and returns it.
    pub async fn remove(&self, name: &str) -> Result<PersistentClient> {
        let mut table = self.table.write().await;
        let client = table
            .by_name
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("client {}", name)))?;
        for id in &client.ids {
            table.by_id.remove(id);
        }
        info!("Removed persistent client {}", name);
        Ok(client)
    }

    /// Returns a copy of the client owning `id`.
    pub async fn find(&self, id: &ClientId) -> Option<PersistentClient> {
        let table = self.table.read().await;
        Self::find_in(&table, id)
    }

    /// Identifies the client behind a query's source address.
    ///
    /// Checks, in order: the address itself, the hardware address DHCP
    /// leased it to, and the hostname DHCP leased it to. With DHCP
    /// disabled only the first check can match.
    pub async fn find_by_addr(&self, ip: IpAddr, dhcp: &DhcpService) -> Option<PersistentClient> {
        let mac = dhcp.hardware_by_address(ip).await;
        let host = dhcp.host_by_address(ip).await;

        let candidates = [
            Some(ClientId::Ip(ip)),
            mac.map(ClientId::Mac),
            host.map(|host| ClientId::Name(normalize_hostname(&host))),
        ];

        let table = self.table.read().await;
        let found = candidates
            .iter()
            .flatten()
            .find_map(|id| Self::find_in(&table, id));

        if let Some(client) = &found {
            debug!("Client {} identified as {}", ip, client.name);
        }
        found
    }

    /// Returns copies of all clients, sorted by name.
    pub async fn clients(&self) -> Vec<PersistentClient> {
        let table = self.table.read().await;
        let mut clients: Vec<PersistentClient> = table.by_name.values().cloned().collect();
        clients.sort_by(|left, right| left.name.cmp(&right.name));
        clients
    }

    fn find_in(table: &ClientTable, id: &ClientId) -> Option<PersistentClient> {
        table
            .by_id
            .get(id)
            .and_then(|name| table.by_name.get(name))
            .cloned()
    }
}

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use chrono::TimeDelta;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub enabled: bool,
    pub interface_name: String,
    pub range_start: IpAddr,
    pub range_end: IpAddr,
    pub lease_duration_seconds: u32,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default)]
    pub leases_file: Option<PathBuf>,
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            interface_name: "eth0".to_string(),
            range_start: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)),
            range_end: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 200)),
            lease_duration_seconds: 86400,
            sweep_interval_seconds: default_sweep_interval(),
            leases_file: Some(PathBuf::from("leases.json")),
        }
    }
}

impl Config {
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Checks an enabled configuration. A disabled one is always valid.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.interface_name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "interface_name must not be empty".to_string(),
            ));
        }

        if self.range_start.is_ipv4() != self.range_end.is_ipv4() {
            return Err(Error::InvalidConfig(
                "range_start and range_end must be the same address family".to_string(),
            ));
        }

        if self.range_start > self.range_end {
            return Err(Error::InvalidConfig(
                "range_start must be less than or equal to range_end".to_string(),
            ));
        }

        if self.range_start.is_unspecified() {
            return Err(Error::InvalidConfig(
                "range_start must not be the unspecified address".to_string(),
            ));
        }

        if self.lease_duration_seconds == 0 {
            return Err(Error::InvalidConfig(
                "lease_duration_seconds must be greater than 0".to_string(),
            ));
        }

        if self.sweep_interval_seconds == 0 {
            return Err(Error::InvalidConfig(
                "sweep_interval_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Duration granted to dynamic leases.
    pub fn lease_duration(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.lease_duration_seconds))
    }
}

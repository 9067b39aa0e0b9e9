use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A physical hardware address of variable length.
///
/// Parsed from colon- or hyphen-separated hex octets and always rendered
/// lowercase and colon-separated, so `AA-BB-CC-DD-EE-FF` and
/// `aa:bb:cc:dd:ee:ff` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardwareAddr(Vec<u8>);

impl HardwareAddr {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<&[u8]> for HardwareAddr {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for HardwareAddr {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes.to_vec())
    }
}

impl FromStr for HardwareAddr {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidHardwareAddr("empty".to_string()));
        }

        let separator = if text.contains('-') { '-' } else { ':' };
        text.split(separator)
            .map(|part| {
                if part.len() != 2 {
                    return Err(Error::InvalidHardwareAddr(text.to_string()));
                }
                u8::from_str_radix(part, 16)
                    .map_err(|_| Error::InvalidHardwareAddr(text.to_string()))
            })
            .collect::<Result<Vec<u8>, Error>>()
            .map(Self)
    }
}

impl TryFrom<String> for HardwareAddr {
    type Error = Error;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<HardwareAddr> for String {
    fn from(addr: HardwareAddr) -> Self {
        addr.to_string()
    }
}

impl fmt::Display for HardwareAddr {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, byte) in self.0.iter().enumerate() {
            if index > 0 {
                formatter.write_str(":")?;
            }
            write!(formatter, "{:02x}", byte)?;
        }
        Ok(())
    }
}

//! The unit manifest: the ordered list of stream names written next to the
//! exported data at backup time and read back at restore time.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

pub const MANIFEST_FILE_NAME: &str = "streams.json";

/// Ordered, duplicate-free list of unit names. Serialized as a bare JSON
/// array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitManifest {
    units: Vec<String>,
}

impl UnitManifest {
    /// Keeps the first occurrence of every name, in input order.
    pub fn new<I, S>(units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for unit in units {
            let unit = unit.into();
            if !out.contains(&unit) {
                out.push(unit);
            }
        }
        Self { units: out }
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        // `null` is what the listing prints for a server without streams.
        let units: Option<Vec<String>> = serde_json::from_slice(data)
            .map_err(|e| Error::Enumeration(format!("malformed manifest: {}", e)))?;
        Ok(Self::new(units.unwrap_or_default()))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.units)?)
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let data = fs::read(path).await.map_err(|e| {
            Error::Enumeration(format!("cannot read manifest {}: {}", path.display(), e))
        })?;
        Self::decode(&data)
    }

    pub async fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.encode()?).await?;
        Ok(())
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn into_units(self) -> Vec<String> {
        self.units
    }
}

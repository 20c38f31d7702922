use super::tool::StreamTool;
use std::time::Instant;
use streamsnap_core::{Error, Result, StagingDir, MANIFEST_FILE_NAME};
use tracing::info;

/// Rejects names that would escape the staging directory or collide with
/// the manifest.
pub fn validate_unit_name(unit: &str) -> Result<()> {
    let invalid = unit.is_empty()
        || unit == "."
        || unit == ".."
        || unit == MANIFEST_FILE_NAME
        || unit.contains('/')
        || unit.contains('\\');
    if invalid {
        return Err(Error::Transfer {
            unit: unit.to_string(),
            reason: "not a valid stream name".to_string(),
        });
    }
    Ok(())
}

/// Moves streams between the server and the staging directory, one at a
/// time and in the given order. The first failure ends the run.
pub struct UnitTransferDriver<'a> {
    tool: &'a dyn StreamTool,
    staging: &'a StagingDir,
}

impl<'a> UnitTransferDriver<'a> {
    pub fn new(tool: &'a dyn StreamTool, staging: &'a StagingDir) -> Self {
        Self { tool, staging }
    }

    pub async fn export_all(&self, units: &[String]) -> Result<()> {
        for unit in units {
            validate_unit_name(unit)?;
            let started = Instant::now();
            self.tool
                .export(unit, &self.staging.unit_path(unit))
                .await
                .map_err(|e| transfer_error(unit, e))?;
            info!(stream = %unit, elapsed_ms = started.elapsed().as_millis() as u64, "Exported stream");
        }
        Ok(())
    }

    pub async fn import_all(&self, units: &[String]) -> Result<()> {
        for unit in units {
            validate_unit_name(unit)?;
            let started = Instant::now();
            self.tool
                .import(unit, &self.staging.unit_path(unit))
                .await
                .map_err(|e| transfer_error(unit, e))?;
            info!(stream = %unit, elapsed_ms = started.elapsed().as_millis() as u64, "Imported stream");
        }
        Ok(())
    }
}

fn transfer_error(unit: &str, error: Error) -> Error {
    Error::Transfer {
        unit: unit.to_string(),
        reason: error.to_string(),
    }
}

use super::tool::StreamTool;
use streamsnap_core::{Error, Result, StagingDir, UnitManifest};
use tokio::fs;
use tracing::{debug, info};

/// Decides which streams a run covers and keeps the staging manifest in
/// step with that decision.
pub struct UnitEnumerator;

impl UnitEnumerator {
    /// A non-empty `fixed` list wins and is written as the manifest.
    /// Otherwise the live listing is written verbatim and then decoded.
    pub async fn for_backup(
        tool: &dyn StreamTool,
        staging: &StagingDir,
        fixed: &[String],
    ) -> Result<UnitManifest> {
        let manifest_path = staging.manifest_path();

        if !fixed.is_empty() {
            let manifest = UnitManifest::new(fixed.iter().cloned());
            manifest.write(&manifest_path).await?;
            info!(streams = manifest.len(), "Using the configured stream list");
            return Ok(manifest);
        }

        let raw = tool
            .list_raw()
            .await
            .map_err(|e| Error::Enumeration(e.to_string()))?;
        fs::write(&manifest_path, &raw)
            .await
            .map_err(|e| Error::Enumeration(format!("{}: {}", manifest_path.display(), e)))?;

        let manifest = UnitManifest::decode(&raw)?;
        info!(streams = manifest.len(), "Listed streams on the server");
        Ok(manifest)
    }

    /// A non-empty `overrides` list is used as is; otherwise the manifest
    /// restored from the snapshot must be present and valid.
    pub async fn for_restore(staging: &StagingDir, overrides: &[String]) -> Result<UnitManifest> {
        if !overrides.is_empty() {
            debug!("Stream list overridden, manifest not read");
            return Ok(UnitManifest::new(overrides.iter().cloned()));
        }
        let manifest = UnitManifest::read(&staging.manifest_path()).await?;
        info!(streams = manifest.len(), "Read stream manifest");
        Ok(manifest)
    }
}

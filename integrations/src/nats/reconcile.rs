use super::tool::StreamTool;
use streamsnap_core::{Error, Result};
use tracing::{info, warn};

/// Clears streams that a restore is about to recreate.
pub struct OverwriteReconciler<'a> {
    tool: &'a dyn StreamTool,
}

impl<'a> OverwriteReconciler<'a> {
    pub fn new(tool: &'a dyn StreamTool) -> Self {
        Self { tool }
    }

    /// Deletes every desired stream that currently exists, in desired
    /// order, and returns their names. Live streams that are not desired
    /// are left alone.
    pub async fn reconcile(&self, desired: &[String]) -> Result<Vec<String>> {
        let live = self
            .tool
            .list()
            .await
            .map_err(|e| Error::Reconciliation(format!("listing streams: {}", e)))?;

        let doomed: Vec<String> = desired
            .iter()
            .filter(|unit| live.contains(unit))
            .cloned()
            .collect();

        for unit in &doomed {
            warn!(stream = %unit, "Deleting existing stream before restore");
            self.tool
                .delete(unit)
                .await
                .map_err(|e| Error::Reconciliation(format!("deleting stream {}: {}", unit, e)))?;
        }
        info!(deleted = doomed.len(), "Overwrite reconciliation finished");
        Ok(doomed)
    }
}

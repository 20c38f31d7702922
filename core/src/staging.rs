use crate::manifest::MANIFEST_FILE_NAME;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// The interim directory holding one entry per exported stream plus the
/// manifest. Owned by a single run; nothing here locks it.
#[derive(Debug, Clone)]
pub struct StagingDir {
    root: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingUsage {
    pub files: u64,
    pub bytes: u64,
}

impl StagingDir {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Like `new`, but anchors a relative root at the current directory so
    /// the path handed to the snapshot engine matches what it records.
    pub fn absolute<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("interim data directory is not set".to_string()));
        }
        Ok(Self::new(std::path::absolute(root)?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }

    pub fn unit_path(&self, unit: &str) -> PathBuf {
        self.root.join(unit)
    }

    /// Removes everything under the directory and recreates it empty.
    pub async fn clear(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("interim data directory is not set".to_string()));
        }
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Other(format!(
                    "unable to clean data dir {}: {}",
                    self.root.display(),
                    e
                )));
            }
        }
        fs::create_dir_all(&self.root).await?;
        debug!("Cleared staging directory {}", self.root.display());
        Ok(())
    }

    pub fn usage(&self) -> StagingUsage {
        let mut usage = StagingUsage::default();
        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if let Ok(metadata) = entry.metadata() {
                if metadata.is_file() {
                    usage.files += 1;
                    usage.bytes += metadata.len();
                }
            }
        }
        usage
    }
}

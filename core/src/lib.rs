pub mod error;
pub mod manifest;
pub mod staging;
pub mod types;

pub use error::{Error, Result};
pub use manifest::{UnitManifest, MANIFEST_FILE_NAME};
pub use staging::{StagingDir, StagingUsage};
pub use types::*;

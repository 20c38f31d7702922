use crate::store::{ObjectKind, ObjectStore};
use async_trait::async_trait;
use bytes::Bytes;
use streamsnap_core::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Object store backed by a mounted directory laid out as
/// `<root>/<namespace>/<kind plural>/<name>.json`.
pub struct LocalObjectStore {
    base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn valid_segment(segment: &str) -> bool {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && !segment.contains('/')
            && !segment.contains('\\')
    }

    fn full_path(&self, kind: ObjectKind, namespace: &str, name: &str) -> PathBuf {
        self.base_path
            .join(namespace)
            .join(kind.plural())
            .join(format!("{}.json", name))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<Bytes> {
        if !Self::valid_segment(namespace) || !Self::valid_segment(name) {
            return Err(Error::InvalidConfig(format!(
                "invalid {} reference {}/{}",
                kind, namespace, name
            )));
        }
        let full_path = self.full_path(kind, namespace, name);
        match fs::read(&full_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::ObjectNotFound {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(Error::Other(format!(
                "Failed to read {}: {}",
                full_path.display(),
                e
            ))),
        }
    }
}

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use streamsnap_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Secret,
    AppBinding,
}

impl ObjectKind {
    /// Directory / resource name used when laying objects out on disk.
    pub fn plural(&self) -> &'static str {
        match self {
            ObjectKind::Secret => "secrets",
            ObjectKind::AppBinding => "appbindings",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Secret => write!(f, "Secret"),
            ObjectKind::AppBinding => write!(f, "AppBinding"),
        }
    }
}

/// Read access to named cluster objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<Bytes>;
}

/// Raw secret payload keyed by data key.
pub type SecretData = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Deserialize)]
struct SecretObject {
    #[serde(default)]
    data: BTreeMap<String, String>,
}

/// Decodes a Kubernetes style secret document, `{"data": {key: base64}}`.
pub fn decode_secret(raw: &[u8]) -> Result<SecretData> {
    let secret: SecretObject = serde_json::from_slice(raw)?;
    secret
        .data
        .into_iter()
        .map(|(key, value)| {
            STANDARD
                .decode(value.trim())
                .map(|bytes| (key.clone(), bytes))
                .map_err(|e| Error::Other(format!("secret key {} is not valid base64: {}", key, e)))
        })
        .collect()
}

pub async fn get_secret(store: &dyn ObjectStore, namespace: &str, name: &str) -> Result<SecretData> {
    let raw = store.get(ObjectKind::Secret, namespace, name).await?;
    decode_secret(&raw)
}

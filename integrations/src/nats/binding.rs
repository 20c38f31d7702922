//! Connection descriptor (an AppBinding document) and the secret transforms
//! it may declare.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Deserializer};
use std::fmt;
use streamsnap_backends::{get_secret, ObjectKind, ObjectStore, SecretData};
use streamsnap_core::{Error, Result};
use tracing::debug;

pub const DEFAULT_NATS_PORT: u16 = 4222;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    #[serde(default)]
    pub spec: BindingSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingSpec {
    #[serde(default)]
    pub client_config: ClientConfig,
    #[serde(default)]
    pub secret: Option<LocalObjectRef>,
    #[serde(default)]
    pub secret_transforms: Vec<SecretTransform>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub service: Option<ServiceReference>,
    #[serde(default, deserialize_with = "base64_bytes")]
    pub ca_bundle: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceReference {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    pub name: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalObjectRef {
    pub name: String,
}

/// Byte-level rewrite of the raw secret before any scheme is looked at.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecretTransform {
    RenameKey { from: String, to: String },
    AddKey { key: String, value: String },
    RemoveKey { key: String },
    AddKeysFrom {
        #[serde(rename = "secretRef")]
        secret_ref: LocalObjectRef,
    },
}

// `addKey` carries a secret value, which must never reach the logs.
impl fmt::Debug for SecretTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretTransform::RenameKey { from, to } => f
                .debug_struct("RenameKey")
                .field("from", from)
                .field("to", to)
                .finish(),
            SecretTransform::AddKey { key, .. } => f
                .debug_struct("AddKey")
                .field("key", key)
                .finish_non_exhaustive(),
            SecretTransform::RemoveKey { key } => f.debug_struct("RemoveKey").field("key", key).finish(),
            SecretTransform::AddKeysFrom { secret_ref } => f
                .debug_struct("AddKeysFrom")
                .field("secret_ref", &secret_ref.name)
                .finish(),
        }
    }
}

fn default_scheme() -> String {
    "nats".to_string()
}

fn base64_bytes<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded: Option<String> = Option::deserialize(deserializer)?;
    match encoded {
        Some(s) if !s.trim().is_empty() => STANDARD
            .decode(s.trim())
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

impl ConnectionDescriptor {
    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| Error::CredentialResolution(format!("malformed AppBinding: {}", e)))
    }

    pub async fn load(store: &dyn ObjectStore, namespace: &str, name: &str) -> Result<Self> {
        let raw = store
            .get(ObjectKind::AppBinding, namespace, name)
            .await
            .map_err(|e| Error::CredentialResolution(e.to_string()))?;
        Self::from_slice(&raw)
    }

    /// Server address handed to the tool.
    pub fn address(&self) -> Result<String> {
        let config = &self.spec.client_config;
        if let Some(url) = config.url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(url.to_string());
        }
        if let Some(service) = &config.service {
            let port = service.port.unwrap_or(DEFAULT_NATS_PORT);
            let path = service.path.as_deref().unwrap_or("");
            return Ok(format!("{}://{}:{}{}", service.scheme, service.name, port, path));
        }
        Err(Error::CredentialResolution(
            "AppBinding has neither clientConfig.url nor clientConfig.service".to_string(),
        ))
    }

    pub fn ca_bundle(&self) -> Option<&[u8]> {
        self.spec.client_config.ca_bundle.as_deref()
    }

    pub fn secret_name(&self) -> Option<&str> {
        self.spec.secret.as_ref().map(|s| s.name.as_str())
    }

    /// Applies every declared transform in order. Call exactly once per
    /// fetched secret.
    pub async fn transform_secret(
        &self,
        store: &dyn ObjectStore,
        namespace: &str,
        data: &mut SecretData,
    ) -> Result<()> {
        for transform in &self.spec.secret_transforms {
            debug!(?transform, "Applying secret transform");
            match transform {
                SecretTransform::RenameKey { from, to } => {
                    if let Some(value) = data.remove(from) {
                        data.insert(to.clone(), value);
                    }
                }
                SecretTransform::AddKey { key, value } => {
                    let bytes = STANDARD.decode(value.trim()).map_err(|e| {
                        Error::CredentialResolution(format!("addKey {} is not valid base64: {}", key, e))
                    })?;
                    data.insert(key.clone(), bytes);
                }
                SecretTransform::RemoveKey { key } => {
                    data.remove(key);
                }
                SecretTransform::AddKeysFrom { secret_ref } => {
                    let other = get_secret(store, namespace, &secret_ref.name)
                        .await
                        .map_err(|e| Error::CredentialResolution(e.to_string()))?;
                    data.extend(other);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::test_support::MemoryStore;

    #[test]
    fn test_parses_app_binding_document() {
        let raw = br#"{
            "apiVersion": "appcatalog.appscode.com/v1alpha1",
            "kind": "AppBinding",
            "spec": {
                "clientConfig": {"url": "nats://sample-nats.demo.svc:4222", "caBundle": "Y2EtZGF0YQ=="},
                "secret": {"name": "sample-nats-auth"},
                "secretTransforms": [{"renameKey": {"from": "user", "to": "username"}}]
            }
        }"#;

        let descriptor = ConnectionDescriptor::from_slice(raw).unwrap();
        assert_eq!(descriptor.address().unwrap(), "nats://sample-nats.demo.svc:4222");
        assert_eq!(descriptor.ca_bundle(), Some(&b"ca-data"[..]));
        assert_eq!(descriptor.secret_name(), Some("sample-nats-auth"));
        assert_eq!(
            descriptor.spec.secret_transforms,
            vec![SecretTransform::RenameKey {
                from: "user".to_string(),
                to: "username".to_string()
            }]
        );
    }

    #[test]
    fn test_service_address_defaults_port() {
        let raw = br#"{"spec": {"clientConfig": {"service": {"name": "sample-nats"}}}}"#;
        let descriptor = ConnectionDescriptor::from_slice(raw).unwrap();
        assert_eq!(descriptor.address().unwrap(), "nats://sample-nats:4222");
    }

    #[test]
    fn test_missing_address_is_resolution_error() {
        let descriptor = ConnectionDescriptor::from_slice(b"{}").unwrap();
        assert!(matches!(descriptor.address(), Err(Error::CredentialResolution(_))));
    }

    #[tokio::test]
    async fn test_transforms_apply_in_order() {
        let store = MemoryStore::new();
        store.insert_secret("demo", "extra", &[("nkey", "SUAEXTRA")]);
        let raw = br#"{"spec": {"secretTransforms": [
            {"renameKey": {"from": "user", "to": "username"}},
            {"addKey": {"key": "password", "value": "cGFzcw=="}},
            {"removeKey": {"key": "junk"}},
            {"addKeysFrom": {"secretRef": {"name": "extra"}}}
        ]}}"#;
        let descriptor = ConnectionDescriptor::from_slice(raw).unwrap();
        let mut data = SecretData::new();
        data.insert("user".to_string(), b"admin".to_vec());
        data.insert("junk".to_string(), b"x".to_vec());

        descriptor.transform_secret(&store, "demo", &mut data).await.unwrap();

        let keys: Vec<&str> = data.keys().map(String::as_str).collect();
        assert_eq!(keys, ["nkey", "password", "username"]);
        assert_eq!(data["username"], b"admin");
        assert_eq!(data["password"], b"pass");
        assert_eq!(data["nkey"], b"SUAEXTRA");
    }

    #[test]
    fn test_debug_output_hides_added_values() {
        let raw = br#"{"spec": {"secretTransforms": [{"addKey": {"key": "password", "value": "c3VwZXJzZWNyZXQ="}}]}}"#;
        let descriptor = ConnectionDescriptor::from_slice(raw).unwrap();

        let shown = format!("{:?}", descriptor.spec.secret_transforms[0]);
        assert!(shown.contains("password"));
        assert!(!shown.contains("c3VwZXJzZWNyZXQ="));

        let shown = format!("{:?}", descriptor);
        assert!(!shown.contains("c3VwZXJzZWNyZXQ="));
    }

    #[tokio::test]
    async fn test_add_keys_from_missing_secret_fails() {
        let store = MemoryStore::new();
        let raw = br#"{"spec": {"secretTransforms": [{"addKeysFrom": {"secretRef": {"name": "gone"}}}]}}"#;
        let descriptor = ConnectionDescriptor::from_slice(raw).unwrap();

        let err = descriptor
            .transform_secret(&store, "demo", &mut SecretData::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CredentialResolution(_)));
    }
}

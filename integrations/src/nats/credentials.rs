//! Turns an AppBinding's secret and trust bundle into staged files and
//! environment variables for the `nats` CLI.

use super::binding::ConnectionDescriptor;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use streamsnap_backends::{get_secret, ObjectStore, SecretData};
use streamsnap_core::{Error, Result};
use tokio::fs;
use tracing::{debug, info};

/// Anything that accepts environment assignments for a later tool run.
pub trait EnvSink {
    fn set_env(&mut self, key: &str, value: &str);
}

impl EnvSink for BTreeMap<String, String> {
    fn set_env(&mut self, key: &str, value: &str) {
        self.insert(key.to_string(), value.to_string());
    }
}

/// Secret key bound directly into an environment variable.
#[derive(Debug, Clone)]
pub struct EnvBinding {
    pub key: String,
    pub env: String,
}

/// Secret key staged as a file whose path is bound into an environment
/// variable.
#[derive(Debug, Clone)]
pub struct FileBinding {
    pub key: String,
    pub file_name: String,
    pub env: String,
}

impl EnvBinding {
    fn new(key: &str, env: &str) -> Self {
        Self {
            key: key.to_string(),
            env: env.to_string(),
        }
    }
}

impl FileBinding {
    fn new(key: &str, file_name: &str, env: &str) -> Self {
        Self {
            key: key.to_string(),
            file_name: file_name.to_string(),
            env: env.to_string(),
        }
    }
}

/// Secret keys, staged file names and environment names per scheme.
#[derive(Debug, Clone)]
pub struct CredentialLayout {
    pub server_url_env: String,
    pub token: EnvBinding,
    pub username: EnvBinding,
    pub password: EnvBinding,
    pub signing_key: FileBinding,
    pub certificate: FileBinding,
    pub private_key: FileBinding,
    pub jwt_creds: FileBinding,
    pub ca_file_name: String,
    pub ca_env: String,
}

impl Default for CredentialLayout {
    fn default() -> Self {
        Self {
            server_url_env: "NATS_URL".to_string(),
            // The nats CLI reads a token from the user slot.
            token: EnvBinding::new("token", "NATS_USER"),
            username: EnvBinding::new("username", "NATS_USER"),
            password: EnvBinding::new("password", "NATS_PASSWORD"),
            signing_key: FileBinding::new("nkey", "user.nk", "NATS_NKEY"),
            certificate: FileBinding::new("crt", "tls.crt", "NATS_CERT"),
            private_key: FileBinding::new("key", "tls.key", "NATS_KEY"),
            jwt_creds: FileBinding::new("creds", "user.creds", "NATS_CREDS"),
            ca_file_name: "ca.crt".to_string(),
            ca_env: "NATS_CA".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialScheme<'a> {
    Token(&'a [u8]),
    /// A password is only ever used together with a username.
    BasicAuth {
        username: &'a [u8],
        password: Option<&'a [u8]>,
    },
    SigningKey(&'a [u8]),
    CertPair { cert: &'a [u8], key: &'a [u8] },
    JwtCreds(&'a [u8]),
}

/// Resolved (and already transformed) secret payload.
#[derive(Debug, Clone, Default)]
pub struct SecretBundle {
    data: SecretData,
}

impl SecretBundle {
    pub fn new(data: SecretData) -> Self {
        Self { data }
    }

    fn present(&self, key: &str) -> Option<&[u8]> {
        self.data
            .get(key)
            .map(Vec::as_slice)
            .filter(|value| !value.is_empty())
    }

    /// Every scheme whose data is present, in a fixed order. Schemes are not
    /// mutually exclusive.
    pub fn schemes(&self, layout: &CredentialLayout) -> Vec<CredentialScheme<'_>> {
        let mut schemes = Vec::new();
        if let Some(token) = self.present(&layout.token.key) {
            schemes.push(CredentialScheme::Token(token));
        }
        if let Some(username) = self.present(&layout.username.key) {
            schemes.push(CredentialScheme::BasicAuth {
                username,
                password: self.present(&layout.password.key),
            });
        }
        if let Some(nkey) = self.present(&layout.signing_key.key) {
            schemes.push(CredentialScheme::SigningKey(nkey));
        }
        if let (Some(cert), Some(key)) = (
            self.present(&layout.certificate.key),
            self.present(&layout.private_key.key),
        ) {
            schemes.push(CredentialScheme::CertPair { cert, key });
        }
        if let Some(creds) = self.present(&layout.jwt_creds.key) {
            schemes.push(CredentialScheme::JwtCreds(creds));
        }
        schemes
    }
}

pub struct CredentialMaterializer {
    layout: CredentialLayout,
    scratch_dir: PathBuf,
}

impl CredentialMaterializer {
    pub fn new<P: AsRef<Path>>(layout: CredentialLayout, scratch_dir: P) -> Self {
        Self {
            layout,
            scratch_dir: scratch_dir.as_ref().to_path_buf(),
        }
    }

    /// Binds the server address and trust bundle, then resolves the
    /// descriptor's secret (if any), runs its transforms once and applies
    /// every present scheme. Files staged before a failure are left behind.
    pub async fn materialize(
        &self,
        store: &dyn ObjectStore,
        namespace: &str,
        descriptor: &ConnectionDescriptor,
        sink: &mut dyn EnvSink,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| Error::Materialization(format!("{}: {}", self.scratch_dir.display(), e)))?;

        sink.set_env(&self.layout.server_url_env, &descriptor.address()?);

        let mut staged = Vec::new();
        if let Some(ca) = descriptor.ca_bundle() {
            let path = self.stage(&self.layout.ca_file_name, ca).await?;
            sink.set_env(&self.layout.ca_env, &path.display().to_string());
            staged.push(path);
        }

        let Some(secret_name) = descriptor.secret_name() else {
            debug!("AppBinding has no secret, connecting without credentials");
            return Ok(staged);
        };

        let mut data = get_secret(store, namespace, secret_name)
            .await
            .map_err(|e| Error::CredentialResolution(e.to_string()))?;
        descriptor.transform_secret(store, namespace, &mut data).await?;

        staged.extend(self.apply(&SecretBundle::new(data), sink).await?);
        info!("Materialized credentials from secret {}/{}", namespace, secret_name);
        Ok(staged)
    }

    pub async fn apply(&self, bundle: &SecretBundle, sink: &mut dyn EnvSink) -> Result<Vec<PathBuf>> {
        let layout = &self.layout;
        let mut staged = Vec::new();

        for scheme in bundle.schemes(layout) {
            match scheme {
                CredentialScheme::Token(token) => {
                    sink.set_env(&layout.token.env, &String::from_utf8_lossy(token));
                }
                CredentialScheme::BasicAuth { username, password } => {
                    sink.set_env(&layout.username.env, &String::from_utf8_lossy(username));
                    if let Some(password) = password {
                        sink.set_env(&layout.password.env, &String::from_utf8_lossy(password));
                    }
                }
                CredentialScheme::SigningKey(nkey) => {
                    staged.push(self.stage_bound(&layout.signing_key, nkey, sink).await?);
                }
                CredentialScheme::CertPair { cert, key } => {
                    staged.push(self.stage_bound(&layout.certificate, cert, sink).await?);
                    staged.push(self.stage_bound(&layout.private_key, key, sink).await?);
                }
                CredentialScheme::JwtCreds(creds) => {
                    staged.push(self.stage_bound(&layout.jwt_creds, creds, sink).await?);
                }
            }
        }
        Ok(staged)
    }

    async fn stage_bound(&self, binding: &FileBinding, data: &[u8], sink: &mut dyn EnvSink) -> Result<PathBuf> {
        let path = self.stage(&binding.file_name, data).await?;
        sink.set_env(&binding.env, &path.display().to_string());
        Ok(path)
    }

    async fn stage(&self, file_name: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.scratch_dir.join(file_name);
        fs::write(&path, data)
            .await
            .map_err(|e| Error::Materialization(format!("{}: {}", path.display(), e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| Error::Materialization(format!("{}: {}", path.display(), e)))?;
        }

        debug!("Staged {}", path.display());
        Ok(path)
    }
}

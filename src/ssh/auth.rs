use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::keys::{HashAlg, PrivateKeyWithHashAlg};
use secrecy::{ExposeSecret, SecretString};

use crate::config::paths;
use crate::error::SshError;
use crate::validation;

/// Credentials supplied by the caller for one `open`
#[derive(Clone)]
pub enum Credentials {
    Password(SecretString),
    KeyFile {
        path: PathBuf,
        passphrase: Option<SecretString>,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Password(_) => f.debug_tuple("Password").field(&"[REDACTED]").finish(),
            Credentials::KeyFile { path, .. } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .field("passphrase", &"[REDACTED]")
                .finish(),
        }
    }
}

impl Credentials {
    /// Build credentials from the optional request fields, requiring exactly
    /// one of `password` / `key_path`.
    pub fn from_parts(
        password: Option<String>,
        key_path: Option<PathBuf>,
        passphrase: Option<String>,
    ) -> Result<Self, SshError> {
        validation::validate_auth_method(password.as_deref(), key_path.as_deref())?;

        Ok(match key_path.filter(|p| !p.as_os_str().is_empty()) {
            Some(path) => Credentials::KeyFile {
                path,
                passphrase: passphrase.filter(|p| !p.is_empty()).map(SecretString::from),
            },
            None => Credentials::Password(SecretString::from(password.unwrap_or_default())),
        })
    }

    /// Auth method name used in security logs.
    pub fn method_name(&self) -> &'static str {
        match self {
            Credentials::Password(_) => "password",
            Credentials::KeyFile { .. } => "publickey",
        }
    }
}

/// Resolved authentication for an SSH connection
pub enum ResolvedAuth {
    Password(SecretString),
    PublicKey(PrivateKeyWithHashAlg),
}

impl std::fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedAuth::Password(_) => f.debug_tuple("Password").field(&"[REDACTED]").finish(),
            ResolvedAuth::PublicKey(_) => f.debug_tuple("PublicKey").field(&"[KEY]").finish(),
        }
    }
}

impl ResolvedAuth {
    pub async fn resolve(credentials: &Credentials) -> Result<Self, SshError> {
        match credentials {
            Credentials::Password(password) => Ok(ResolvedAuth::Password(password.clone())),
            Credentials::KeyFile { path, passphrase } => {
                let expanded = paths::expand_tilde(&path.to_string_lossy());
                let passphrase = passphrase.as_ref().map(|p| p.expose_secret());
                load_key_file(&expanded, passphrase).await
            }
        }
    }
}

/// Load an SSH private key from file
async fn load_key_file(path: &Path, passphrase: Option<&str>) -> Result<ResolvedAuth, SshError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        SshError::KeyFile(format!("Cannot read key file {}: {}", path.display(), e))
    })?;

    // Check if this is actually a public key (common mistake)
    let first_line = content.lines().next().unwrap_or("");
    if first_line.starts_with("ssh-") || first_line.starts_with("ecdsa-") {
        return Err(SshError::KeyFile(format!(
            "File {} contains a PUBLIC key, not a private key",
            path.display()
        )));
    }

    if !first_line.starts_with("-----BEGIN") {
        return Err(SshError::KeyFile(format!(
            "File {} does not appear to be a valid SSH private key",
            path.display()
        )));
    }

    let key = russh::keys::decode_secret_key(&content, passphrase).map_err(|e| {
        let normalized = e.to_string().to_lowercase();
        let is_passphrase_error = normalized.contains("encrypted")
            || normalized.contains("passphrase")
            || normalized.contains("cryptographic");
        if is_passphrase_error {
            if passphrase.is_some() {
                SshError::KeyFilePassphraseInvalid(path.to_path_buf())
            } else {
                SshError::KeyFilePassphraseRequired(path.to_path_buf())
            }
        } else {
            SshError::KeyFile(format!("Failed to load key {}: {}", path.display(), e))
        }
    })?;

    // RSA keys sign with SHA-512; other key types use their native algorithm
    let hash_alg = if key.algorithm().is_rsa() {
        Some(HashAlg::Sha512)
    } else {
        None
    };

    Ok(ResolvedAuth::PublicKey(PrivateKeyWithHashAlg::new(
        Arc::new(key),
        hash_alg,
    )))
}

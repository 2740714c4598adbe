//! Node configuration file
//!
//! ```toml
//! secret_key = "<64 hex chars>"   # optional, generated when absent
//! remotes = ["<iroh public key>", "..."]
//!
//! [proxy]
//! max_message_size = 8388608
//!
//! [host]
//! connect_timeout_ms = 10000
//!
//! [log]
//! default_level = "info"
//! ```

use std::path::{Path, PathBuf};

use delegate_core::IdentityError;
use delegate_logging::LogConfig;
use delegate_proxy::ProxyConfig;
use delegate_transport::{HostConfig, IrohIdentity, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("secret_key must be 64 hex characters: {0}")]
    InvalidSecretKey(String),

    #[error("Invalid remote {remote:?}: {source}")]
    InvalidRemote {
        remote: String,
        #[source]
        source: IdentityError,
    },

    #[error("Invalid proxy settings: {0}")]
    Proxy(#[from] delegate_proxy::ConfigError),
}

/// Everything a node needs to run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Hex-encoded iroh secret key
    pub secret_key: Option<String>,
    /// Delegate public keys, in configured order
    pub remotes: Vec<String>,
    pub proxy: ProxyConfig,
    pub host: HostConfig,
    pub log: LogConfig,
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` if given, otherwise use defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check everything that can be checked without the network
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.proxy.validate()?;
        self.remote_ids()?;
        if self.secret_key.is_some() {
            self.load_secret_key()?;
        }
        Ok(())
    }

    /// The configured secret key, or a fresh one when none is configured
    pub fn load_secret_key(&self) -> Result<SecretKey, ConfigError> {
        let Some(encoded) = &self.secret_key else {
            return Ok(SecretKey::generate(&mut rand::rng()));
        };

        let bytes = hex::decode(encoded.trim())
            .map_err(|e| ConfigError::InvalidSecretKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| ConfigError::InvalidSecretKey(format!("got {} bytes", v.len())))?;
        Ok(SecretKey::from_bytes(&bytes))
    }

    /// Parsed remote pool; duplicates are kept
    pub fn remote_ids(&self) -> Result<Vec<IrohIdentity>, ConfigError> {
        self.remotes
            .iter()
            .map(|remote| {
                remote
                    .parse::<IrohIdentity>()
                    .map_err(|source| ConfigError::InvalidRemote {
                        remote: remote.clone(),
                        source,
                    })
            })
            .collect()
    }

    /// Host settings, dialing with the proxy's protocol
    pub fn host_config(&self) -> HostConfig {
        self.host
            .clone()
            .with_dial_protocol(self.proxy.protocol.clone())
    }
}

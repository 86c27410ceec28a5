//! Configuration manager for nicefox-auth.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_PORT: u16 = 8080;
/// One week, in seconds.
const DEFAULT_TOKEN_TTL: u64 = 7 * 24 * 60 * 60;
const DEFAULT_SECRETS_DIR: &str = "/var/lib/nicefox-auth/secrets";

/// Error while loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot open `{path}`: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed configuration file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("`url` field is not a valid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("`url` field has no hostname")]
    MissingHost,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Domain name of current instance. Tokens presented to this service
    /// are verified against this hostname's secret.
    pub url: String,
    /// Listening port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Production posture. Gates the `localhost` development secret.
    #[serde(default)]
    pub production: bool,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    #[serde(skip)]
    pub(crate) host: String,
    /// Per-domain signing secret storage.
    #[serde(default)]
    pub secrets: Secrets,
    /// Related to JSON Web Token configuration.
    #[serde(default)]
    pub token: Token,
    /// Hosts a sign-in flow may redirect back to.
    #[serde(default)]
    pub allowed_redirect_hosts: Vec<String>,
    /// Related to Google OAuth2 configuration.
    #[serde(skip_serializing)]
    pub google: Option<Google>,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Signing secret storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Secrets {
    /// Directory holding one secret file per domain.
    pub dir: PathBuf,
}

impl Default for Secrets {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_SECRETS_DIR),
        }
    }
}

/// JSON Web Token configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Lifetime of minted tokens, in seconds.
    pub ttl: u64,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TOKEN_TTL,
        }
    }
}

/// Google OAuth2 configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Google {
    /// OAuth2 client identifier.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Absolute URL Google redirects back to.
    pub callback_url: String,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Hostname of this instance, used as its own token domain.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(url: &str) -> Result<Url, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        Url::parse(&url_with_scheme)
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location. Fails fast: a missing or malformed file is a startup
    /// error, never silently replaced by defaults.
    pub fn read(self) -> Result<Arc<Self>, ConfigError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let file = File::open(file_path).map_err(|source| ConfigError::Open {
            path: file_path.display().to_string(),
            source,
        })?;

        let mut config: Configuration = serde_yaml::from_reader(file)?;

        // set app version.
        config.version = VERSION.to_owned();

        // normalize instance URL and remember its hostname.
        let url = Self::normalize_url(&config.url)?;
        config.host = url
            .host_str()
            .ok_or(ConfigError::MissingHost)?
            .to_owned();
        config.url = url.to_string();

        Ok(Arc::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"
name: test
url: auth.example.com
secrets:
  dir: /tmp/secrets
allowed_redirect_hosts:
  - app.example.com
"#,
        )
        .unwrap();

        let config = Configuration::default()
            .path(file.path().to_path_buf())
            .read()
            .unwrap();

        assert_eq!(config.name, "test");
        assert_eq!(config.url, "https://auth.example.com/");
        assert_eq!(config.host(), "auth.example.com");
        assert_eq!(config.port, super::DEFAULT_PORT);
        assert!(!config.production);
        assert_eq!(config.token.ttl, super::DEFAULT_TOKEN_TTL);
        assert_eq!(config.secrets.dir, PathBuf::from("/tmp/secrets"));
    }

    #[test]
    fn test_missing_config_fails() {
        let result = Configuration::default()
            .path(PathBuf::from("/nonexistent/config.yaml"))
            .read();

        assert!(result.is_err());
    }
}

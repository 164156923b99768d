//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::account::{Account, CloudType, Credentials};
use crate::cache::CACHE_FILE_NAME;
use crate::poll::PollPolicy;

/// Directory under the user's home that holds the credential cache.
pub const DEFAULT_HOME_DIR_NAME: &str = ".carina";

/// Carina settings derived from environment variables and configuration
/// files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CARINA",
    discovery(
        app_name = "carina",
        env_var = "CARINA_CONFIG_PATH",
        config_file_name = "carina.toml",
        dotfile_name = ".carina.toml",
        project_file_name = "carina.toml"
    )
)]
pub struct CarinaConfig {
    /// Cloud to use: `public` or `private`. Inferred from the supplied
    /// secrets when unset.
    pub cloud: Option<String>,
    /// Account user name.
    pub username: Option<String>,
    /// Public cloud API key.
    pub api_key: Option<String>,
    /// Private cloud password.
    pub password: Option<String>,
    /// Private cloud project name.
    pub project: Option<String>,
    /// Private cloud domain name.
    pub domain: Option<String>,
    /// Private cloud region name.
    pub region: Option<String>,
    /// Identity endpoint. Required for the private cloud.
    pub auth_endpoint: Option<String>,
    /// Cluster API endpoint override.
    pub endpoint: Option<String>,
    /// Directory holding the credential cache. Defaults to `~/.carina`.
    pub home: Option<String>,
    /// Whether tokens are cached between invocations.
    #[ortho_config(default = true)]
    pub cache_enabled: bool,
    /// Timeout applied to each HTTP request, in seconds.
    #[ortho_config(default = 30)]
    pub http_timeout_secs: u64,
    /// Delay between status checks while waiting on a cluster, in seconds.
    #[ortho_config(default = 10)]
    pub poll_interval_secs: u64,
    /// Upper bound on any single wait, in seconds.
    #[ortho_config(default = 3600)]
    pub wait_timeout_secs: u64,
}

/// Runtime knobs handed to the [`crate::client::Client`] and the backend
/// adapters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientSettings {
    /// Timeout applied to each HTTP request.
    pub http_timeout: Duration,
    /// Cadence and bound of wait loops.
    pub poll_policy: PollPolicy,
    /// Cache file location; `None` disables caching.
    pub cache_path: Option<Utf8PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(30),
            poll_policy: PollPolicy::default(),
            cache_path: None,
        }
    }
}

impl CarinaConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("carina")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on the loaded values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a duration is zero or the
    /// cloud name is unknown, and [`ConfigError::MissingField`] when the
    /// credentials are incomplete for the selected cloud.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_positive(self.http_timeout_secs, "http_timeout_secs")?;
        Self::require_positive(self.poll_interval_secs, "poll_interval_secs")?;
        Self::require_positive(self.wait_timeout_secs, "wait_timeout_secs")?;
        Account::from_credentials(&self.credentials()?).map(|_| ())
    }

    fn require_positive(value: u64, field: &str) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "{field} must be greater than zero: set CARINA_{} or add {field} to carina.toml",
                field.to_ascii_uppercase()
            )));
        }
        Ok(())
    }

    /// Collects the credential fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when `cloud` is not `public` or
    /// `private`.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let cloud = self
            .cloud
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(str::parse::<CloudType>)
            .transpose()?;
        Ok(Credentials {
            cloud,
            username: self.username.clone(),
            api_key: self.api_key.clone(),
            password: self.password.clone(),
            project: self.project.clone(),
            domain: self.domain.clone(),
            region: self.region.clone(),
            auth_endpoint: self.auth_endpoint.clone(),
            endpoint: self.endpoint.clone(),
        })
    }

    /// Builds the account described by the credential fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the credentials are invalid or
    /// incomplete.
    pub fn account(&self) -> Result<Account, ConfigError> {
        Account::from_credentials(&self.credentials()?)
    }

    /// Location of the credential cache file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when no home directory can be
    /// determined, or [`ConfigError::InvalidValue`] when it is not UTF-8.
    pub fn cache_path(&self) -> Result<Utf8PathBuf, ConfigError> {
        let home = match self.home.as_deref().map(str::trim) {
            Some(configured) if !configured.is_empty() => Utf8PathBuf::from(configured),
            _ => {
                let user_home = dirs::home_dir().ok_or_else(|| {
                    ConfigError::MissingField(String::from(
                        "unable to determine the home directory: set CARINA_HOME",
                    ))
                })?;
                Utf8PathBuf::from_path_buf(user_home)
                    .map_err(|path| {
                        ConfigError::InvalidValue(format!(
                            "home directory {} is not valid UTF-8: set CARINA_HOME",
                            path.display()
                        ))
                    })?
                    .join(DEFAULT_HOME_DIR_NAME)
            }
        };
        Ok(home.join(CACHE_FILE_NAME))
    }

    /// Resolves the runtime settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when caching is enabled and the cache path
    /// cannot be resolved.
    pub fn settings(&self) -> Result<ClientSettings, ConfigError> {
        let cache_path = if self.cache_enabled {
            Some(self.cache_path()?)
        } else {
            None
        };
        Ok(ClientSettings {
            http_timeout: Duration::from_secs(self.http_timeout_secs),
            poll_policy: PollPolicy::new(
                Duration::from_secs(self.poll_interval_secs),
                Duration::from_secs(self.wait_timeout_secs),
            ),
            cache_path,
        })
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration field holds an unusable value.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::models::stack::ProviderCredentials;
use crate::{AppError, Result};

/// Keychain service under which runtime secrets are stored.
const KEYRING_SERVICE: &str = "lab-stacks";

/// Cloud provider connection settings shared by every stack of a deployment.
///
/// The password is loaded at runtime via OS keychain or environment
/// variable, never from the TOML config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProviderConfig {
    /// Identity service endpoint.
    pub auth_url: String,
    /// Tenant (project) owning the lab stacks.
    pub tenant_name: String,
    /// Service account user name.
    pub username: String,
    /// Service account password (populated at runtime).
    #[serde(skip)]
    pub password: String,
}

/// Dead man's switch settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LifecycleConfig {
    /// Idle window after the last client activity before a stack is suspended.
    #[serde(default = "default_suspend_delay")]
    pub suspend_delay_seconds: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            suspend_delay_seconds: default_suspend_delay(),
        }
    }
}

/// In-process worker pool settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Maximum number of provisioning commands executing at once.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// How long finished task outcomes stay fetchable.
    #[serde(default = "default_finished_task_ttl")]
    pub finished_task_ttl_seconds: u64,
    /// Program and arguments run to launch or resume a stack.
    pub launch_command: Vec<String>,
    /// Program and arguments run to suspend a stack.
    pub suspend_command: Vec<String>,
}

fn default_suspend_delay() -> u64 {
    120
}

fn default_pool_size() -> usize {
    4
}

fn default_finished_task_ttl() -> u64 {
    3600
}

fn default_http_port() -> u16 {
    8080
}

fn default_stack_user_name() -> String {
    "training".into()
}

fn default_retention_days() -> u32 {
    30
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// HTTP port for the client-facing API.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Directory holding the `SQLite` database.
    pub data_dir: PathBuf,
    /// Where the terminal server is running.
    #[serde(default)]
    pub terminal_url: String,
    /// Default name of the training user inside each stack.
    #[serde(default = "default_stack_user_name")]
    pub stack_user_name: String,
    /// Days without activity before an idle stack record is purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Cloud provider connection settings.
    pub provider: ProviderConfig,
    /// Dead man's switch settings.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Worker pool and provisioning commands.
    pub workers: WorkerConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the provider password from OS keychain with env-var fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env var provide
    /// the password.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.provider.password =
            load_credential("provider_password", "LAB_STACKS_PROVIDER_PASSWORD").await?;
        Ok(())
    }

    /// Path of the `SQLite` database file.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("stacks.db")
    }

    /// Delay after which an armed dead man's switch suspends the stack.
    #[must_use]
    pub fn suspend_delay(&self) -> Duration {
        Duration::from_secs(self.lifecycle.suspend_delay_seconds)
    }

    /// Provider credentials handed to each stack record for a request.
    #[must_use]
    pub fn credentials(&self) -> ProviderCredentials {
        ProviderCredentials {
            auth_url: self.provider.auth_url.clone(),
            tenant_name: self.provider.tenant_name.clone(),
            username: self.provider.username.clone(),
            password: self.provider.password.clone(),
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.workers.pool_size == 0 {
            return Err(AppError::Config(
                "workers.pool_size must be greater than zero".into(),
            ));
        }

        if self.lifecycle.suspend_delay_seconds == 0 {
            return Err(AppError::Config(
                "lifecycle.suspend_delay_seconds must be greater than zero".into(),
            ));
        }

        if self.workers.launch_command.is_empty() {
            return Err(AppError::Config(
                "workers.launch_command must not be empty".into(),
            ));
        }

        if self.workers.suspend_command.is_empty() {
            return Err(AppError::Config(
                "workers.suspend_command must not be empty".into(),
            ));
        }

        fs::create_dir_all(&self.data_dir)
            .map_err(|err| AppError::Config(format!("data_dir invalid: {err}")))?;
        self.data_dir = self
            .data_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("data_dir invalid: {err}")))?;

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}

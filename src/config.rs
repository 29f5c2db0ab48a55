//! Connection settings and resource definitions.
//!
//! Connection settings live in `config.toml` in the config directory:
//!
//! ```toml
//! host = "https://catalog.example.com"
//! tenant = "vsphere.local"
//! username = "svc-provision@vsphere.local"
//! # password = "..."   # or CATALOGCTL_PASSWORD
//! poll_interval_secs = 30
//! ```
//!
//! A resource definition is a TOML file per deployment:
//!
//! ```toml
//! catalog_item_name = "CentOS 7"
//! business_group_name = "Development"
//! wait_timeout = 20
//!
//! [resource_configuration]
//! "web.cpu" = 2
//! "web.Vrm.DataCenter.Location" = "east"
//!
//! [deployment_configuration]
//! description = "web tier"
//! ```

use crate::paths;
use anyhow::{Context, Result, bail};
use catalogkit::{Credentials, HttpTransport, Provisioner, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the password
pub const ENV_PASSWORD: &str = "CATALOGCTL_PASSWORD";

/// Connection settings file name in the config directory
pub const CONFIG_FILE: &str = "config.toml";

// ============================================================================
// Connection Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub tenant: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_poll_errors")]
    pub max_poll_errors: u32,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Stop waiting for a create once the request is in progress
    #[serde(default)]
    pub return_on_in_progress: bool,
}

fn default_page_size() -> u32 {
    100
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_max_poll_errors() -> u32 {
    3
}

fn default_http_timeout_secs() -> u64 {
    60
}

impl ConnectionConfig {
    /// Load `config.toml` from the config directory
    pub fn load() -> Result<Self> {
        let path = paths::config_dir()?.join(CONFIG_FILE);
        Self::load_from(&path)
    }

    /// Load and validate connection settings from `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid connection settings in {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid connection settings in {}", path.display()))?;
        log::debug!("Loaded connection settings from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("host", &self.host),
            ("tenant", &self.tenant),
            ("username", &self.username),
        ] {
            if value.trim().is_empty() {
                bail!("'{field}' must not be empty");
            }
        }
        if self.page_size == 0 {
            bail!("'page_size' must be at least 1");
        }
        if self.poll_interval_secs == 0 {
            bail!("'poll_interval_secs' must be at least 1");
        }
        if self.max_poll_errors == 0 {
            bail!("'max_poll_errors' must be at least 1");
        }
        Ok(())
    }

    /// API root URL; bare host names get `https://`
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        }
    }

    /// Password from the environment, else from the settings file
    pub fn password(&self) -> Result<String> {
        self.resolve_password(std::env::var(ENV_PASSWORD).ok())
    }

    fn resolve_password(&self, from_env: Option<String>) -> Result<String> {
        from_env
            .filter(|p| !p.is_empty())
            .or_else(|| self.password.clone())
            .with_context(|| format!("No password configured; set {ENV_PASSWORD} or 'password'"))
    }

    /// Build a provisioner talking to the configured host
    pub fn connect(&self) -> Result<Provisioner> {
        let credentials = Credentials {
            username: self.username.clone(),
            password: self.password()?,
            tenant: self.tenant.clone(),
        };
        let transport = HttpTransport::new(
            self.base_url(),
            credentials,
            Duration::from_secs(self.http_timeout_secs),
        );
        log::debug!("Connecting to {} as {}", transport.base_url(), self.username);

        Ok(Provisioner::new(Box::new(transport), self.tenant.clone())
            .with_page_size(self.page_size)
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
            .with_max_poll_errors(self.max_poll_errors)
            .with_return_on_in_progress(self.return_on_in_progress))
    }
}

// ============================================================================
// Resource Definitions
// ============================================================================

/// One deployment described in a TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// State name; defaults to the file stem
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub spec: ResourceSpec,
}

impl ResourceDefinition {
    /// Load and validate a definition from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let mut definition: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid resource definition in {}", path.display()))?;

        if definition.name.is_none() {
            definition.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }
        definition
            .spec
            .validate()
            .with_context(|| format!("Invalid resource definition in {}", path.display()))?;
        Ok(definition)
    }

    /// Name the deployment's state is stored under
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("resource")
    }
}

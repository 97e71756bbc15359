//! Configuration storage
//!
//! Only non-secret settings live here. Passwords, cookies and digests are
//! never written to disk.

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::auth::Endpoints;

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// SharePoint site URL (also the token realm)
    pub site_url: Option<String>,
    /// STS override (defaults to the Microsoft Online extSTS endpoint)
    pub sts_endpoint: Option<String>,
    /// Context-info URL override (defaults to `<site>/_api/contextinfo`)
    pub context_info_url: Option<String>,
    /// Default username for `login`
    pub username: Option<String>,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "spo-auth", "spo-auth")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// Endpoints for the configured site, with any overrides applied.
    pub fn endpoints(&self) -> Result<Endpoints> {
        let site = match self.site_url.as_deref().map(str::trim) {
            Some(site) if !site.is_empty() => site,
            _ => bail!("No site configured. Run 'spo-auth configure --site <URL>' first."),
        };

        let mut endpoints = Endpoints::new(site);
        url::Url::parse(endpoints.site())
            .with_context(|| format!("Invalid site URL '{}'", site))?;
        if let Some(sts) = &self.sts_endpoint {
            endpoints = endpoints.with_sts_endpoint(sts.as_str());
        }
        if let Some(url) = &self.context_info_url {
            endpoints = endpoints.with_context_info_url(url.as_str());
        }
        Ok(endpoints)
    }
}

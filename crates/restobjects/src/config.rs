//! # Configuration
//!
//! Settings that shape every request a registry's resources issue. Loading is
//! layered with [`confique`]:
//!
//! 1. **Environment variables**: `RESTOBJECTS_USER_AGENT`.
//! 2. **Explicit file**: the path handed to [`RestConfig::load`].
//! 3. **User config**: `restobjects.toml` in the OS config directory (via
//!    the `directories` crate), for [`RestConfig::load_default`].
//! 4. **Compiled defaults**.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `content_types` | `["application/json"]` | Sent as `Accept`; required of response bodies |
//! | `user_agent` | none | Sent as `User-Agent` when set |
//!
//! A [`crate::Registry`] owns one `RestConfig` for its lifetime; build a
//! registry with [`crate::Registry::with_config`] to use a loaded one.

use crate::error::{RestError, Result};
use confique::Config;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "restobjects.toml";

fn default_content_types() -> Vec<String> {
    vec!["application/json".to_string()]
}

/// Request and response settings, stored in `restobjects.toml`.
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RestConfig {
    /// Media types the client accepts and requires of response bodies.
    /// When absent, defaults to ["application/json"].
    pub content_types: Option<Vec<String>>,

    /// Value of the User-Agent header.
    #[config(env = "RESTOBJECTS_USER_AGENT")]
    pub user_agent: Option<String>,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            content_types: None,
            user_agent: None,
        }
    }
}

impl RestConfig {
    /// Accepted media types, using the default if not configured.
    pub fn content_types(&self) -> Vec<String> {
        self.content_types
            .clone()
            .filter(|types| !types.is_empty())
            .unwrap_or_else(default_content_types)
    }

    /// Value for the `Accept` request header.
    pub fn accept_header(&self) -> String {
        self.content_types().join(", ")
    }

    /// Load from the environment and `path`. A missing file is not an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder()
            .env()
            .file(path.as_ref())
            .load()
            .map_err(|e| RestError::Config(e.to_string()))
    }

    /// Load from the environment and the per-user config file, if any.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(path),
            None => Self::builder()
                .env()
                .load()
                .map_err(|e| RestError::Config(e.to_string())),
        }
    }

    /// Location of the per-user config file.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "restobjects").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = RestConfig::default();
        assert_eq!(config.content_types(), vec!["application/json"]);
        assert_eq!(config.accept_header(), "application/json");
        assert_eq!(config.user_agent, None);
    }

    #[test]
    fn test_empty_content_types_fall_back() {
        let config = RestConfig {
            content_types: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(config.content_types(), vec!["application/json"]);
    }

    #[test]
    fn test_accept_header_joins_types() {
        let config = RestConfig {
            content_types: Some(vec![
                "application/json".to_string(),
                "text/javascript".to_string(),
            ]),
            ..Default::default()
        };
        assert_eq!(config.accept_header(), "application/json, text/javascript");
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "content_types = [\"application/json\", \"application/hal+json\"]\nuser_agent = \"tester/1.0\"\n",
        )
        .unwrap();

        let config = RestConfig::load(&path).unwrap();
        assert_eq!(
            config.content_types(),
            vec!["application/json", "application/hal+json"]
        );
        assert_eq!(config.user_agent.as_deref(), Some("tester/1.0"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RestConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.content_types(), vec!["application/json"]);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "content_types = 12\n").unwrap();
        let err = RestConfig::load(&path).unwrap_err();
        assert!(matches!(err, RestError::Config(_)));
    }
}

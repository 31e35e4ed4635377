use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudioConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub toasts: ToastConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_repo")]
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Name of the environment variable holding the access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            repo: default_repo(),
            branch: default_branch(),
            path_prefix: default_path_prefix(),
            api_base: default_api_base(),
            token_env: default_token_env(),
        }
    }
}

impl RemoteConfig {
    pub fn token(&self) -> Option<String> {
        env::var(&self.token_env).ok().filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Where the published `<collection>.json` files are served from.
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToastConfig {
    #[serde(default = "default_delete_undo_ms")]
    pub delete_undo_ms: u64,
    #[serde(default = "default_save_ms")]
    pub save_ms: u64,
    #[serde(default = "default_sync_ms")]
    pub sync_ms: u64,
}

impl Default for ToastConfig {
    fn default() -> Self {
        Self {
            delete_undo_ms: default_delete_undo_ms(),
            save_ms: default_save_ms(),
            sync_ms: default_sync_ms(),
        }
    }
}

fn default_owner() -> String {
    "airose".to_string()
}

fn default_repo() -> String {
    "studio".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_path_prefix() -> String {
    "data".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

const fn default_delete_undo_ms() -> u64 {
    6000
}

const fn default_save_ms() -> u64 {
    1200
}

const fn default_sync_ms() -> u64 {
    3000
}

pub fn load_config(path: &Path) -> Result<StudioConfig> {
    if !path.exists() {
        return Ok(StudioConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<StudioConfig>(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("studio.toml")).unwrap();
        assert_eq!(config, StudioConfig::default());
        assert_eq!(config.toasts.delete_undo_ms, 6000);
        assert_eq!(config.remote.api_base, "https://api.github.com");
        assert!(config.store.path.is_none());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studio.toml");
        std::fs::write(
            &path,
            r#"
[remote]
owner = "someone"
branch = "content"

[store]
path = "edits.db"

[toasts]
sync_ms = 5000
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.remote.owner, "someone");
        assert_eq!(config.remote.branch, "content");
        assert_eq!(config.remote.repo, "studio");
        assert_eq!(config.store.path.as_deref(), Some(Path::new("edits.db")));
        assert_eq!(config.toasts.sync_ms, 5000);
        assert_eq!(config.toasts.save_ms, 1200);
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[remote\nowner = ").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err}").contains("broken.toml"));
    }
}

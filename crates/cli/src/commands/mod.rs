pub mod chat;
pub mod doctor;
pub mod onboard;
pub mod serve;
pub mod tools;

use std::path::{Path, PathBuf};

use anyhow::Context;
use mediaclaw_config::AppConfig;

/// Where the config lives: the `--config` path, or the default location.
pub fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load and validate the config, with environment overrides applied.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let Some(path) = path else {
        return AppConfig::load().context("Failed to load config");
    };

    let mut config = AppConfig::load_from(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate().context("Invalid config after environment overrides")?;
    Ok(config)
}

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{sanitize_config, Config};

/// `config.toml` under the platform config directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|path| path.join("tourmap"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}

/// Reads `path`, writing a default file first if none exists.
///
/// Unreadable or unparsable files yield defaults; configuration problems never
/// stop the session.
pub fn load_or_create_config(path: &Path) -> Config {
    if !path.exists() {
        let default_config = sanitize_config(Config::default());
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        persist_config_file(&default_config, path);
        return default_config;
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(
                "Failed to read config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            return sanitize_config(Config::default());
        }
    };

    match toml::from_str::<Config>(&content) {
        Ok(config) => sanitize_config(config),
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            sanitize_config(Config::default())
        }
    }
}

pub fn persist_config_file(config: &Config, path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            log::error!(
                "Failed to create config directory {}: {}",
                parent.display(),
                err
            );
            return;
        }
    }
    let Ok(serialized) = toml::to_string(config) else {
        log::error!("Failed to serialize config for {}", path.display());
        return;
    };
    if let Err(err) = std::fs::write(path, serialized) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::GameConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {path}: {detail}")]
    Invalid { path: PathBuf, detail: String },
}

impl ConfigError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The config directory, from `CONFIG_PATH` or `./config`.
pub fn config_dir() -> PathBuf {
    let base = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());
    PathBuf::from(base)
}

/// Initialize config directory with defaults if missing.
pub fn init(base: &Path) -> Result<(), ConfigError> {
    if !base.exists() {
        fs::create_dir_all(base).map_err(|e| ConfigError::io(base, e))?;
    }

    let game_path = base.join("game.json");
    if !game_path.exists() {
        let defaults = serde_json::to_string_pretty(&GameConfig::default()).map_err(|source| {
            ConfigError::Parse {
                path: game_path.clone(),
                source,
            }
        })?;
        fs::write(&game_path, defaults).map_err(|e| ConfigError::io(&game_path, e))?;
        tracing::info!("Wrote default {}", game_path.display());
    }
    Ok(())
}

/// Load the game configuration. Missing keys take their defaults.
pub fn load_game_config(base: &Path) -> Result<GameConfig, ConfigError> {
    let path = base.join("game.json");
    let data = fs::read_to_string(&path).map_err(|e| ConfigError::io(&path, e))?;
    let config: GameConfig = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    validate(&config).map_err(|detail| ConfigError::Invalid { path, detail })?;
    Ok(config)
}

fn validate(config: &GameConfig) -> Result<(), String> {
    if config.command_timeout_ms == 0 {
        return Err("commandTimeoutMs must be greater than 0".to_string());
    }
    if config.session_idle_secs == 0 {
        return Err("sessionIdleSecs must be greater than 0".to_string());
    }
    Ok(())
}

/// Load the default word set from `words.txt`, one word per line.
/// No file means no default words.
pub fn load_word_set(base: &Path) -> Result<Vec<String>, ConfigError> {
    let path = base.join("words.txt");
    if !path.exists() {
        return Ok(Vec::new());
    }

    let data = fs::read_to_string(&path).map_err(|e| ConfigError::io(&path, e))?;
    let words: Vec<String> = data
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    tracing::info!("Loaded {} words from {}", words.len(), path.display());
    Ok(words)
}

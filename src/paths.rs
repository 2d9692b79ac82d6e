//! Application directories, resolved once at startup.
//!
//! Nothing below `main` reads the environment; the resolved [`AppPaths`] is
//! passed down instead.

use std::path::{Path, PathBuf};

const APP_NAME: &str = "parsort";

/// Where parsort keeps its config file and run logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// User configuration file (`config.toml`).
    pub config_file: PathBuf,
    /// State directory holding `runs/`.
    pub state_dir: PathBuf,
}

impl AppPaths {
    pub fn new(config_file: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            state_dir: state_dir.into(),
        }
    }

    /// Platform defaults, with optional overrides for either location.
    ///
    /// * config: `<config dir>/parsort/config.toml`
    /// * state: `<state dir>/parsort`, falling back to the local data dir and
    ///   then `~/.local/state/parsort`
    pub fn resolve(config_file: Option<&Path>, state_dir: Option<&Path>) -> Self {
        let config_file = config_file.map(Path::to_path_buf).unwrap_or_else(|| {
            dirs::config_dir()
                .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_NAME)
                .join("config.toml")
        });

        let state_dir = state_dir.map(Path::to_path_buf).unwrap_or_else(|| {
            dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("state")))
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_NAME)
        });

        Self {
            config_file: absolute(config_file),
            state_dir: absolute(state_dir),
        }
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

//! Configuration for state managers and the relay server.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::crdt::ClockKind;

/// Default number of undo entries kept per manager.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Default quiescence window before the save callback fires.
pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Tuning knobs for a `StateManager`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Maximum undo depth; the oldest entry is dropped on overflow
    pub history_limit: usize,
    /// Quiescence window of the debounced save
    pub save_debounce: Duration,
    /// Time source used to stamp local operations
    pub clock: ClockKind,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            history_limit: DEFAULT_HISTORY_LIMIT,
            save_debounce: DEFAULT_SAVE_DEBOUNCE,
            clock: ClockKind::Wall,
        }
    }
}

/// Settings for the relay server binary, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub manager: ManagerConfig,
}

impl ServerConfig {
    /// Reads `COLLAB_RGA_ADDR` and `COLLAB_RGA_SAVE_DEBOUNCE_MS`, falling back to
    /// `127.0.0.1:3000` and the default debounce window.
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr = match env::var("COLLAB_RGA_ADDR") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid("COLLAB_RGA_ADDR", value))?,
            Err(_) => SocketAddr::from(([127, 0, 0, 1], 3000)),
        };

        let mut manager = ManagerConfig::default();
        if let Ok(value) = env::var("COLLAB_RGA_SAVE_DEBOUNCE_MS") {
            let millis = value
                .parse()
                .map_err(|_| ConfigError::Invalid("COLLAB_RGA_SAVE_DEBOUNCE_MS", value))?;
            manager.save_debounce = Duration::from_millis(millis);
        }

        Ok(ServerConfig { addr, manager })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: '{1}'")]
    Invalid(&'static str, String),
}

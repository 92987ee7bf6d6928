//! Server configuration from flags and environment.

use std::path::PathBuf;

use clap::Parser;

use crate::constants::{DEFAULT_GAME_DURATION_MS, MAX_GAME_DURATION_MS, MIN_GAME_DURATION_MS};
use crate::error::ConfigError;

#[derive(Debug, Clone, Parser)]
#[command(name = "chaathan-server", about = "Authoritative Chaathan room server")]
pub struct ServerArgs {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,
    /// Built client bundle served at `/`; `dist/client` is tried when unset.
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
    #[arg(long, env = "MAX_ROOMS", default_value_t = 256)]
    pub max_rooms: usize,
    /// Used by quick-join rooms and by create-room when no duration is sent.
    #[arg(long, env = "DEFAULT_DURATION_MINUTES", default_value_t = DEFAULT_GAME_DURATION_MS / 60_000)]
    pub default_duration_minutes: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub max_rooms: usize,
    pub default_duration_ms: u64,
}

impl ServerArgs {
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        if self.max_rooms == 0 {
            return Err(ConfigError::InvalidMaxRooms);
        }
        let min = MIN_GAME_DURATION_MS / 60_000;
        let max = MAX_GAME_DURATION_MS / 60_000;
        if !(min..=max).contains(&self.default_duration_minutes) {
            return Err(ConfigError::InvalidDuration {
                got: self.default_duration_minutes,
                min,
                max,
            });
        }

        let static_dir = match self.static_dir {
            Some(path) => {
                if !path.join("index.html").is_file() {
                    return Err(ConfigError::MissingStaticDir(
                        path.to_string_lossy().into_owned(),
                    ));
                }
                Some(path)
            }
            None => [PathBuf::from("dist/client"), PathBuf::from("client/dist")]
                .into_iter()
                .find(|path| path.join("index.html").is_file()),
        };

        Ok(ServerConfig {
            port: self.port,
            static_dir,
            max_rooms: self.max_rooms,
            default_duration_ms: self.default_duration_minutes * 60_000,
        })
    }
}

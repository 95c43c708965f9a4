use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("ROLLCALL_ENGINE_CMD is not set — point it at the face-encoding helper command")]
    MissingEngineCommand,
}

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Command line of the external face-encoding helper.
    pub engine_command: String,
    /// Capture device paths in priority order.
    pub camera_devices: Vec<String>,
    /// Per-entry match gate (upstream library tolerance).
    pub match_tolerance: f32,
    /// Strict distance gate for accepting a match.
    pub distance_threshold: f32,
    /// Per-identity cool-down between attendance writes.
    pub cooldown: Duration,
    /// Delay between frames while a class is active.
    pub tick_interval: Duration,
    /// Delay between schedule checks while no class is active.
    pub idle_poll: Duration,
    /// Delay before retrying after a camera or store failure.
    pub retry_delay: Duration,
    /// Upper bound on any single store operation.
    pub store_timeout: Duration,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with
    /// defaults. The engine command has no sensible default and is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let engine_command =
            std::env::var("ROLLCALL_ENGINE_CMD").map_err(|_| ConfigError::MissingEngineCommand)?;

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let camera_devices: Vec<String> = std::env::var("ROLLCALL_CAMERA_DEVICES")
            .unwrap_or_else(|_| "/dev/video0".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            db_path,
            engine_command,
            camera_devices,
            match_tolerance: env_f32("ROLLCALL_MATCH_TOLERANCE", 0.6),
            distance_threshold: env_f32("ROLLCALL_DISTANCE_THRESHOLD", 0.6),
            cooldown: Duration::from_secs(env_u64("ROLLCALL_COOLDOWN_SECS", 3)),
            tick_interval: Duration::from_millis(env_u64("ROLLCALL_TICK_INTERVAL_MS", 500)),
            idle_poll: Duration::from_secs(env_u64("ROLLCALL_IDLE_POLL_SECS", 10)),
            retry_delay: Duration::from_secs(env_u64("ROLLCALL_RETRY_DELAY_SECS", 5)),
            store_timeout: Duration::from_secs(env_u64("ROLLCALL_STORE_TIMEOUT_SECS", 5)),
        })
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

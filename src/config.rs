//! Application-level configuration loading, including the game tuning knobs.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LANGAR_SEVA_CONFIG_PATH";

const DEFAULT_GRID_SIZE: usize = 3;
const DEFAULT_GAME_DURATION_SECS: u32 = 60;
const DEFAULT_MAX_SEATED_PEOPLE: usize = 3;
const DEFAULT_SPAWN_PROBABILITY: f64 = 0.4;
const DEFAULT_SPAWN_INTERVAL_MS: u64 = 1_000;
const DEFAULT_SERVED_MARKER_MS: u64 = 500;
const DEFAULT_LIVENESS_INTERVAL_SECS: u64 = 5 * 60;
const DEFAULT_CONSOLE_INACTIVITY_SECS: u64 = 60 * 60;
const DEFAULT_ANONYMOUS_SWEEP_INACTIVITY_SECS: u64 = 24 * 60 * 60;
const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 60 * 60;
const DEFAULT_SCOREBOARD_RESYNC_SECS: u64 = 30;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub game: GameTuning,
    pub maintenance: MaintenanceSettings,
    /// Period of the full scoreboard resync picking up writers outside this process.
    pub scoreboard_resync: Duration,
}

/// Knobs shaping a single round of play.
#[derive(Debug, Clone)]
pub struct GameTuning {
    /// Width and height of the square langar hall grid.
    pub grid_size: usize,
    /// Length of a round, in seconds.
    pub game_duration_secs: u32,
    /// Upper bound on simultaneously seated people.
    pub max_seated_people: usize,
    /// Chance that a spawn tick seats someone.
    pub spawn_probability: f64,
    pub spawn_interval: Duration,
    /// How long the "served" marker stays on a cell.
    pub served_marker: Duration,
    /// Period of the `lastActive` refresh for a resolved identity.
    pub liveness_interval: Duration,
}

/// Thresholds and periods used by the maintenance console and the janitor.
#[derive(Debug, Clone)]
pub struct MaintenanceSettings {
    /// Age beyond which the console's inactive-removal deletes a user.
    pub console_inactivity: Duration,
    /// Age beyond which the janitor sweeps anonymous users and idle sessions.
    pub anonymous_sweep_inactivity: Duration,
    pub janitor_interval: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        grid_size = app_config.game.grid_size,
                        duration = app_config.game.game_duration_secs,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            game: GameTuning::default(),
            maintenance: MaintenanceSettings::default(),
            scoreboard_resync: Duration::from_secs(DEFAULT_SCOREBOARD_RESYNC_SECS),
        }
    }
}

impl Default for GameTuning {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            game_duration_secs: DEFAULT_GAME_DURATION_SECS,
            max_seated_people: DEFAULT_MAX_SEATED_PEOPLE,
            spawn_probability: DEFAULT_SPAWN_PROBABILITY,
            spawn_interval: Duration::from_millis(DEFAULT_SPAWN_INTERVAL_MS),
            served_marker: Duration::from_millis(DEFAULT_SERVED_MARKER_MS),
            liveness_interval: Duration::from_secs(DEFAULT_LIVENESS_INTERVAL_SECS),
        }
    }
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            console_inactivity: Duration::from_secs(DEFAULT_CONSOLE_INACTIVITY_SECS),
            anonymous_sweep_inactivity: Duration::from_secs(
                DEFAULT_ANONYMOUS_SWEEP_INACTIVITY_SECS,
            ),
            janitor_interval: Duration::from_secs(DEFAULT_JANITOR_INTERVAL_SECS),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
///
/// Every field is optional; omitted values keep their built-in default.
struct RawConfig {
    grid_size: Option<usize>,
    game_duration_secs: Option<u32>,
    max_seated_people: Option<usize>,
    spawn_probability: Option<f64>,
    spawn_interval_ms: Option<u64>,
    served_marker_ms: Option<u64>,
    liveness_interval_secs: Option<u64>,
    console_inactivity_secs: Option<u64>,
    anonymous_sweep_inactivity_secs: Option<u64>,
    janitor_interval_secs: Option<u64>,
    scoreboard_resync_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let game_defaults = GameTuning::default();
        let maintenance_defaults = MaintenanceSettings::default();

        let game = GameTuning {
            grid_size: value.grid_size.unwrap_or(game_defaults.grid_size).max(1),
            game_duration_secs: value
                .game_duration_secs
                .unwrap_or(game_defaults.game_duration_secs)
                .max(1),
            max_seated_people: value
                .max_seated_people
                .unwrap_or(game_defaults.max_seated_people),
            spawn_probability: value
                .spawn_probability
                .unwrap_or(game_defaults.spawn_probability)
                .clamp(0.0, 1.0),
            spawn_interval: value
                .spawn_interval_ms
                .filter(|value| *value > 0)
                .map(Duration::from_millis)
                .unwrap_or(game_defaults.spawn_interval),
            served_marker: value
                .served_marker_ms
                .filter(|value| *value > 0)
                .map(Duration::from_millis)
                .unwrap_or(game_defaults.served_marker),
            liveness_interval: value
                .liveness_interval_secs
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(game_defaults.liveness_interval),
        };

        let maintenance = MaintenanceSettings {
            console_inactivity: value
                .console_inactivity_secs
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(maintenance_defaults.console_inactivity),
            anonymous_sweep_inactivity: value
                .anonymous_sweep_inactivity_secs
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(maintenance_defaults.anonymous_sweep_inactivity),
            janitor_interval: value
                .janitor_interval_secs
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(maintenance_defaults.janitor_interval),
        };

        Self {
            game,
            maintenance,
            scoreboard_resync: Duration::from_secs(
                value
                    .scoreboard_resync_secs
                    .filter(|value| *value > 0)
                    .unwrap_or(DEFAULT_SCOREBOARD_RESYNC_SECS),
            ),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let raw: RawConfig =
            serde_json::from_str(r#"{ "grid_size": 4, "spawn_probability": 3.0 }"#).unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.game.grid_size, 4);
        assert_eq!(config.game.spawn_probability, 1.0);
        assert_eq!(config.game.game_duration_secs, 60);
        assert_eq!(config.game.max_seated_people, 3);
        assert_eq!(
            config.maintenance.console_inactivity,
            Duration::from_secs(3600)
        );
        assert_eq!(
            config.maintenance.anonymous_sweep_inactivity,
            Duration::from_secs(86_400)
        );
    }
}

//! Configuration file – reads/writes `~/.panelbot/config.toml`.

use panelbot_hal::CameraConfig;
use panelbot_memory::{SharedState, keys};
use panelbot_perception::{ValveConfig, WrenchConfig};
use panelbot_runtime::TaskConfig;
use panelbot_types::Vec3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Positions written into the shared state before a run, unless the state
/// already holds them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    #[serde(default = "default_ee_position")]
    pub ee_position: Vec3,
    /// Rough board position; refined by wrench identification.
    #[serde(default = "default_wrench")]
    pub wrench: Vec3,
    #[serde(default = "default_valve")]
    pub valve: Vec3,
}

fn default_ee_position() -> Vec3 {
    Vec3::new(0.3, 0.0, 1.0)
}
fn default_wrench() -> Vec3 {
    Vec3::new(1.2, 0.2, 0.9)
}
fn default_valve() -> Vec3 {
    Vec3::new(1.2, -0.3, 0.9)
}

impl Default for InitialState {
    fn default() -> Self {
        Self {
            ee_position: default_ee_position(),
            wrench: default_wrench(),
            valve: default_valve(),
        }
    }
}

impl InitialState {
    /// Write every position the state does not hold yet.
    pub fn seed(&self, state: &SharedState) -> Result<(), String> {
        for (key, value) in [
            (keys::EE_POSITION, self.ee_position),
            (keys::WRENCH, self.wrench),
            (keys::VALVE, self.valve),
        ] {
            state
                .seed_vec3(key, value)
                .map_err(|e| format!("Failed to seed `{key}`: {e}"))?;
        }
        Ok(())
    }
}

/// Persisted configuration stored in `~/.panelbot/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,

    /// Wrench localization pipeline.
    #[serde(default)]
    pub wrench: WrenchConfig,

    /// Valve localization pipeline.
    #[serde(default)]
    pub valve: ValveConfig,

    /// Retry bounds, frame budgets and standoffs.
    #[serde(default)]
    pub task: TaskConfig,

    #[serde(default)]
    pub initial_state: InitialState,

    /// JSON file backing the shared state; in-memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    /// Directory of recorded camera frames replayed during `run`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_dir: Option<PathBuf>,
}

impl Config {
    /// Check every section that carries its own validation.
    pub fn validate(&self) -> Result<(), String> {
        self.camera.build().map_err(|e| e.to_string())?;
        self.wrench.validate().map_err(|e| e.to_string())?;
        self.task.validate().map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Return the path to `~/.panelbot/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".panelbot").join("config.toml")
}

/// Load the config from `path`, or the default location, falling back to
/// defaults when the file does not exist.  Environment overrides are always
/// applied.
pub fn load(path: Option<&Path>) -> Result<Config, String> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let mut cfg = load_from(&path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `PANELBOT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PANELBOT_STATE_FILE` | `state_file` |
/// | `PANELBOT_FRAMES_DIR` | `frames_dir` |
/// | `PANELBOT_MAX_MOVE_RETRIES` | `task.max_move_retries` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PANELBOT_STATE_FILE") {
        cfg.state_file = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("PANELBOT_FRAMES_DIR") {
        cfg.frames_dir = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("PANELBOT_MAX_MOVE_RETRIES")
        && let Ok(n) = v.parse::<u32>()
    {
        cfg.task.max_move_retries = n;
    }
}

/// Save the config to a specific path, creating the parent directory.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

/// Write the default config to `path` unless a file already exists there.
pub fn init(path: Option<&Path>) -> Result<PathBuf, String> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    if path.exists() {
        return Err(format!("Config already exists at {}", path.display()));
    }
    save_to(&Config::default(), &path)?;
    Ok(path)
}

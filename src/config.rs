use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("wick")
}

/// Filesystem locations for local state.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AppConfig {
    pub data_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl AppConfig {
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}

/// User settings, persisted inside the state file alongside the tasks.
///
/// `sound_enabled`/`sound_volume` are carried for front-ends that play
/// completion sounds; the library only round-trips them.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub password_hash: Option<String>,
    pub github_token: Option<String>,
    pub github_repo: Option<String>,
    pub sound_enabled: bool,
    pub sound_volume: f32,
    pub debug_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            password_hash: None,
            github_token: None,
            github_repo: None,
            sound_enabled: true,
            sound_volume: 0.5,
            debug_logging: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_and_camel_case() {
        let settings = Settings::default();
        assert!(settings.sound_enabled);
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains(r#""passwordHash""#));
        assert!(json.contains(r#""soundVolume""#));
    }

    #[test]
    fn settings_tolerate_missing_fields() {
        let settings: Settings = serde_json::from_str(r#"{"githubRepo":"me/todo"}"#).unwrap();
        assert_eq!(settings.github_repo.as_deref(), Some("me/todo"));
        assert!(settings.password_hash.is_none());
    }

    #[test]
    fn state_path_is_under_data_dir() {
        let config = AppConfig {
            data_dir: PathBuf::from("/tmp/wick-test"),
        };
        assert_eq!(config.state_path(), PathBuf::from("/tmp/wick-test/state.json"));
    }
}

//! Settings and profiles, persisted as a YAML file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agent::AgentSettings;
use crate::profile::Profile;
use crate::state::DEFAULT_MONSTER_RANGE;

pub const APP_NAME: &str = "reagent";
pub const SETTINGS_FILE: &str = "settings.yaml";
pub const DEFAULT_PROFILE_NAME: &str = "Default";

const DEFAULT_KEY_PRESS_COOLDOWN_MS: u64 = 200;
const MAX_KEY_PRESS_COOLDOWN_MS: u64 = 1000;
const DEFAULT_HISTORY_SECONDS: u64 = 60;

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Master switch for the agent.
    pub enable: bool,
    /// Minimum time between two key presses, in milliseconds (0..=1000).
    pub global_key_press_cooldown_ms: u64,
    /// Monsters further away than this are invisible to rules.
    pub maximum_monster_range: f32,
    /// How long applied actions stay in the history.
    pub history_seconds_to_keep: u64,
    /// Root that relative `DisplayGraphic` paths are resolved against.
    pub image_directory: PathBuf,
    pub current_profile: String,
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable: true,
            global_key_press_cooldown_ms: DEFAULT_KEY_PRESS_COOLDOWN_MS,
            maximum_monster_range: DEFAULT_MONSTER_RANGE,
            history_seconds_to_keep: DEFAULT_HISTORY_SECONDS,
            image_directory: PathBuf::from("images"),
            current_profile: String::new(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn key_press_cooldown(&self) -> Duration {
        Duration::from_millis(
            self.global_key_press_cooldown_ms
                .min(MAX_KEY_PRESS_COOLDOWN_MS),
        )
    }

    pub fn history_retention(&self) -> Duration {
        Duration::from_secs(self.history_seconds_to_keep)
    }

    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            enabled: self.enable,
            key_press_cooldown: self.key_press_cooldown(),
            max_monster_range: self.maximum_monster_range.max(0.0),
            history_retention: self.history_retention(),
            image_directory: self.image_directory.clone(),
        }
    }

    /// Make sure `current_profile` names an existing profile and return it.
    ///
    /// Creates a default profile when there is none, and falls back to the
    /// first profile when the current name dangles.
    pub fn ensure_current_profile(&mut self) -> &mut Profile {
        if self.profiles.is_empty() {
            self.profiles.insert(
                DEFAULT_PROFILE_NAME.to_string(),
                Profile::create_with_default_group(),
            );
        }
        if !self.profiles.contains_key(&self.current_profile) {
            if let Some(first) = self.profiles.keys().next() {
                self.current_profile = first.clone();
            }
        }
        self.profiles
            .entry(self.current_profile.clone())
            .or_insert_with(Profile::create_with_default_group)
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn profile_mut(&mut self, name: &str) -> Option<&mut Profile> {
        self.profiles.get_mut(name)
    }
}

/// `<config dir>/reagent/settings.yaml` for the current user.
pub fn default_settings_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", APP_NAME)
        .context("Failed to determine config directory")?;
    Ok(dirs.config_dir().join(SETTINGS_FILE))
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    let settings = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
    info!("Loaded settings from {}", path.display());
    Ok(settings)
}

pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let content = serde_yaml::to_string(settings).context("Failed to serialize settings")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write settings to {}", path.display()))?;
    info!("Saved settings to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{ActionShape, Rule};
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.enable);
        assert_eq!(settings.key_press_cooldown(), Duration::from_millis(200));
        assert_eq!(settings.maximum_monster_range, 200.0);
        assert_eq!(settings.history_retention(), Duration::from_secs(60));
        assert_eq!(settings.agent_settings().image_directory, PathBuf::from("images"));
    }

    #[test]
    fn test_cooldown_is_clamped() {
        let settings = Settings {
            global_key_press_cooldown_ms: 5000,
            ..Settings::default()
        };
        assert_eq!(settings.agent_settings().key_press_cooldown, Duration::from_secs(1));
    }

    #[test]
    fn test_ensure_current_profile() {
        let mut settings = Settings::default();
        settings.ensure_current_profile();
        assert_eq!(settings.current_profile, DEFAULT_PROFILE_NAME);
        assert_eq!(settings.profiles.len(), 1);

        settings.profiles.insert("Boss".to_string(), Profile::new());
        settings.current_profile = "Gone".to_string();
        settings.ensure_current_profile();
        assert_eq!(settings.current_profile, "Boss");
        assert_eq!(settings.profiles.len(), 2);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let settings: Settings = serde_yaml::from_str("enable: false\n").unwrap();
        assert!(!settings.enable);
        assert_eq!(settings.global_key_press_cooldown_ms, 200);
        assert!(settings.profiles.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let mut settings = Settings::default();
        let profile = settings.ensure_current_profile();
        profile.groups_mut()[0].push_rule(Rule::with_shape("{ SetFlag('a') }", ActionShape::MultipleEffects));
        save_settings(&settings, &path).unwrap();

        let loaded = load_settings(&path).unwrap();
        assert_eq!(loaded.current_profile, DEFAULT_PROFILE_NAME);
        let profile = loaded.profile(DEFAULT_PROFILE_NAME).unwrap();
        let rule = &profile.groups()[0].rules()[0];
        assert_eq!(rule.source(), "{ SetFlag('a') }");
        assert_eq!(rule.shape(), ActionShape::MultipleEffects);
    }

    #[test]
    fn test_load_missing_file_fails_with_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        let err = load_settings(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to read settings"));
    }
}

// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use figment::providers::{Env, Format};
use figment::{providers::Toml, Figment};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;

use strum_macros::{Display, EnumIter};
use tracing::level_filters::LevelFilter;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default, Display, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    // View preferences
    pub hide_dnd_files: bool,
    pub filter_text: String,
    pub filter_regex: bool,

    // Background file operations
    pub batch_wait_timeout_ms: u64,
    pub batch_poll_interval_ms: u64,

    /// Appended to the names of files that are still downloading.
    pub incomplete_file_suffix: Option<String>,

    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hide_dnd_files: false,
            filter_text: String::new(),
            filter_regex: false,
            batch_wait_timeout_ms: 5000,
            batch_poll_interval_ms: 100,
            incomplete_file_suffix: Some(".!bt".to_string()),
            log_level: LogLevel::default(),
        }
    }
}

/// Config and data directories, created on first use.
pub fn get_app_paths() -> Option<(PathBuf, PathBuf)> {
    let proj_dirs = ProjectDirs::from("com", "github", "filesview")?;
    let config_dir = proj_dirs.config_dir().to_path_buf();
    let data_dir = proj_dirs.data_local_dir().to_path_buf();

    fs::create_dir_all(&config_dir).ok()?;
    fs::create_dir_all(&data_dir).ok()?;

    Some((config_dir, data_dir))
}

fn figment_for(config_file: PathBuf) -> Figment {
    Figment::new()
        .merge(Toml::file(config_file))
        .merge(Env::prefixed("FILESVIEW_"))
}

pub fn load_settings() -> Settings {
    if let Some((config_dir, _)) = get_app_paths() {
        let config_file_path = config_dir.join("settings.toml");

        return match figment_for(config_file_path).extract() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring unreadable settings: {}", e);
                Settings::default()
            }
        };
    }

    Settings::default()
}

/// Writes to a temp file first so a crash never leaves half a config behind.
pub fn save_settings(settings: &Settings) -> io::Result<()> {
    if let Some((config_dir, _)) = get_app_paths() {
        let config_file_path = config_dir.join("settings.toml");
        let temp_file_path = config_dir.join("settings.toml.tmp");
        let content = toml::to_string_pretty(settings).map_err(io::Error::other)?;
        fs::write(&temp_file_path, content)?;
        fs::rename(&temp_file_path, &config_file_path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::{Format, Toml};
    use figment::Figment;

    #[test]
    fn test_full_settings_parsing() {
        let toml_str = r#"
            hide_dnd_files = true
            filter_text = "sample|extras"
            filter_regex = true
            batch_wait_timeout_ms = 2500
            batch_poll_interval_ms = 50
            incomplete_file_suffix = ".part"
            log_level = "debug"
        "#;

        let settings: Settings = Figment::new()
            .merge(Toml::string(toml_str))
            .extract()
            .expect("Failed to parse full TOML string");

        assert!(settings.hide_dnd_files);
        assert_eq!(settings.filter_text, "sample|extras");
        assert!(settings.filter_regex);
        assert_eq!(settings.batch_wait_timeout_ms, 2500);
        assert_eq!(settings.batch_poll_interval_ms, 50);
        assert_eq!(settings.incomplete_file_suffix.as_deref(), Some(".part"));
        assert_eq!(settings.log_level, LogLevel::Debug);
        assert_eq!(LevelFilter::from(settings.log_level), LevelFilter::DEBUG);
    }

    #[test]
    fn test_partial_settings_override() {
        let toml_str = r#"
            filter_text = "iso"
        "#;

        let settings: Settings = Figment::new()
            .merge(Toml::string(toml_str))
            .extract()
            .expect("Failed to parse partial TOML string");

        let default_settings = Settings::default();
        assert_eq!(settings.filter_text, "iso");
        assert_eq!(settings.batch_wait_timeout_ms, default_settings.batch_wait_timeout_ms);
        assert_eq!(settings.incomplete_file_suffix.as_deref(), Some(".!bt"));
        assert_eq!(settings.log_level, LogLevel::Info);
    }

    #[test]
    fn test_default_settings() {
        let settings: Settings = Figment::new()
            .merge(Toml::string(""))
            .extract()
            .expect("Failed to parse empty string");

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.batch_wait_timeout_ms, 5000);
        assert_eq!(settings.batch_poll_interval_ms, 100);
        assert!(!settings.hide_dnd_files);
    }

    #[test]
    fn test_invalid_log_level_parsing() {
        let toml_str = r#"log_level = "LOUD""#;

        let result: Result<Settings, figment::Error> =
            Figment::new().merge(Toml::string(toml_str)).extract();

        let Err(e) = result else {
            panic!("Parsing should fail with an invalid log level");
        };
        let error_string = e.to_string();
        assert!(error_string.contains("LOUD"));
        assert!(error_string.contains("log_level"));
    }

    #[test]
    fn test_every_log_level_maps_to_a_filter() {
        use strum::IntoEnumIterator;

        let filters: Vec<LevelFilter> = LogLevel::iter().map(LevelFilter::from).collect();
        assert_eq!(filters.len(), 5);
        assert_eq!(filters[0], LevelFilter::ERROR);
        assert_eq!(filters[4], LevelFilter::TRACE);
    }

    #[test]
    fn test_settings_survive_toml_round_trip() {
        let settings = Settings {
            hide_dnd_files: true,
            incomplete_file_suffix: Some(".part".to_string()),
            log_level: LogLevel::Trace,
            ..Settings::default()
        };
        let text = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = Figment::new().merge(Toml::string(&text)).extract().unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("settings.toml", "filter_text = \"from-file\"\nhide_dnd_files = true")?;
            jail.set_env("FILESVIEW_FILTER_TEXT", "from-env");

            let settings: Settings = figment_for(jail.directory().join("settings.toml")).extract()?;
            assert_eq!(settings.filter_text, "from-env");
            assert!(settings.hide_dnd_files);
            Ok(())
        });
    }
}

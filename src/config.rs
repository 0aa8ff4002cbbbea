// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every field has a default, so a missing file or a partial file both work.
// A file that fails to parse is reported and replaced by the defaults.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_PATH: &str = "config.toml";

/// Upper bound on frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Root configuration structure
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// RGB, alpha is always opaque
    pub background_color: [f32; 3],
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Big Engine".to_string(),
            width: 1024,
            height: 768,
            background_color: [1.0, 0.0, 1.0],
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            max_frames_in_flight: 2,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    /// Used when RUST_LOG is not set
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: true,
            log_file: "logs/engine.log".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// What the window needs to know at creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub clear_color: [f32; 4],
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found.
    ///
    /// Runs before the logger exists, so a load failure is handed back to
    /// the caller instead of being logged here.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        Self::load_or_default(CONFIG_PATH)
    }

    /// Like `load_from_path`, but never fails: on error the defaults come back
    /// together with the error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<anyhow::Error>) {
        match Self::load_from_path(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::FIFO
            }
        }
    }

    /// Background colour with an opaque alpha channel
    pub fn clear_color(&self) -> [f32; 4] {
        let [r, g, b] = self.window.background_color;
        [r, g, b, 1.0]
    }

    pub fn frames_in_flight(&self) -> usize {
        self.graphics.max_frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT)
    }

    pub fn window_settings(&self) -> WindowSettings {
        WindowSettings {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
            clear_color: self.clear_color(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_startup_window() {
        let config = Config::default();
        assert_eq!(config.window.title, "Big Engine");
        assert_eq!((config.window.width, config.window.height), (1024, 768));
        assert_eq!(config.clear_color(), [1.0, 0.0, 1.0, 1.0]);
        assert_eq!(config.frames_in_flight(), 2);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn empty_document_is_all_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::parse(
            r#"
            [window]
            title = "Triangle"
            background_color = [0.1, 0.2, 0.3]

            [debug]
            log_to_file = false
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Triangle");
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.clear_color(), [0.1, 0.2, 0.3, 1.0]);
        assert!(!config.debug.log_to_file);
        assert_eq!(config.debug.log_level, "info");
        assert_eq!(config.graphics, GraphicsConfig::default());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(Config::parse("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn present_mode_names_are_case_insensitive() {
        let mut config = Config::default();
        config.graphics.present_mode = "MailBox".to_string();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
        config.graphics.present_mode = "fifo_relaxed".to_string();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO_RELAXED);
        config.graphics.present_mode = "vsync-ish".to_string();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn frames_in_flight_is_clamped() {
        let mut config = Config::default();
        config.graphics.max_frames_in_flight = 0;
        assert_eq!(config.frames_in_flight(), 1);
        config.graphics.max_frames_in_flight = 32;
        assert_eq!(config.frames_in_flight(), MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("big-engine-no-such-config.toml");
        let _ = std::fs::remove_file(&path);
        assert_eq!(Config::load_from_path(&path).unwrap(), Config::default());
    }

    #[test]
    fn parse_error_names_the_file() {
        let path = std::env::temp_dir().join(format!(
            "big-engine-bad-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[graphics\n").unwrap();
        let err = Config::load_from_path(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(format!("{err:#}").contains("big-engine-bad-config"));
    }

    #[test]
    fn broken_file_falls_back_to_defaults_and_reports_why() {
        let path = std::env::temp_dir().join(format!(
            "big-engine-fallback-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[window]\nwidth = -3\n").unwrap();
        let (config, error) = Config::load_or_default(&path);
        let _ = std::fs::remove_file(&path);

        assert_eq!(config, Config::default());
        assert!(error.is_some());
    }

    #[test]
    fn readable_file_loads_without_error() {
        let path = std::env::temp_dir().join(format!(
            "big-engine-good-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[graphics]\npresent_mode = \"mailbox\"\n").unwrap();
        let (config, error) = Config::load_or_default(&path);
        let _ = std::fs::remove_file(&path);

        assert!(error.is_none());
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn window_settings_carry_opaque_clear_color() {
        let settings = Config::default().window_settings();
        assert_eq!(settings.title, "Big Engine");
        assert_eq!(settings.clear_color[3], 1.0);
    }
}

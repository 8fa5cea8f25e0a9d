use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::gesture::GestureConfig;
use super::platform;
use super::spring::SpringParams;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub gesture: GestureConfig,
    #[serde(default)]
    pub spring: SpringParams,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub video: VideoConfig,
}

/// Station list sources, tried in order: TOML file, remote JSON, m3u.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Local TOML station file (highest priority).
    /// Defaults to `~/.config/swipe-radio/stations.toml`.
    #[serde(default = "default_stations_toml")]
    pub stations_toml: PathBuf,
    /// HTTP endpoint returning a JSON array of station records.
    #[serde(default)]
    pub remote_url: Option<String>,
    /// URL or file path of an m3u playlist (last resort).
    #[serde(default)]
    pub m3u: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    /// How long a stream may take to start before the station is given up.
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
    /// Grace delay between a playback error and the auto-skip.
    #[serde(default = "default_auto_skip_delay_ms")]
    pub auto_skip_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Pixels represented by one terminal row, so gesture thresholds keep
    /// their pixel meaning.
    #[serde(default = "default_px_per_row")]
    pub px_per_row: f32,
    /// Wheel delta per scroll notch (px).
    #[serde(default = "default_wheel_notch_px")]
    pub wheel_notch_px: f32,
    /// Below this width the carousel is replaced by the station grid.
    #[serde(default = "default_narrow_breakpoint_cols")]
    pub narrow_breakpoint_cols: u16,
    /// Neighbours rendered on each side of the current card.
    #[serde(default = "default_visible_window")]
    pub visible_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VideoConfig {
    /// Open an mpv window looping each station's clip.
    #[serde(default)]
    pub enabled: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            stations_toml: default_stations_toml(),
            remote_url: None,
            m3u: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            stall_timeout_secs: default_stall_timeout_secs(),
            auto_skip_delay_ms: default_auto_skip_delay_ms(),
        }
    }
}

impl AudioConfig {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    pub fn auto_skip_delay(&self) -> Duration {
        Duration::from_millis(self.auto_skip_delay_ms)
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            px_per_row: default_px_per_row(),
            wheel_notch_px: default_wheel_notch_px(),
            narrow_breakpoint_cols: default_narrow_breakpoint_cols(),
            visible_window: default_visible_window(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_stations_toml() -> PathBuf {
    platform::config_dir().join("stations.toml")
}

fn default_volume() -> f32 {
    1.0
}

fn default_stall_timeout_secs() -> u64 {
    10
}

fn default_auto_skip_delay_ms() -> u64 {
    2000
}

fn default_px_per_row() -> f32 {
    16.0
}

fn default_wheel_notch_px() -> f32 {
    50.0
}

fn default_narrow_breakpoint_cols() -> u16 {
    60
}

fn default_visible_window() -> usize {
    crate::carousel::DEFAULT_WINDOW
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 8990);
        assert_eq!(config.audio.stall_timeout(), Duration::from_secs(10));
        assert_eq!(config.audio.auto_skip_delay(), Duration::from_secs(2));
        assert_eq!(config.gesture.drag_threshold, 0.15);
        assert_eq!(config.spring.tension, 300.0);
        assert!(!config.video.enabled);
        assert!(config
            .catalog
            .stations_toml
            .ends_with("swipe-radio/stations.toml"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [gesture]
            velocity_threshold = 0.5

            [ui]
            px_per_row = 20.0
            "#,
        )
        .unwrap();
        assert_eq!(config.gesture.velocity_threshold, 0.5);
        assert_eq!(config.gesture.rubber_band_max, 120.0);
        assert_eq!(config.ui.px_per_row, 20.0);
        assert_eq!(config.ui.wheel_notch_px, 50.0);
        assert_eq!(config.spring.friction, 26.0);
    }

    #[test]
    fn test_round_trips_through_toml() {
        let mut config = Config::default();
        config.catalog.remote_url = Some("https://example.org/stations.json".into());
        let text = toml::to_string_pretty(&config).unwrap();
        let back = Config::from_toml_str(&text).unwrap();
        assert_eq!(back.catalog.remote_url, config.catalog.remote_url);
    }
}

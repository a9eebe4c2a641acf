use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;

use crate::album_layout::AlbumLayoutParams;
use crate::media_sizes::MediaSize;

const DEFAULT_CONFIG_PATH: &str = "chat_ui.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub typing_window_ms: u64,
    pub emoji_close_delay_ms: u64,
    pub album_max_width: u32,
    pub album_row_height: u32,
    pub album_max_per_row: usize,
    pub album_spacing: u32,
    pub single_media_width: u32,
    pub single_media_height: u32,
    pub pinned_banner_height: f64,
    pub group_media_albums: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            typing_window_ms: 6000,
            emoji_close_delay_ms: 200,
            album_max_width: 380,
            album_row_height: 100,
            album_max_per_row: 4,
            album_spacing: 2,
            single_media_width: 380,
            single_media_height: 320,
            pinned_banner_height: 52.0,
            group_media_albums: false,
        }
    }
}

impl Settings {
    pub fn typing_window(&self) -> Duration {
        Duration::from_millis(self.typing_window_ms)
    }

    pub fn emoji_close_delay(&self) -> Duration {
        Duration::from_millis(self.emoji_close_delay_ms)
    }

    pub fn album_params(&self) -> AlbumLayoutParams {
        AlbumLayoutParams {
            max_width: self.album_max_width,
            row_height: self.album_row_height,
            max_per_row: self.album_max_per_row.max(1),
            spacing: self.album_spacing,
        }
    }

    pub fn single_media_box(&self) -> MediaSize {
        MediaSize::new(
            f64::from(self.single_media_width),
            f64::from(self.single_media_height),
        )
    }
}

/// Loads settings from `CHAT_UI_CONFIG` (or `chat_ui.toml`) and then applies
/// `APP__*` environment overrides.
pub fn load_settings() -> Settings {
    let path = std::env::var("CHAT_UI_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut settings = load_settings_from(Path::new(&path));
    apply_env_overrides(&mut settings);
    settings
}

/// Reads one settings file. A missing or malformed file yields the defaults.
pub fn load_settings_from(path: &Path) -> Settings {
    let Ok(raw) = fs::read_to_string(path) else {
        return Settings::default();
    };

    match toml::from_str::<Settings>(&raw) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring malformed chat ui config");
            Settings::default()
        }
    }
}

fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Applies `APP__*` overrides from `lookup`. Values that fail to parse leave
/// the field untouched.
fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = parse(lookup("APP__TYPING_WINDOW_MS")) {
        settings.typing_window_ms = v;
    }
    if let Some(v) = parse(lookup("APP__EMOJI_CLOSE_DELAY_MS")) {
        settings.emoji_close_delay_ms = v;
    }
    if let Some(v) = parse(lookup("APP__ALBUM_MAX_WIDTH")) {
        settings.album_max_width = v;
    }
    if let Some(v) = parse(lookup("APP__ALBUM_ROW_HEIGHT")) {
        settings.album_row_height = v;
    }
    if let Some(v) = parse(lookup("APP__ALBUM_MAX_PER_ROW")) {
        settings.album_max_per_row = v;
    }
    if let Some(v) = parse(lookup("APP__ALBUM_SPACING")) {
        settings.album_spacing = v;
    }
    if let Some(v) = parse(lookup("APP__SINGLE_MEDIA_WIDTH")) {
        settings.single_media_width = v;
    }
    if let Some(v) = parse(lookup("APP__SINGLE_MEDIA_HEIGHT")) {
        settings.single_media_height = v;
    }
    if let Some(v) = parse(lookup("APP__PINNED_BANNER_HEIGHT")) {
        settings.pinned_banner_height = v;
    }
    if let Some(v) = parse(lookup("APP__GROUP_MEDIA_ALBUMS")) {
        settings.group_media_albums = v;
    }
}

fn parse<T: std::str::FromStr>(raw: Option<String>) -> Option<T> {
    raw?.trim().parse().ok()
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

use std::path::{Path, PathBuf};

use crate::canvas::Size;
use crate::error::DocResult;

/// When freehand tools (pencil, eraser) record history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FreehandCommit {
    /// One record per pointer sample: each dab is its own undo step.
    #[default]
    PerSample,
    /// One record for the whole stroke, written on release.
    PerGesture,
}

impl FreehandCommit {
    pub fn as_str(&self) -> &'static str {
        match self {
            FreehandCommit::PerSample => "per_sample",
            FreehandCommit::PerGesture => "per_gesture",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "per_sample" => Some(FreehandCommit::PerSample),
            "per_gesture" => Some(FreehandCommit::PerGesture),
            _ => None,
        }
    }
}

/// Persisted editor preferences.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub default_width: u32,
    pub default_height: u32,
    /// Milliseconds per frame for newly added frames.
    pub default_frame_duration: i64,
    pub default_tip_size: u32,
    pub freehand_commit: FreehandCommit,
    /// Leave fully transparent buffers out of saved projects.
    pub omit_empty_buffers: bool,
    /// Loop exported GIFs forever.
    pub gif_repeat: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            default_width: 32,
            default_height: 32,
            default_frame_duration: 100,
            default_tip_size: 1,
            freehand_commit: FreehandCommit::PerSample,
            omit_empty_buffers: true,
            gif_repeat: true,
        }
    }
}

impl EditorSettings {
    pub fn default_size(&self) -> Size {
        Size::new(self.default_width.max(1), self.default_height.max(1))
    }

    /// Path to the settings file.
    /// On Linux:   ~/.config/spritefe/spritefe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\SpriteFE\spritefe_settings.cfg
    /// On macOS:   ~/Library/Application Support/SpriteFE/spritefe_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            return Some(
                PathBuf::from(appdata)
                    .join("SpriteFE")
                    .join("spritefe_settings.cfg"),
            );
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("SpriteFE")
                    .join("spritefe_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("spritefe").join("spritefe_settings.cfg"))
        }
    }

    /// Parse `key=value` lines. Unknown keys and unparsable values keep the default.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "default_width" => {
                    s.default_width = val
                        .parse()
                        .ok()
                        .filter(|&w| w >= 1)
                        .unwrap_or(s.default_width);
                }
                "default_height" => {
                    s.default_height = val
                        .parse()
                        .ok()
                        .filter(|&h| h >= 1)
                        .unwrap_or(s.default_height);
                }
                "default_frame_duration" => {
                    s.default_frame_duration = val
                        .parse()
                        .ok()
                        .filter(|&d| d >= 0)
                        .unwrap_or(s.default_frame_duration);
                }
                "default_tip_size" => {
                    s.default_tip_size = val
                        .parse()
                        .ok()
                        .filter(|&t| t >= 1)
                        .unwrap_or(s.default_tip_size);
                }
                "freehand_commit" => {
                    if let Some(mode) = FreehandCommit::parse(val) {
                        s.freehand_commit = mode;
                    }
                }
                "omit_empty_buffers" => s.omit_empty_buffers = val == "true",
                "gif_repeat" => s.gif_repeat = val == "true",
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "default_width={}\n\
             default_height={}\n\
             default_frame_duration={}\n\
             default_tip_size={}\n\
             freehand_commit={}\n\
             omit_empty_buffers={}\n\
             gif_repeat={}\n",
            self.default_width,
            self.default_height,
            self.default_frame_duration,
            self.default_tip_size,
            self.freehand_commit.as_str(),
            self.omit_empty_buffers,
            self.gif_repeat,
        )
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> DocResult<()> {
        match Self::settings_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> DocResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }
}

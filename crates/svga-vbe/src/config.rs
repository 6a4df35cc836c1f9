//! Startup video settings.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VideoError};

/// A saved explicit mode preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedMode {
    pub mode: u16,
    pub width: u16,
    pub height: u16,
    #[serde(default)]
    pub half: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartMode {
    /// Pick the largest usable mode the adapter reports.
    #[default]
    Auto,
    Fixed(FixedMode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SvgaConfig {
    pub start_mode: StartMode,
    /// Try the linear framebuffer before the banked window.
    pub prefer_linear: bool,
    pub max_width: u16,
    pub max_height: u16,
    /// End fallback lists with VGA mode 13h.
    pub allow_legacy_fallback: bool,
}

impl Default for SvgaConfig {
    fn default() -> Self {
        Self {
            start_mode: StartMode::Auto,
            prefer_linear: true,
            max_width: 1024,
            max_height: 768,
            allow_legacy_fallback: true,
        }
    }
}

impl SvgaConfig {
    pub const MIN_WIDTH: u16 = 640;
    pub const MIN_HEIGHT: u16 = 480;

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| VideoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(VideoError::Config(format!("{}: {e}", path.display()))),
        };
        Self::from_json_str(&raw)
    }

    /// Writes the config atomically through a sibling `.tmp` file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw =
            serde_json::to_string_pretty(self).map_err(|e| VideoError::Config(e.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| VideoError::Config(e.to_string()))?;
        }
        let tmp = tmp_path(path);
        fs::write(&tmp, raw).map_err(|e| VideoError::Config(e.to_string()))?;
        fs::rename(&tmp, path).map_err(|e| VideoError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_width < Self::MIN_WIDTH || self.max_height < Self::MIN_HEIGHT {
            return Err(VideoError::Config(format!(
                "max resolution {}x{} is below {}x{}",
                self.max_width,
                self.max_height,
                Self::MIN_WIDTH,
                Self::MIN_HEIGHT
            )));
        }
        if let StartMode::Fixed(fixed) = self.start_mode {
            if fixed.width == 0 || fixed.height == 0 {
                return Err(VideoError::Config(format!(
                    "fixed mode {:#05x} has an empty resolution",
                    fixed.mode
                )));
            }
        }
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default() {
        assert_eq!(SvgaConfig::from_json_str("{}").unwrap(), SvgaConfig::default());
    }

    #[test]
    fn fixed_mode_parses() {
        let config = SvgaConfig::from_json_str(
            r#"{"start_mode":{"fixed":{"mode":259,"width":800,"height":600}},"prefer_linear":false}"#,
        )
        .unwrap();
        assert_eq!(
            config.start_mode,
            StartMode::Fixed(FixedMode {
                mode: 0x103,
                width: 800,
                height: 600,
                half: false,
            })
        );
        assert!(!config.prefer_linear);
        assert!(config.allow_legacy_fallback);
    }

    #[test]
    fn auto_is_a_plain_string() {
        let config = SvgaConfig::from_json_str(r#"{"start_mode":"auto"}"#).unwrap();
        assert_eq!(config.start_mode, StartMode::Auto);
    }

    #[test]
    fn unknown_fields_and_small_limits_are_rejected() {
        assert!(matches!(
            SvgaConfig::from_json_str(r#"{"resolution":"high"}"#),
            Err(VideoError::Config(_))
        ));
        assert!(matches!(
            SvgaConfig::from_json_str(r#"{"max_width":320}"#),
            Err(VideoError::Config(_))
        ));
    }
}

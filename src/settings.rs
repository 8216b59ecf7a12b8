//! Capture configuration as handed over by the CLI layer.

use std::path::PathBuf;
use std::time::Duration;

use crate::backend::WindowId;

/// Rejected command-line input.
#[derive(thiserror::Error, Eq, PartialEq, Clone, Debug)]
pub enum ConfigError {
    #[error("invalid window id '{0}'")]
    InvalidWindowId(String),
    #[error("0 is not a valid window id")]
    ZeroWindowId,
}

/// Everything one capture invocation is parameterized by.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct CaptureSettings {
    /// Display to connect to; `None` lets the connection library use
    /// `$DISPLAY`.
    pub display: Option<String>,
    /// Sleep inserted before the pixel fetch.
    pub delay: Duration,
    /// Destination file.
    pub output: PathBuf,
    /// Explicit capture target; `None` runs the interactive picker.
    pub window: Option<WindowId>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            display: None,
            delay: Duration::ZERO,
            output: PathBuf::from("screenshot.png"),
            window: None,
        }
    }
}

/// Parse a window id given as decimal or `0x`-prefixed hex.
///
/// A string that does not parse and a parsed value of zero are distinct
/// errors: X11 never assigns resource id 0, so a literal `0` is rejected
/// explicitly rather than being confused with a parse failure.
pub fn parse_window_id(input: &str) -> Result<WindowId, ConfigError> {
    let trimmed = input.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => WindowId::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    match parsed {
        Ok(0) => Err(ConfigError::ZeroWindowId),
        Ok(id) => Ok(id),
        Err(_) => Err(ConfigError::InvalidWindowId(input.to_owned())),
    }
}

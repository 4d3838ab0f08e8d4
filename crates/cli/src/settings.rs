use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use deepfake_scan_core::scoring::domain::frame_preprocessor::ChannelOrder;
use deepfake_scan_core::scoring::infrastructure::onnx_frame_scorer::DEFAULT_OUTPUT_INDEX;

/// Persistent defaults, overridden by command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model_path: Option<PathBuf>,
    pub model_url: Option<String>,
    pub channel_order: ChannelOrder,
    pub output_index: usize,
    pub batch_size: usize,
    pub timeout_secs: Option<u64>,
    pub best_effort: bool,
    pub sequential: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_path: None,
            model_url: None,
            channel_order: ChannelOrder::default(),
            output_index: DEFAULT_OUTPUT_INDEX,
            batch_size: 1,
            timeout_secs: None,
            best_effort: false,
            sequential: false,
        }
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("DeepfakeScan").join("settings.json"))
    }

    /// Reads settings from `explicit`, or from the default location.
    ///
    /// A missing default file means defaults; a missing explicit file, or
    /// any file that does not parse, is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };

        let json = fs::read_to_string(&path)
            .map_err(|e| format!("Cannot read settings {}: {e}", path.display()))?;
        let settings = serde_json::from_str(&json)
            .map_err(|e| format!("Invalid settings {}: {e}", path.display()))?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}

pub mod sources;

use std::path::PathBuf;

use scandrop_core::intake::IntakeConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Config {
    pub intake: IntakeConfig,
    pub tools: ToolsConfig,
    pub metadata: ConfigMetadata,
}

/// External binaries the bundled collaborators shell out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub pdftoppm_path: PathBuf,
    pub pdfinfo_path: PathBuf,
    pub zbarimg_path: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            pdftoppm_path: PathBuf::from("pdftoppm"),
            pdfinfo_path: PathBuf::from("pdfinfo"),
            zbarimg_path: PathBuf::from("zbarimg"),
        }
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

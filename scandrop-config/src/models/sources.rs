use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Raw configuration as defined in a TOML file. Every key is optional.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub directories: FileDirectoriesConfig,
    #[serde(default)]
    pub watch: FileWatchConfig,
    #[serde(default)]
    pub stability: FileStabilityConfig,
    #[serde(default)]
    pub pool: FilePoolConfig,
    #[serde(default)]
    pub identify: FileIdentifyConfig,
    #[serde(default)]
    pub tools: FileToolsConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDirectoriesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incoming: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileWatchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored_prefixes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_buffer: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_idle_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consecutive_matches: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePoolConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown_grace_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileIdentifyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_dpi: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientations: Option<Vec<u16>>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileToolsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdftoppm_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdfinfo_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zbarimg_path: Option<PathBuf>,
}

/// An environment variable that was set but could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEnvValue {
    pub name: &'static str,
    pub raw: String,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub incoming_dir: Option<PathBuf>,
    pub processing_dir: Option<PathBuf>,
    pub finished_dir: Option<PathBuf>,
    pub failed_dir: Option<PathBuf>,
    pub poll_timeout_ms: Option<u64>,
    pub extensions: Option<Vec<String>>,
    pub sweep_interval_ms: Option<u64>,
    pub stability_interval_ms: Option<u64>,
    pub stability_min_idle_ms: Option<u64>,
    pub stability_max_attempts: Option<u32>,
    pub stability_consecutive_matches: Option<u32>,
    pub workers: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub shutdown_grace_ms: Option<u64>,
    pub render_dpi: Option<u32>,
    pub pdftoppm_path: Option<PathBuf>,
    pub pdfinfo_path: Option<PathBuf>,
    pub zbarimg_path: Option<PathBuf>,
    /// Set but unparseable; the lower-precedence value is used instead.
    pub invalid: Vec<InvalidEnvValue>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut reader = EnvReader {
            lookup,
            invalid: Vec::new(),
        };

        let mut env_config = Self {
            config_path: reader.path("SCANDROP_CONFIG_PATH"),
            incoming_dir: reader.path("WATCH_INCOMING_DIR"),
            processing_dir: reader.path("WATCH_PROCESSING_DIR"),
            finished_dir: reader.path("WATCH_FINISHED_DIR"),
            failed_dir: reader.path("WATCH_FAILED_DIR"),
            poll_timeout_ms: reader.number("WATCH_POLL_TIMEOUT_MS"),
            extensions: reader.csv("WATCH_EXTENSIONS"),
            sweep_interval_ms: reader.number("WATCH_SWEEP_INTERVAL_MS"),
            stability_interval_ms: reader.number("WATCH_STABILITY_INTERVAL_MS"),
            stability_min_idle_ms: reader.number("WATCH_STABILITY_MIN_IDLE_MS"),
            stability_max_attempts: reader.number("WATCH_STABILITY_MAX_ATTEMPTS"),
            stability_consecutive_matches: reader.number("WATCH_STABILITY_CONSEC_MATCH"),
            workers: reader.number("WATCH_WORKERS"),
            queue_capacity: reader.number("WATCH_QUEUE_CAPACITY"),
            shutdown_grace_ms: reader.number("WATCH_SHUTDOWN_GRACE_MS"),
            render_dpi: reader.number("WATCH_RENDER_DPI"),
            pdftoppm_path: reader.path("PDFTOPPM_PATH"),
            pdfinfo_path: reader.path("PDFINFO_PATH"),
            zbarimg_path: reader.path("ZBARIMG_PATH"),
            invalid: Vec::new(),
        };
        env_config.invalid = reader.invalid;
        env_config
    }
}

struct EnvReader<F> {
    lookup: F,
    invalid: Vec<InvalidEnvValue>,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|raw| raw.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn path(&self, name: &str) -> Option<PathBuf> {
        self.string(name).map(PathBuf::from)
    }

    fn number<T: FromStr>(&mut self, name: &'static str) -> Option<T> {
        let raw = self.string(name)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.invalid.push(InvalidEnvValue { name, raw });
                None
            }
        }
    }

    fn csv(&self, name: &str) -> Option<Vec<String>> {
        self.string(name).map(|raw| {
            raw.split(',')
                .filter_map(|part| {
                    let trimmed = part.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    }
                })
                .collect()
        })
    }
}

use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

use scandrop_core::intake::{
    DirectoryConfig, IdentifyConfig, IntakeConfig, PoolConfig, StabilityConfig, WatchConfig,
};

use crate::models::{
    Config, ConfigMetadata, ToolsConfig,
    sources::{EnvConfig, FileConfig},
};
use crate::validation::{self, ConfigGuardRailError, ConfigWarnings};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("scandrop.toml"),
        PathBuf::from("config/scandrop.toml"),
    ]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Seed the process environment from the `.env` file, then resolve the
    /// configuration against it.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigLoadError::MissingEnvFile { path: path.clone() });
                }
                dotenvy::from_path(path)?;
                true
            }
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
        };

        let mut load = self.load_from(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Resolve the configuration from an already gathered environment.
    pub fn load_from(&self, env: EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let (config, warnings) = compose_config(file_config, env, config_path)?;
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let resolved = match (&self.options.config_path, &env.config_path) {
            (Some(explicit), _) => Some((explicit.clone(), true)),
            (None, Some(from_env)) => Some((from_env.clone(), true)),
            (None, None) => DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .map(|found| (found.clone(), false)),
        };

        let Some((path, required)) = resolved else {
            return Ok((None, None));
        };

        if !path.exists() {
            if required {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let file_config = read_file_config(&path)?;
        debug!(path = %path.display(), "configuration file loaded");
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    config_path: Option<PathBuf>,
) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if config_path.is_none() {
        warnings.push_with_hint(
            "No scandrop.toml detected; using environment variables and defaults",
            "Pass --config or set SCANDROP_CONFIG_PATH to use a configuration file",
        );
    }

    for invalid in &env.invalid {
        warnings.push_with_hint(
            format!("{}={:?} is not a valid number; ignoring it", invalid.name, invalid.raw),
            "Fix or unset the variable",
        );
    }

    let FileConfig {
        directories: file_directories,
        watch: file_watch,
        stability: file_stability,
        pool: file_pool,
        identify: file_identify,
        tools: file_tools,
    } = file_config.unwrap_or_default();

    let default_directories = DirectoryConfig::default();
    let directories = DirectoryConfig {
        incoming: env
            .incoming_dir
            .or(file_directories.incoming)
            .unwrap_or(default_directories.incoming),
        processing: env
            .processing_dir
            .or(file_directories.processing)
            .unwrap_or(default_directories.processing),
        finished: env
            .finished_dir
            .or(file_directories.finished)
            .unwrap_or(default_directories.finished),
        failed: env
            .failed_dir
            .or(file_directories.failed)
            .unwrap_or(default_directories.failed),
    };

    let default_watch = WatchConfig::default();
    // Zero from either source switches the sweep off.
    let sweep_interval_ms = match env.sweep_interval_ms {
        Some(ms) => Some(ms),
        None => file_watch.sweep_interval_ms,
    }
    .filter(|ms| *ms > 0);
    let watch = WatchConfig {
        poll_timeout_ms: env
            .poll_timeout_ms
            .or(file_watch.poll_timeout_ms)
            .unwrap_or(default_watch.poll_timeout_ms),
        extensions: env
            .extensions
            .or(file_watch.extensions)
            .unwrap_or(default_watch.extensions),
        ignored_prefixes: file_watch
            .ignored_prefixes
            .unwrap_or(default_watch.ignored_prefixes),
        sweep_interval_ms,
        event_buffer: file_watch
            .event_buffer
            .unwrap_or(default_watch.event_buffer),
    };

    let default_stability = StabilityConfig::default();
    let stability = StabilityConfig {
        check_interval_ms: env
            .stability_interval_ms
            .or(file_stability.check_interval_ms)
            .unwrap_or(default_stability.check_interval_ms),
        min_idle_ms: env
            .stability_min_idle_ms
            .or(file_stability.min_idle_ms)
            .unwrap_or(default_stability.min_idle_ms),
        max_attempts: env
            .stability_max_attempts
            .or(file_stability.max_attempts)
            .unwrap_or(default_stability.max_attempts),
        consecutive_matches: env
            .stability_consecutive_matches
            .or(file_stability.consecutive_matches)
            .unwrap_or(default_stability.consecutive_matches),
    };

    let default_pool = PoolConfig::default();
    let pool = PoolConfig {
        workers: env
            .workers
            .or(file_pool.workers)
            .unwrap_or(default_pool.workers),
        queue_capacity: env
            .queue_capacity
            .or(file_pool.queue_capacity)
            .unwrap_or(default_pool.queue_capacity),
        shutdown_grace_ms: env
            .shutdown_grace_ms
            .or(file_pool.shutdown_grace_ms)
            .unwrap_or(default_pool.shutdown_grace_ms),
    };

    let default_identify = IdentifyConfig::default();
    let identify = IdentifyConfig {
        render_dpi: env
            .render_dpi
            .or(file_identify.render_dpi)
            .unwrap_or(default_identify.render_dpi),
        orientations: file_identify
            .orientations
            .unwrap_or(default_identify.orientations),
    };

    let default_tools = ToolsConfig::default();
    let tools = ToolsConfig {
        pdftoppm_path: env
            .pdftoppm_path
            .or(file_tools.pdftoppm_path)
            .unwrap_or(default_tools.pdftoppm_path),
        pdfinfo_path: env
            .pdfinfo_path
            .or(file_tools.pdfinfo_path)
            .unwrap_or(default_tools.pdfinfo_path),
        zbarimg_path: env
            .zbarimg_path
            .or(file_tools.zbarimg_path)
            .unwrap_or(default_tools.zbarimg_path),
    };

    let config = Config {
        intake: IntakeConfig {
            directories,
            watch,
            stability,
            pool,
            identify,
        },
        tools,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded: false,
        },
    };

    let guard_warnings = validation::apply_guard_rails(&config)?;
    warnings.extend(guard_warnings);

    Ok((config, warnings))
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("env file missing: {path}")]
    MissingEnvFile { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to load env file")]
    EnvFile(#[from] dotenvy::Error),
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

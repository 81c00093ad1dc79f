/// Application configuration
use crate::error::{AppError, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, Map, Source, Value, ValueKind};
use s3u_uploader::S3Settings;
use s3u_watcher::WatcherConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::level_filters::LevelFilter;

/// Config file picked up from the working directory when no path is given
const DEFAULT_CONFIG_FILE: &str = "s3-uploader.toml";

/// Prefix of environment variables (`S3U_WATCH__DIRECTORY`, `S3U_S3__BUCKET`, ...)
const ENV_PREFIX: &str = "S3U";

/// Flat variable names of earlier releases and the keys they set
const FLAT_ENV_KEYS: &[(&str, &str)] = &[
    ("S3U_DIRECTORY", "watch.directory"),
    ("S3U_INTERVAL", "watch.interval_secs"),
    ("S3U_LOGLEVEL", "log_level"),
    ("S3U_PARALLELUPLOADS", "upload.parallel_uploads"),
    ("S3U_UPLOADQUEUESIZE", "upload.queue_size"),
    ("S3U_S3_REGION", "s3.region"),
    ("S3U_S3_BUCKET", "s3.bucket"),
    ("S3U_S3_ENDPOINT", "s3.endpoint"),
    ("S3U_S3_ACCESSKEYID", "s3.access_key_id"),
    ("S3U_S3_SECRETACCESSKEY", "s3.secret_access_key"),
    ("S3U_S3_SESSIONTOKEN", "s3.session_token"),
];

/// Reads the flat `S3U_*` variables listed in [`FLAT_ENV_KEYS`]
///
/// Empty variables are ignored.
#[derive(Debug, Clone, Default)]
struct FlatEnvironment;

impl Source for FlatEnvironment {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> std::result::Result<Map<String, Value>, config::ConfigError> {
        let origin = "the environment".to_string();
        let mut values = Map::new();

        for (var, key) in FLAT_ENV_KEYS {
            let Ok(raw) = std::env::var(var) else {
                continue;
            };
            if raw.is_empty() {
                continue;
            }

            let kind = match raw.parse::<u64>() {
                Ok(number) => ValueKind::U64(number),
                Err(_) => ValueKind::String(raw),
            };
            values.insert((*key).to_string(), Value::new(Some(&origin), kind));
        }

        Ok(values)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_watch")]
    pub watch: WatchSettings,

    #[serde(default = "default_upload")]
    pub upload: UploadSettings,

    #[serde(default)]
    pub s3: S3Settings,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchSettings {
    /// Directory to watch for files to upload
    #[serde(default)]
    pub directory: PathBuf,

    /// Check interval for file changes in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default)]
    pub follow_links: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSettings {
    /// Maximum number of parallel uploads
    #[serde(default = "default_parallel_uploads")]
    pub parallel_uploads: usize,

    /// Size of the upload queue; should be larger than the number of files
    /// expected to change per check cycle
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

/// Values given on the command line, applied on top of file and environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub directory: Option<PathBuf>,
    pub interval_secs: Option<u64>,
    pub log_level: Option<String>,
    pub parallel_uploads: Option<u64>,
    pub queue_size: Option<u64>,
    pub s3_region: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub s3_session_token: Option<String>,
    pub s3_force_path_style: Option<bool>,
}

impl ConfigOverrides {
    fn apply(
        &self,
        builder: ConfigBuilder<DefaultState>,
    ) -> std::result::Result<ConfigBuilder<DefaultState>, config::ConfigError> {
        let directory = self
            .directory
            .as_ref()
            .map(|dir| dir.to_string_lossy().into_owned());

        builder
            .set_override_option("watch.directory", directory)?
            .set_override_option("watch.interval_secs", self.interval_secs)?
            .set_override_option("log_level", self.log_level.clone())?
            .set_override_option("upload.parallel_uploads", self.parallel_uploads)?
            .set_override_option("upload.queue_size", self.queue_size)?
            .set_override_option("s3.region", self.s3_region.clone())?
            .set_override_option("s3.bucket", self.s3_bucket.clone())?
            .set_override_option("s3.endpoint", self.s3_endpoint.clone())?
            .set_override_option("s3.access_key_id", self.s3_access_key_id.clone())?
            .set_override_option("s3.secret_access_key", self.s3_secret_access_key.clone())?
            .set_override_option("s3.session_token", self.s3_session_token.clone())?
            .set_override_option("s3.force_path_style", self.s3_force_path_style)
    }
}

impl AppConfig {
    /// Load configuration from file, environment and overrides
    ///
    /// Without an explicit `file`, `s3-uploader.toml` in the working
    /// directory is used if it exists.
    pub fn load(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut settings = config::Config::builder();

        match file {
            Some(path) => {
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        // Override with environment variables (prefixed with S3U_); the
        // sectioned names win over the flat ones
        settings = settings.add_source(FlatEnvironment).add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = overrides.apply(settings)?.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let directory = &self.watch.directory;
        if directory.as_os_str().is_empty() {
            return Err(AppError::Config(
                "Watch directory is required (--directory or S3U_DIRECTORY)".to_string(),
            ));
        }

        if !directory.is_dir() {
            return Err(AppError::Config(format!(
                "Watch directory {:?} does not exist or is not a directory",
                directory
            )));
        }

        if self.watch.interval_secs == 0 {
            return Err(AppError::Config(
                "Check interval must be at least one second".to_string(),
            ));
        }

        if self.upload.parallel_uploads == 0 {
            return Err(AppError::Config(
                "Parallel uploads must be at least 1".to_string(),
            ));
        }

        if self.upload.queue_size == 0 {
            return Err(AppError::Config(
                "Upload queue size must be at least 1".to_string(),
            ));
        }

        if self.s3.region.is_empty() {
            return Err(AppError::Config(
                "S3 region is required (--s3-region or S3U_S3_REGION)".to_string(),
            ));
        }

        if self.s3.bucket.is_empty() {
            return Err(AppError::Config(
                "S3 bucket is required (--s3-bucket or S3U_S3_BUCKET)".to_string(),
            ));
        }

        if self.s3.access_key_id.is_some() != self.s3.secret_access_key.is_some() {
            return Err(AppError::Config(
                "S3 access key ID and secret access key must be given together".to_string(),
            ));
        }

        self.log_filter()?;

        Ok(())
    }

    /// Parsed log level
    pub fn log_filter(&self) -> Result<LevelFilter> {
        self.log_level
            .parse()
            .map_err(|_| AppError::Config(format!("Invalid log level: {}", self.log_level)))
    }

    /// Watcher settings derived from this configuration
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            interval: Duration::from_secs(self.watch.interval_secs),
            queue_capacity: self.upload.queue_size,
        }
    }
}

// Default values
fn default_watch() -> WatchSettings {
    WatchSettings {
        directory: PathBuf::new(),
        interval_secs: default_interval_secs(),
        follow_links: false,
    }
}

fn default_interval_secs() -> u64 {
    10
}

fn default_upload() -> UploadSettings {
    UploadSettings {
        parallel_uploads: default_parallel_uploads(),
        queue_size: default_queue_size(),
    }
}

fn default_parallel_uploads() -> usize {
    5
}

fn default_queue_size() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watch: default_watch(),
            upload: default_upload(),
            s3: S3Settings::default(),
            log_level: default_log_level(),
        }
    }
}

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised when the loaded configuration is unusable
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Main configuration for the video processor
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 configuration
    #[serde(default)]
    pub s3: S3Config,
    /// Pipeline configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// External decoder configuration
    #[serde(default)]
    pub decoder: DecoderConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Prometheus exporter port; no exporter is installed when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// S3 client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Maximum number of frame uploads in flight
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    /// Local scratch area for downloaded videos and extracted frames
    #[serde(default = "default_scratch_root")]
    pub scratch_root: PathBuf,
    /// Extensions (without the dot) accepted as video, compared case-insensitively
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
    /// Marker in the source bucket name that designates an input bucket
    #[serde(default = "default_source_marker")]
    pub source_marker: String,
    /// Replacement for the source marker that yields the staging bucket
    #[serde(default = "default_stage_marker")]
    pub stage_marker: String,
    /// Time reserved before the invocation deadline to run cleanup
    #[serde(default = "default_deadline_margin_secs")]
    pub deadline_margin_secs: u64,
}

/// External decoder configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DecoderConfig {
    /// Decoder executable, resolved through PATH when not absolute
    #[serde(default = "default_decoder_path")]
    pub path: PathBuf,
    /// Arguments placed before the sampling parameters (e.g. "-hide_banner")
    #[serde(default)]
    pub extra_args: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "video-processor".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_upload_concurrency() -> usize {
    4
}

fn default_scratch_root() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_video_extensions() -> Vec<String> {
    vec!["mp4".to_string()]
}

fn default_source_marker() -> String {
    "-input".to_string()
}

fn default_stage_marker() -> String {
    "-stage-1".to_string()
}

fn default_deadline_margin_secs() -> u64 {
    5
}

fn default_decoder_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/video-processor").required(false))
            .add_source(config::File::with_name("/etc/video-processor/config").required(false))
            // Override with environment variables
            // VIDEO_PROCESSOR__S3__REGION -> s3.region
            .add_source(
                config::Environment::with_prefix("VIDEO_PROCESSOR")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("processing.video_extensions")
                    .with_list_parse_key("decoder.extra_args")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.video_extensions.is_empty() {
            return Err(ConfigError::MissingRequired(
                "processing.video_extensions".to_string(),
            ));
        }

        if self.s3.upload_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "s3.upload_concurrency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.processing.source_marker.is_empty() {
            return Err(ConfigError::MissingRequired(
                "processing.source_marker".to_string(),
            ));
        }

        // Writing frames back into the input bucket would retrigger the pipeline
        if self.processing.source_marker == self.processing.stage_marker {
            return Err(ConfigError::InvalidValue {
                key: "processing.stage_marker".to_string(),
                message: "must differ from processing.source_marker".to_string(),
            });
        }

        if self.decoder.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired("decoder.path".to_string()));
        }

        Ok(())
    }

    /// Get the deadline margin as Duration
    pub fn deadline_margin(&self) -> Duration {
        Duration::from_secs(self.processing.deadline_margin_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: None,
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            upload_concurrency: default_upload_concurrency(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            scratch_root: default_scratch_root(),
            video_extensions: default_video_extensions(),
            source_marker: default_source_marker(),
            stage_marker: default_stage_marker(),
            deadline_margin_secs: default_deadline_margin_secs(),
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            path: default_decoder_path(),
            extra_args: Vec::new(),
        }
    }
}

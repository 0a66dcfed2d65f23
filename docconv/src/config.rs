//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `DOCCONV_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `DOCCONV_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `DOCCONV_LIBREOFFICE__TIMEOUT=5m` sets the `libreoffice.timeout` field.
//!
//! ## Example
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 8000
//! enable_metrics: true
//! storage:
//!   scratch_dir: /var/tmp/docconv
//! limits:
//!   max_upload_size: 52428800
//! libreoffice:
//!   binary: soffice
//!   default_target_format: pdf
//!   timeout: 3m
//!   isolated_profile: true
//! pdf2docx:
//!   binary: /opt/venv/bin/pdf2docx
//!   timeout: 2m
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::convert::office::TargetFormat;
use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "DOCCONV_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    /// Where per-request scratch workspaces are created
    pub storage: StorageConfig,
    /// Upload limits
    pub limits: LimitsConfig,
    /// Headless office-suite conversion
    pub libreoffice: LibreOfficeConfig,
    /// PDF to DOCX conversion
    pub pdf2docx: Pdf2DocxConfig,
    /// Cross-origin settings
    pub cors: CorsConfig,
}

/// Scratch storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory under which each request gets its own uniquely named workspace.
    /// Created on startup if missing. Default: the system temp directory.
    pub scratch_dir: PathBuf,
    /// Leave workspaces on disk after the request completes (debugging only)
    pub keep_files: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir(),
            keep_files: false,
        }
    }
}

/// Upload limits configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum accepted upload size in bytes. Default: 100MB
    pub max_upload_size: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// LibreOffice invocation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibreOfficeConfig {
    /// Binary name or path (`libreoffice`, `soffice`, ...)
    pub binary: String,
    /// Target format used when a request does not specify one
    pub default_target_format: String,
    /// Maximum time a single conversion may run before the process is killed
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Give every conversion its own LibreOffice user profile inside the request workspace.
    /// Needed when several conversions may run at once.
    pub isolated_profile: bool,
}

impl Default for LibreOfficeConfig {
    fn default() -> Self {
        Self {
            binary: "libreoffice".to_string(),
            default_target_format: "pdf".to_string(),
            timeout: Duration::from_secs(120),
            isolated_profile: false,
        }
    }
}

/// pdf2docx invocation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Pdf2DocxConfig {
    /// Binary name or path of the pdf2docx command-line tool
    pub binary: String,
    /// Maximum time a single conversion may run before the process is killed
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for Pdf2DocxConfig {
    fn default() -> Self {
        Self {
            binary: "pdf2docx".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Origins allowed to call the API. Empty means no CORS headers are sent.
    pub allowed_origins: Vec<CorsOrigin>,
    /// Max age for preflight cache, in seconds
    pub max_age: Option<u64>,
}

/// A single allowed CORS origin.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_metrics: false,
            enable_otel_export: false,
            storage: StorageConfig::default(),
            limits: LimitsConfig::default(),
            libreoffice: LibreOfficeConfig::default(),
            pdf2docx: Pdf2DocxConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.limits.max_upload_size == 0 {
            return Err(invalid("limits.max_upload_size must be greater than 0"));
        }

        if self.libreoffice.binary.trim().is_empty() {
            return Err(invalid("libreoffice.binary cannot be empty"));
        }

        if self.pdf2docx.binary.trim().is_empty() {
            return Err(invalid("pdf2docx.binary cannot be empty"));
        }

        if self.libreoffice.timeout.is_zero() {
            return Err(invalid("libreoffice.timeout must be greater than 0"));
        }

        if self.pdf2docx.timeout.is_zero() {
            return Err(invalid("pdf2docx.timeout must be greater than 0"));
        }

        TargetFormat::parse(&self.libreoffice.default_target_format).map_err(|e| {
            invalid(&format!(
                "libreoffice.default_target_format ({:?}) is invalid: {}",
                self.libreoffice.default_target_format, e
            ))
        })?;

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("DOCCONV_").split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn invalid(message: &str) -> Error {
    Error::Other(anyhow::anyhow!("Config validation: {message}"))
}

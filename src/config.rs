use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

use crate::error::DetectError;

const DEFAULT_PROXY_HOST: &str = "127.0.0.1";
const DEFAULT_PROXY_PORT: u16 = 5050;
const DEFAULT_PORT_RETRIES: u16 = 20;
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://localhost:5175";
const DEFAULT_DEPLOY_PATTERN: &str = r"^https://.*\.vercel\.app$";
const DEFAULT_UPSTREAM_BASE: &str = "https://detect.roboflow.com";
const DEFAULT_MODEL_VERSION: &str = "3";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const DEFAULT_SCAN_HOST: &str = "localhost";
const DEFAULT_FALLBACK_BASE: &str = "http://localhost:5050";
const SCAN_PORT_FIRST: u16 = 5050;
const SCAN_PORT_LAST: u16 = 5060;
const PROBE_TIMEOUT_SECS: u64 = 3;
const CLIENT_REQUEST_TIMEOUT_SECS: u64 = 35;

#[derive(Debug, Deserialize, Default)]
struct ProxyConfigFile {
    host: Option<String>,
    port: Option<u16>,
    port_retries: Option<u16>,
    max_upload_bytes: Option<usize>,
    cors: Option<CorsConfigFile>,
    upstream: Option<UpstreamConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CorsConfigFile {
    origins: Option<Vec<String>>,
    allow_all_https: Option<bool>,
    deploy_pattern: Option<String>,
}

#[derive(Deserialize, Default)]
struct UpstreamConfigFile {
    base_url: Option<String>,
    model: Option<String>,
    default_version: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

impl std::fmt::Debug for UpstreamConfigFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfigFile")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("default_version", &self.default_version)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Settings for the `detect_proxy` binary.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    /// Preferred port; on `AddrInUse` the next `port_retries` ports are tried.
    pub port: u16,
    pub port_retries: u16,
    pub max_upload_bytes: usize,
    pub cors: CorsSettings,
    pub upstream: UpstreamSettings,
}

#[derive(Debug, Clone)]
pub struct CorsSettings {
    pub origins: Vec<String>,
    pub allow_all_https: bool,
    pub deploy_pattern: String,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            origins: split_csv(DEFAULT_CORS_ORIGINS),
            allow_all_https: false,
            deploy_pattern: DEFAULT_DEPLOY_PATTERN.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct UpstreamSettings {
    pub base_url: String,
    pub model: String,
    pub default_version: String,
    /// Never logged; `Debug` redacts it.
    pub api_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for UpstreamSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("default_version", &self.default_version)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProxyConfig {
    /// JSON file at `DETECT_PROXY_CONFIG` (optional), then env overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DETECT_PROXY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ProxyConfigFile) -> Self {
        let cors_file = file.cors.unwrap_or_default();
        let defaults = CorsSettings::default();
        let cors = CorsSettings {
            origins: cors_file.origins.unwrap_or(defaults.origins),
            allow_all_https: cors_file.allow_all_https.unwrap_or(defaults.allow_all_https),
            deploy_pattern: cors_file.deploy_pattern.unwrap_or(defaults.deploy_pattern),
        };
        let upstream_file = file.upstream.unwrap_or_default();
        let upstream = UpstreamSettings {
            base_url: upstream_file
                .base_url
                .unwrap_or_else(|| DEFAULT_UPSTREAM_BASE.to_string()),
            model: upstream_file.model.unwrap_or_default(),
            default_version: upstream_file
                .default_version
                .unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string()),
            api_key: upstream_file.api_key.unwrap_or_default(),
            timeout: Duration::from_secs(
                upstream_file
                    .timeout_secs
                    .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            ),
        };
        Self {
            host: file.host.unwrap_or_else(|| DEFAULT_PROXY_HOST.to_string()),
            port: file.port.unwrap_or(DEFAULT_PROXY_PORT),
            port_retries: file.port_retries.unwrap_or(DEFAULT_PORT_RETRIES),
            max_upload_bytes: file.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            cors,
            upstream,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(host) = env_non_empty("PROXY_HOST") {
            self.host = host;
        }
        if let Some(port) = env_non_empty("PROXY_PORT") {
            self.port = port
                .parse()
                .map_err(|_| anyhow!("PROXY_PORT must be a port number"))?;
        }
        if let Some(retries) = env_non_empty("PROXY_PORT_RETRIES") {
            self.port_retries = retries
                .parse()
                .map_err(|_| anyhow!("PROXY_PORT_RETRIES must be a non-negative integer"))?;
        }
        if let Some(origins) = env_non_empty("CORS_ORIGINS") {
            self.cors.origins = split_csv(&origins);
        }
        if let Ok(flag) = std::env::var("CORS_ALLOW_ALL") {
            self.cors.allow_all_https = flag.trim() == "true";
        }
        if let Some(pattern) = env_non_empty("CORS_DEPLOY_PATTERN") {
            self.cors.deploy_pattern = pattern;
        }
        if let Some(base) = env_non_empty("INFERENCE_UPSTREAM") {
            self.upstream.base_url = base;
        }
        if let Some(model) = env_non_empty("INFERENCE_MODEL") {
            self.upstream.model = model;
        }
        if let Some(version) = env_non_empty("INFERENCE_MODEL_VERSION") {
            self.upstream.default_version = version;
        }
        if let Some(key) = env_non_empty("INFERENCE_API_KEY") {
            self.upstream.api_key = key;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.upstream.base_url = self.upstream.base_url.trim().trim_end_matches('/').to_string();
        validate_http_base(&self.upstream.base_url)
            .map_err(DetectError::UpstreamConfiguration)?;

        self.upstream.model = self.upstream.model.trim().to_string();
        if self.upstream.model.is_empty() {
            return Err(DetectError::UpstreamConfiguration(
                "INFERENCE_MODEL is required (model name on the inference provider)".to_string(),
            )
            .into());
        }
        if self.upstream.api_key.trim().is_empty() {
            return Err(DetectError::UpstreamConfiguration(
                "INFERENCE_API_KEY is required".to_string(),
            )
            .into());
        }
        if self.upstream.default_version.trim().is_empty() {
            self.upstream.default_version = DEFAULT_MODEL_VERSION.to_string();
        }
        if self.upstream.timeout.is_zero() {
            return Err(anyhow!("upstream timeout must be greater than zero"));
        }
        if self.port_retries > 1000 {
            return Err(anyhow!("port_retries must be at most 1000"));
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be greater than zero"));
        }
        Ok(())
    }
}

/// Settings for `InferenceClient`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay base tried before the local port scan.
    pub api_base: Option<String>,
    pub scan_host: String,
    pub scan_ports: RangeInclusive<u16>,
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
    /// Used (and cached) when no relay answers its health check.
    pub fallback_base: String,
    /// Forwarded as `?version=` when set.
    pub model_version: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            scan_host: DEFAULT_SCAN_HOST.to_string(),
            scan_ports: SCAN_PORT_FIRST..=SCAN_PORT_LAST,
            probe_timeout: Duration::from_secs(PROBE_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(CLIENT_REQUEST_TIMEOUT_SECS),
            fallback_base: DEFAULT_FALLBACK_BASE.to_string(),
            model_version: None,
        }
    }
}

impl ClientConfig {
    /// Defaults plus `DETECT_API_BASE`, `DETECT_SCAN_HOST` and `DETECT_MODEL_VERSION`.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(base) = env_non_empty("DETECT_API_BASE") {
            cfg = cfg.with_api_base(&base)?;
        }
        if let Some(host) = env_non_empty("DETECT_SCAN_HOST") {
            cfg.scan_host = host;
        }
        if let Some(version) = env_non_empty("DETECT_MODEL_VERSION") {
            cfg.model_version = Some(version);
        }
        Ok(cfg)
    }

    pub fn with_api_base(mut self, base: &str) -> Result<Self> {
        validate_http_base(base).map_err(|reason| anyhow!("invalid relay base: {reason}"))?;
        self.api_base = Some(base.trim().to_string());
        Ok(self)
    }
}

fn validate_http_base(base: &str) -> std::result::Result<(), String> {
    let parsed = url::Url::parse(base.trim()).map_err(|e| format!("{base}: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(format!("{base}: unsupported scheme {other}")),
    }
    if parsed.host_str().is_none() {
        return Err(format!("{base}: missing host"));
    }
    Ok(())
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<ProxyConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

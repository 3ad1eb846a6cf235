use anyhow::{Context, Result};
use regex::Regex;

use crate::config::CorsSettings;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorsDecision {
    /// No `Origin` header: curl, scripts, the CLI client.
    NoOrigin,
    Allowed(String),
    Blocked(String),
}

/// Origin allow-list for browser callers.
#[derive(Clone, Debug)]
pub struct CorsPolicy {
    origins: Vec<String>,
    localhost: Regex,
    deploy: Regex,
    allow_all_https: bool,
}

impl CorsPolicy {
    pub fn new(settings: &CorsSettings) -> Result<Self> {
        let deploy = Regex::new(&settings.deploy_pattern)
            .with_context(|| format!("invalid CORS deploy pattern {}", settings.deploy_pattern))?;
        Ok(Self {
            origins: settings.origins.clone(),
            localhost: Regex::new(r"^http://localhost:\d+$")?,
            deploy,
            allow_all_https: settings.allow_all_https,
        })
    }

    pub fn check(&self, origin: Option<&str>) -> CorsDecision {
        let Some(origin) = origin else {
            return CorsDecision::NoOrigin;
        };
        if self.origins.iter().any(|allowed| allowed == origin) {
            return CorsDecision::Allowed(origin.to_string());
        }
        if self.localhost.is_match(origin) {
            log::debug!("CORS: allowing localhost origin {}", origin);
            return CorsDecision::Allowed(origin.to_string());
        }
        if self.deploy.is_match(origin) {
            log::debug!("CORS: allowing deployment origin {}", origin);
            return CorsDecision::Allowed(origin.to_string());
        }
        if self.allow_all_https && origin.starts_with("https://") {
            log::debug!("CORS: allowing https origin {}", origin);
            return CorsDecision::Allowed(origin.to_string());
        }
        log::warn!(
            "CORS: blocked origin {} (allowed: {})",
            origin,
            self.origins.join(", ")
        );
        CorsDecision::Blocked(origin.to_string())
    }

    pub fn origins(&self) -> &[String] {
        &self.origins
    }
}

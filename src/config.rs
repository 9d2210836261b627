//! Configuration management for audit sessions

use crate::error::{AuditError, Result};
use crate::models::SessionConfig;
use serde::Deserialize;
use std::path::Path;

/// File-based configuration structure
#[derive(Debug, Deserialize)]
struct FileConfig {
    scan: Option<ScanSection>,
    audit: Option<AuditSection>,
    timing: Option<TimingSection>,
}

#[derive(Debug, Deserialize)]
struct ScanSection {
    timeout_secs: Option<u64>,
    user_agent: Option<String>,
    follow_redirects: Option<bool>,
    rate_limit: Option<u32>,
    max_pages: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct AuditSection {
    links: Option<bool>,
    forms: Option<bool>,
    cookies: Option<bool>,
    headers: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TimingSection {
    timeout_ms: Option<u64>,
    divider: Option<u64>,
}

/// Loads configuration from a TOML file and merges with defaults
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    let content = std::fs::read_to_string(path).map_err(AuditError::IoError)?;
    parse_config(&content)
}

/// Parses TOML configuration text and merges it over the defaults
pub fn parse_config(content: &str) -> Result<SessionConfig> {
    let file_config: FileConfig = toml::from_str(content)?;
    let mut config = SessionConfig::default();

    if let Some(scan) = file_config.scan {
        if let Some(timeout) = scan.timeout_secs {
            if timeout == 0 {
                return Err(AuditError::ConfigError(
                    "scan.timeout_secs must be greater than zero".to_string(),
                ));
            }
            config.timeout_secs = timeout;
        }
        if let Some(ua) = scan.user_agent {
            config.user_agent = ua;
        }
        if let Some(follow) = scan.follow_redirects {
            config.follow_redirects = follow;
        }
        if let Some(rate) = scan.rate_limit {
            config.rate_limit = Some(rate);
        }
        if let Some(max_pages) = scan.max_pages {
            config.max_pages = max_pages;
        }
    }

    if let Some(audit) = file_config.audit {
        if let Some(links) = audit.links {
            config.audit.links = links;
        }
        if let Some(forms) = audit.forms {
            config.audit.forms = forms;
        }
        if let Some(cookies) = audit.cookies {
            config.audit.cookies = cookies;
        }
        if let Some(headers) = audit.headers {
            config.audit.headers = headers;
        }
    }

    if let Some(timing) = file_config.timing {
        if let Some(timeout) = timing.timeout_ms {
            config.timing.timeout_ms = timeout;
        }
        if let Some(divider) = timing.divider {
            if divider == 0 {
                return Err(AuditError::ConfigError(
                    "timing.divider must be greater than zero".to_string(),
                ));
            }
            config.timing.divider = divider;
        }
    }

    Ok(config)
}

/// Merges CLI arguments into an existing SessionConfig
pub fn merge_cli_args(
    config: &mut SessionConfig,
    target: String,
    timeout: Option<u64>,
    rate_limit: Option<u32>,
    headers: Option<Vec<String>>,
) -> Result<()> {
    config.target = target;

    if let Some(t) = timeout {
        if t == 0 {
            return Err(AuditError::ConfigError(
                "--timeout must be greater than zero".to_string(),
            ));
        }
        config.timeout_secs = t;
    }
    if let Some(r) = rate_limit {
        config.rate_limit = Some(r);
    }
    if let Some(h) = headers {
        for header in h {
            if let Some((key, value)) = header.split_once(':') {
                config
                    .headers
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }
    Ok(())
}

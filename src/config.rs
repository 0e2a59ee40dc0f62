//! Configuration loader — merges env vars, .env file, and config.toml.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use common::{Error, Result, ServiceConfig};

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn validate_config(config: &ServiceConfig) -> Result<()> {
    let mut issues: Vec<String> = Vec::new();

    if config.redis_url.trim().is_empty() {
        issues.push("redis_url must not be empty".into());
    }
    if config.coordinator_url.trim().is_empty() {
        issues.push("coordinator_url must not be empty".into());
    }
    if config.http_timeout_secs == 0 {
        issues.push("http_timeout_secs must be > 0".into());
    }
    if config.coordinator_timeout_secs == 0 {
        issues.push("coordinator_timeout_secs must be > 0".into());
    }
    if config.user_agent.trim().is_empty() {
        issues.push("user_agent must not be empty".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load service configuration from environment and optional config file.
pub fn load_config() -> Result<ServiceConfig> {
    // 1. Load .env file from the working directory or its parents.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = ServiceConfig::default();

    // 3. Try loading config.toml if it exists.
    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // 4. Override with environment variables (highest priority).
    if let Ok(url) = std::env::var("SWX_REDIS_URL") {
        config.redis_url = url;
    }
    if let Ok(url) = std::env::var("SWX_COORDINATOR_URL") {
        config.coordinator_url = url;
    }
    if let Ok(raw) = std::env::var("SWX_HTTP_TIMEOUT_SECS") {
        config.http_timeout_secs = parse_positive_u64(&raw, "SWX_HTTP_TIMEOUT_SECS")?;
    }
    if let Ok(raw) = std::env::var("SWX_COORDINATOR_TIMEOUT_SECS") {
        config.coordinator_timeout_secs = parse_positive_u64(&raw, "SWX_COORDINATOR_TIMEOUT_SECS")?;
    }
    if let Ok(agent) = std::env::var("SWX_USER_AGENT") {
        config.user_agent = agent;
    }

    validate_config(&config)?;

    Ok(config)
}

/// Parses a CLI timestamp: RFC 3339, `Y-m-d H:M:S`, `Y-m-dTH:M:S`, or a
/// bare date (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(t.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return Ok(t.and_utc());
        }
    }
    Err(Error::Config(format!("cannot parse timestamp: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_timestamp_shapes() {
        assert!(parse_timestamp("2023-04-01T00:00:00Z").is_ok());
        assert!(parse_timestamp("2023-04-01T00:00:00").is_ok());
        assert!(parse_timestamp("2023-04-01 12:30:00").is_ok());
        assert!(parse_timestamp("2023-04-01").is_ok());
        assert!(parse_timestamp("next tuesday").is_err());
    }

    #[test]
    fn bare_dates_mean_midnight_utc() {
        let t = parse_timestamp("2023-04-01").expect("parsed");
        assert_eq!(t.to_rfc3339(), "2023-04-01T00:00:00+00:00");
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let config = ServiceConfig {
            http_timeout_secs: 0,
            ..ServiceConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn defaults_validate() {
        assert!(validate_config(&ServiceConfig::default()).is_ok());
    }
}

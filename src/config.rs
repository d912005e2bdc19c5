use config::ConfigError;
use secrecy::Secret;
use serde::{de::DeserializeOwned, Deserialize};

use crate::services::access_codes::CodeUsePolicy;

const DEFAULT_ACCESS_CODE_TTL_SECONDS: i64 = 300;
const DEFAULT_ACCESS_CODE_RETENTION_HOURS: i64 = 24;
const DEFAULT_MAINTENANCE_SCHEDULE: &str = "0 */5 * * * *";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub base_url: String,
    pub host: String,
    pub port: u16,

    // Attendance access codes
    pub access_code_ttl_seconds: i64,
    pub access_code_single_use: bool,
    pub access_code_retention_hours: i64,
    pub qr_signing_key: Secret<String>,

    // HTTP
    pub cors_allowed_origins: Vec<String>,
    pub cookie_secure: bool,

    // Background jobs
    pub maintenance_schedule: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        let access_code_ttl_seconds =
            get_or(&config, "access_code_ttl_seconds", DEFAULT_ACCESS_CODE_TTL_SECONDS)?;
        if access_code_ttl_seconds <= 0 {
            return Err(ConfigError::Message(
                "ACCESS_CODE_TTL_SECONDS must be positive".to_string(),
            ));
        }

        Ok(Self {
            database_url: config.get("database_url")?,
            base_url: config.get("base_url")?,
            host: get_or(&config, "host", "127.0.0.1".to_string())?,
            port: config.get("port")?,

            access_code_ttl_seconds,
            access_code_single_use: get_or(&config, "access_code_single_use", true)?,
            access_code_retention_hours: get_or(
                &config,
                "access_code_retention_hours",
                DEFAULT_ACCESS_CODE_RETENTION_HOURS,
            )?,
            qr_signing_key: Secret::new(config.get("qr_signing_key")?),

            cors_allowed_origins: parse_origin_list(&get_or(
                &config,
                "cors_allowed_origins",
                String::new(),
            )?),
            cookie_secure: get_or(&config, "cookie_secure", true)?,

            maintenance_schedule: get_or(
                &config,
                "maintenance_schedule",
                DEFAULT_MAINTENANCE_SCHEDULE.to_string(),
            )?,
        })
    }

    pub fn access_code_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_code_ttl_seconds)
    }

    pub fn code_use_policy(&self) -> CodeUsePolicy {
        if self.access_code_single_use {
            CodeUsePolicy::SingleUse
        } else {
            CodeUsePolicy::ReusableUntilExpiry
        }
    }
}

/// Reads an optional key. Only a missing key falls back to the default;
/// a present but malformed value is an error.
fn get_or<T: DeserializeOwned>(
    config: &config::Config,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match config.get::<T>(key) {
        Ok(value) => Ok(value),
        Err(ConfigError::NotFound(_)) => Ok(default),
        Err(e) => Err(e),
    }
}

/// Splits a comma separated origin list, dropping blanks and trailing slashes.
fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origin_list() {
        let origins = parse_origin_list(" http://localhost:3000/ ,, https://app.gymble.in");
        assert_eq!(
            origins,
            vec![
                "http://localhost:3000".to_string(),
                "https://app.gymble.in".to_string()
            ]
        );
    }

    fn source(key: &str, value: &str) -> config::Config {
        config::Config::builder()
            .set_override(key, value)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_missing_key_uses_default() {
        let config = source("port", "8080");
        assert_eq!(
            get_or(&config, "access_code_ttl_seconds", DEFAULT_ACCESS_CODE_TTL_SECONDS).unwrap(),
            DEFAULT_ACCESS_CODE_TTL_SECONDS
        );
        assert!(get_or(&config, "access_code_single_use", true).unwrap());
    }

    #[test]
    fn test_present_key_is_parsed() {
        let config = source("access_code_ttl_seconds", "120");
        assert_eq!(get_or(&config, "access_code_ttl_seconds", 300i64).unwrap(), 120);

        let config = source("access_code_single_use", "false");
        assert!(!get_or(&config, "access_code_single_use", true).unwrap());
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        let config = source("access_code_ttl_seconds", "abc");
        assert!(get_or(&config, "access_code_ttl_seconds", 300i64).is_err());

        let config = source("access_code_single_use", "maybe");
        assert!(get_or(&config, "access_code_single_use", true).is_err());
    }

    #[test]
    fn test_parse_empty_origin_list() {
        assert!(parse_origin_list("").is_empty());
        assert!(parse_origin_list(" , ").is_empty());
    }
}

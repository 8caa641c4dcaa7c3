use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// How long a top-up may wait for payment before it is auto-cancelled.
    pub topup_expiry: Duration,
    pub scheduler_interval: Duration,
    /// Live USD/IDR source. The fallback rate is used when unset or unreachable.
    pub exchange_rate_api_url: Option<String>,
    pub fallback_usd_idr_rate: f64,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Outgoing email goes to the log only when unset.
    pub mail_webhook_url: Option<String>,
    pub admin_email: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let expiry_hours: u64 = parse_or(&env_map, "TOPUP_EXPIRY_HOURS", 24, "must be a whole number of hours")?;
        if expiry_hours == 0 {
            return Err(ConfigError::InvalidValue(
                "TOPUP_EXPIRY_HOURS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let interval_secs: u64 = parse_or(
            &env_map,
            "SCHEDULER_INTERVAL_SECS",
            3600,
            "must be a whole number of seconds",
        )?;
        if interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "SCHEDULER_INTERVAL_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let fallback_usd_idr_rate: f64 =
            parse_or(&env_map, "FALLBACK_USD_IDR_RATE", 15_500.0, "must be a number")?;
        if !fallback_usd_idr_rate.is_finite() || fallback_usd_idr_rate <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "FALLBACK_USD_IDR_RATE".to_string(),
                format!("must be positive, got {}", fallback_usd_idr_rate),
            ));
        }

        let max_upload_bytes = parse_or(
            &env_map,
            "MAX_UPLOAD_BYTES",
            10 * 1024 * 1024usize,
            "must be a byte count",
        )?;

        let admin_email = non_empty(&env_map, "ADMIN_EMAIL");
        if let Some(email) = &admin_email {
            if !email.contains('@') {
                return Err(ConfigError::InvalidValue(
                    "ADMIN_EMAIL".to_string(),
                    format!("not an email address: {}", email),
                ));
            }
        }

        Ok(Config {
            port,
            database_path,
            topup_expiry: Duration::from_secs(expiry_hours * 3600),
            scheduler_interval: Duration::from_secs(interval_secs),
            exchange_rate_api_url: non_empty(&env_map, "EXCHANGE_RATE_API_URL"),
            fallback_usd_idr_rate,
            upload_dir: env_map
                .get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./uploads")),
            max_upload_bytes,
            mail_webhook_url: non_empty(&env_map, "MAIL_WEBHOOK_URL"),
            admin_email,
        })
    }
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    expectation: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), expectation.to_string())),
    }
}

fn non_empty(env_map: &HashMap<String, String>, key: &str) -> Option<String> {
    env_map
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.topup_expiry, Duration::from_secs(24 * 3600));
        assert_eq!(config.scheduler_interval, Duration::from_secs(3600));
        assert_eq!(config.fallback_usd_idr_rate, 15_500.0);
        assert_eq!(config.max_upload_bytes, 10_485_760);
        assert_eq!(config.upload_dir, PathBuf::from("./uploads"));
        assert!(config.exchange_rate_api_url.is_none());
        assert!(config.mail_webhook_url.is_none());
        assert!(config.admin_email.is_none());
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_expiry_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("TOPUP_EXPIRY_HOURS".to_string(), "0".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "TOPUP_EXPIRY_HOURS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_fallback_rate() {
        let mut env_map = setup_required_env();
        env_map.insert("FALLBACK_USD_IDR_RATE".to_string(), "-3".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "FALLBACK_USD_IDR_RATE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_blank_optional_values_are_unset() {
        let mut env_map = setup_required_env();
        env_map.insert("MAIL_WEBHOOK_URL".to_string(), "  ".to_string());
        env_map.insert("ADMIN_EMAIL".to_string(), "ops@example.com".to_string());
        env_map.insert("TOPUP_EXPIRY_HOURS".to_string(), "2".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert!(config.mail_webhook_url.is_none());
        assert_eq!(config.admin_email.as_deref(), Some("ops@example.com"));
        assert_eq!(config.topup_expiry, Duration::from_secs(7200));
    }
}

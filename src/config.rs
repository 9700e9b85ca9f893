use secrecy::Secret;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub base_url: String,
    pub host: String,
    pub port: u16,

    // Uploaded media, served under /uploads
    pub upload_dir: PathBuf,

    // Optional dashboard account created at startup
    pub admin_username: Option<String>,
    pub admin_password: Option<Secret<String>>,

    // QR check-in
    pub checkin_token_ttl_hours: i64,
    pub token_retention_days: i64,
    pub sync_poll_interval_ms: u64,
    // IANA zone the congregation meets in; arrival times are read in it
    pub timezone: String,

    // Security
    pub session_secret: Secret<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Self {
            database_url: config.get("database_url")?,
            base_url: config.get("base_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            upload_dir: config
                .get::<String>("upload_dir")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public").join("uploads")),

            admin_username: config.get("admin_username").ok(),
            admin_password: config
                .get::<String>("admin_password")
                .ok()
                .map(Secret::new),

            checkin_token_ttl_hours: config.get("checkin_token_ttl_hours").unwrap_or(24),
            token_retention_days: config.get("token_retention_days").unwrap_or(90),
            sync_poll_interval_ms: config.get("sync_poll_interval_ms").unwrap_or(2000),
            timezone: config.get("timezone").unwrap_or_else(|_| "UTC".to_string()),

            session_secret: Secret::new(config.get("session_secret")?),
        }
        .validate()
    }

    /// Rejects settings that would break the check-in flow at runtime.
    pub fn validate(self) -> Result<Self, config::ConfigError> {
        if self.sync_poll_interval_ms == 0 {
            return Err(config::ConfigError::Message(
                "SYNC_POLL_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        if self.checkin_token_ttl_hours <= 0 {
            return Err(config::ConfigError::Message(
                "CHECKIN_TOKEN_TTL_HOURS must be greater than zero".to_string(),
            ));
        }
        if self.token_retention_days <= 0 {
            return Err(config::ConfigError::Message(
                "TOKEN_RETENTION_DAYS must be greater than zero".to_string(),
            ));
        }

        if self.timezone.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "TIMEZONE must name a time zone such as Africa/Accra".to_string(),
            ));
        }
        Ok(self)
    }

    /// Public base URL without a trailing slash.
    pub fn public_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            database_url: "postgres://localhost/chapel".to_string(),
            base_url: "http://localhost:3000".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            upload_dir: PathBuf::from("public/uploads"),
            admin_username: None,
            admin_password: None,
            checkin_token_ttl_hours: 24,
            token_retention_days: 90,
            sync_poll_interval_ms: 2000,
            timezone: "Africa/Accra".to_string(),
            session_secret: Secret::new("s".repeat(32)),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = config();
        config.sync_poll_interval_ms = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SYNC_POLL_INTERVAL_MS"));
    }

    #[test]
    fn test_non_positive_token_windows_rejected() {
        let mut ttl = config();
        ttl.checkin_token_ttl_hours = 0;
        assert!(ttl.validate().is_err());

        let mut retention = config();
        retention.token_retention_days = -1;
        assert!(retention.validate().is_err());
    }

    #[test]
    fn test_blank_timezone_rejected() {
        let mut config = config();
        config.timezone = " ".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("TIMEZONE"));
    }

    #[test]
    fn test_public_base_url_trims_slash() {
        let mut config = config();
        config.base_url = "https://chapel.example.org/".to_string();

        assert_eq!(config.public_base_url(), "https://chapel.example.org");
    }
}

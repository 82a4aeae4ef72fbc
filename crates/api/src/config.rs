//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    /// Base URL of the client application; providers redirect here after
    /// checkout
    pub app_base_url: String,
    pub allowed_origins: Vec<String>,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    /// Identities allowed to read other users' invoices and cancel any
    /// subscription, lowercase emails
    pub admin_emails: Vec<String>,

    // Providers (each optional; unconfigured providers reject requests)
    pub stripe_secret_key: Option<String>,
    pub paypal_client_id: Option<String>,
    pub paypal_client_secret: Option<String>,
    pub paypal_env: Option<String>,
    pub paystack_secret_key: Option<String>,
    pub paystack_currency: String,
    pub paystack_usd_to_ngn: Option<f64>,

    // FX
    pub fx_rate_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            jwt_expiry_hours: env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),
            admin_emails: env::var("ADMIN_EMAILS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),

            // Providers
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").ok().filter(|s| !s.is_empty()),
            paypal_client_id: env::var("PAYPAL_CLIENT_ID").ok().filter(|s| !s.is_empty()),
            paypal_client_secret: env::var("PAYPAL_CLIENT_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            paypal_env: env::var("PAYPAL_ENV").ok().filter(|s| !s.is_empty()),
            paystack_secret_key: env::var("PAYSTACK_SECRET_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            paystack_currency: env::var("PAYSTACK_CURRENCY")
                .unwrap_or_else(|_| "NGN".to_string()),
            paystack_usd_to_ngn: env::var("PAYSTACK_USD_TO_NGN")
                .ok()
                .and_then(|s| s.parse().ok()),

            // FX
            fx_rate_url: env::var("FX_RATE_URL")
                .unwrap_or_else(|_| payflow_billing::fx::DEFAULT_RATE_URL.to_string()),
        })
    }

    /// True when the identity is on the admin allow-list
    pub fn is_admin(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.admin_emails.iter().any(|a| a == &email)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Config tests run serially (they modify shared env vars)
    static CONFIG_TEST_MUTEX: Mutex<()> = Mutex::new(());

    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
    }

    fn cleanup_config() {
        env::remove_var("DATABASE_URL");
        env::remove_var("JWT_SECRET");
        env::remove_var("ADMIN_EMAILS");
    }

    #[test]
    fn test_config_validation() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();

        // Missing DATABASE_URL fails
        cleanup_config();
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));

        // Short JWT secret rejected
        setup_minimal_config();
        env::set_var("JWT_SECRET", "too-short");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::WeakSecret(_))
        ));

        // Valid minimal config accepted, with defaults
        setup_minimal_config();
        let config = Config::from_env().unwrap();
        assert_eq!(config.paystack_currency, "NGN");
        assert!(config.stripe_secret_key.is_none());
        assert!(config.admin_emails.is_empty());

        // Admin allow-list is normalized and case-insensitive
        env::set_var("ADMIN_EMAILS", "Admin@Example.com, ops@example.com");
        let config = Config::from_env().unwrap();
        assert!(config.is_admin("admin@example.com"));
        assert!(config.is_admin("ADMIN@EXAMPLE.COM"));
        assert!(!config.is_admin("user@example.com"));

        cleanup_config();
    }
}

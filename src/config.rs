use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub base_url: String,
    pub host: String,
    pub port: u16,

    // Branding used by page chrome and emails
    pub site_name: String,
    pub organisation: String,
    pub no_reply_email: String,
    pub support_email: String,

    // Business rules
    pub gst_percentage: i64,
    pub voucher_expiry_days: i64,
    pub expiry_notice_days: i64,
    pub login_token_ttl_minutes: i64,
    pub default_sold_via: String,
    pub retailer_document_root: String,

    // Per client address, on the public voucher check
    pub voucher_validations_per_minute: u32,

    // Outbound email relay (log-only when unset)
    pub email_relay_url: Option<String>,
    pub email_relay_token: Option<Secret<String>>,

    // Security
    pub session_secret: Secret<String>,
    pub qr_encryption_key: Secret<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            database_url: config.get("database_url")?,
            base_url: config.get("base_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            site_name: config
                .get("site_name")
                .unwrap_or_else(|_| "Park Passes".to_string()),
            organisation: config.get("organisation").unwrap_or_else(|_| {
                "Department of Biodiversity, Conservation and Attractions".to_string()
            }),
            no_reply_email: config.get("no_reply_email")?,
            support_email: config
                .get("support_email")
                .unwrap_or_else(|_| config.get("no_reply_email").unwrap_or_default()),

            gst_percentage: config.get("gst_percentage").unwrap_or(10),
            voucher_expiry_days: config.get("voucher_expiry_days").unwrap_or(1095),
            expiry_notice_days: config.get("expiry_notice_days").unwrap_or(30),
            login_token_ttl_minutes: config.get("login_token_ttl_minutes").unwrap_or(30),
            default_sold_via: config
                .get("default_sold_via")
                .unwrap_or_else(|_| "DBCA Website".to_string()),
            retailer_document_root: config
                .get("retailer_document_root")
                .unwrap_or_else(|_| "private-media/retailers".to_string()),
            voucher_validations_per_minute: config
                .get("voucher_validations_per_minute")
                .unwrap_or(10),

            email_relay_url: config.get("email_relay_url").ok(),
            email_relay_token: config
                .get::<String>("email_relay_token")
                .ok()
                .map(Secret::new),

            session_secret: Secret::new(config.get("session_secret")?),
            qr_encryption_key: Secret::new(config.get("qr_encryption_key")?),
        })
    }

    /// Absolute URL for a path on this site
    pub fn absolute_url(&self, path: &str) -> String {
        match url::Url::parse(&self.base_url).and_then(|base| base.join(path)) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{}", self.base_url.trim_end_matches('/'), path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: &str) -> Config {
        Config {
            database_url: "postgres://localhost/parkpasses".to_string(),
            base_url: base_url.to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            site_name: "Park Passes".to_string(),
            organisation: "Parks and Wildlife Service".to_string(),
            no_reply_email: "no-reply@parks.example".to_string(),
            support_email: "help@parks.example".to_string(),
            gst_percentage: 10,
            voucher_expiry_days: 1095,
            expiry_notice_days: 30,
            login_token_ttl_minutes: 30,
            default_sold_via: "DBCA Website".to_string(),
            retailer_document_root: "private-media/retailers".to_string(),
            voucher_validations_per_minute: 10,
            email_relay_url: None,
            email_relay_token: None,
            session_secret: Secret::new("secret".to_string()),
            qr_encryption_key: Secret::new("key".to_string()),
        }
    }

    #[test]
    fn test_absolute_url() {
        let config = test_config("https://parkpasses.example");
        assert_eq!(
            config.absolute_url("/login/verify/"),
            "https://parkpasses.example/login/verify/"
        );

        let config = test_config("https://parkpasses.example/");
        assert_eq!(config.absolute_url("/external/"), "https://parkpasses.example/external/");
    }

    #[test]
    fn test_unparseable_base_url_is_joined_as_text() {
        let config = test_config("parkpasses.example/");
        assert_eq!(config.absolute_url("/help/"), "parkpasses.example/help/");
    }
}

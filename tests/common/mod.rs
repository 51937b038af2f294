use secrecy::Secret;

use parkpasses::config::Config;

pub fn config() -> Config {
    Config {
        database_url: "postgres://parkpasses@localhost/parkpasses_test".to_string(),
        base_url: "http://localhost:3000".to_string(),
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
        voucher_validations_per_minute: 3,
        email_relay_url: None,
        email_relay_token: None,
        session_secret: Secret::new("test-session-secret".to_string()),
        qr_encryption_key: Secret::new("test-qr-key".to_string()),
    }
}

use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use sqlx::PgPool;

use crate::models::login_token::LoginToken;
use crate::models::{EmailUser, RetailerGroup};
use crate::services::emails::EmailContext;
use crate::services::mailer::{MailError, Mailer};
use crate::services::signature::sha256_hex;

const TOKEN_BYTES: usize = 32;

#[derive(thiserror::Error, Debug)]
pub enum LoginError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("This login link is invalid or has expired")]
    InvalidToken,

    #[error("Could not generate a login token")]
    TokenGenerationFailed,

    #[error("Could not send the login email: {0}")]
    Mail(#[from] MailError),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

impl LoginError {
    pub fn is_user_error(&self) -> bool {
        matches!(self, LoginError::InvalidEmail | LoginError::InvalidToken)
    }
}

/// A freshly logged in user with what the session needs about them
#[derive(Debug, Clone)]
pub struct LoggedIn {
    pub user: EmailUser,
    pub retailer: Option<RetailerGroup>,
}

fn normalise_email(email: &str) -> Result<String, LoginError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(LoginError::InvalidEmail),
    }
}

/// 32 random bytes, hex encoded
pub fn generate_token() -> Result<String, LoginError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| LoginError::TokenGenerationFailed)?;
    Ok(hex::encode(bytes))
}

/// The link emailed to the user, `verify_url?token=...`
pub fn login_link(verify_url: &str, token: &str) -> String {
    match url::Url::parse(verify_url) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("token", token);
            url.to_string()
        }
        Err(_) => format!("{}?token={}", verify_url, token),
    }
}

/// Stores a single-use token for `email` and mails the login link
#[tracing::instrument(skip(pool, mailer, emails, verify_url))]
pub async fn send_login_link(
    pool: &PgPool,
    mailer: &Mailer,
    emails: &EmailContext,
    email: &str,
    verify_url: &str,
    ttl_minutes: i64,
    now: DateTime<Utc>,
) -> Result<(), LoginError> {
    let email = normalise_email(email)?;
    let token = generate_token()?;

    LoginToken::create(
        pool,
        &email,
        &sha256_hex(&token),
        now + Duration::minutes(ttl_minutes),
    )
    .await?;

    let message = emails.login_link(&email, &login_link(verify_url, &token), ttl_minutes)?;
    mailer.send(&message).await?;

    tracing::info!(email = %email, "Login link sent");
    Ok(())
}

/// Exchanges an emailed token for the user it was issued to
#[tracing::instrument(skip(pool, token))]
pub async fn redeem_token(
    pool: &PgPool,
    token: &str,
    now: DateTime<Utc>,
) -> Result<LoggedIn, LoginError> {
    let stored = LoginToken::find_by_hash(pool, &sha256_hex(token.trim()))
        .await?
        .filter(|t| t.is_usable(now))
        .ok_or(LoginError::InvalidToken)?;

    if !LoginToken::mark_used(pool, stored.id).await? {
        return Err(LoginError::InvalidToken);
    }

    let user = EmailUser::find_or_create(pool, &stored.email).await?;
    let retailer = RetailerGroup::find_for_user(pool, user.id).await?;

    tracing::info!(user_id = user.id, is_staff = user.is_staff, "User logged in");

    Ok(LoggedIn { user, retailer })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_email() {
        assert_eq!(
            normalise_email("  Jo@Example.COM ").unwrap(),
            "jo@example.com"
        );
        assert!(matches!(
            normalise_email("not-an-email"),
            Err(LoginError::InvalidEmail)
        ));
        assert!(matches!(normalise_email("@example.com"), Err(LoginError::InvalidEmail)));
    }

    #[test]
    fn test_tokens_are_random_hex() {
        let first = generate_token().unwrap();
        let second = generate_token().unwrap();

        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn test_login_link() {
        assert_eq!(
            login_link("https://passes.parks.example/login/verify/", "abc123"),
            "https://passes.parks.example/login/verify/?token=abc123"
        );
    }
}

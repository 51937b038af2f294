use axum::extract::FromRef;
use sqlx::PgPool;
use tower_sessions::{Expiry, Session, SessionManagerLayer, SessionStore};
use tower_sessions_sqlx_store::PostgresStore;

use crate::api::middleware::rate_limit::{client_rate_limiter, ClientRateLimiter};
use crate::api::navigation::{RequestUser, RetailerInfo};
use crate::config::Config;
use crate::models::EmailUser;
use crate::services::emails::EmailContext;
use crate::services::mailer::Mailer;

/// Session keys used in the application
pub const SESSION_KEY_USER_ID: &str = "user_id";
pub const SESSION_KEY_EMAIL: &str = "email";
pub const SESSION_KEY_DISPLAY_NAME: &str = "display_name";
pub const SESSION_KEY_IS_STAFF: &str = "is_staff";
pub const SESSION_KEY_RETAILER: &str = "retailer";
pub const SESSION_KEY_CART_ITEM_COUNT: &str = "cart_item_count";
pub const SESSION_KEY_FLASH: &str = "flash";

/// Creates the PostgreSQL-backed session layer, migrating the session table first
pub async fn create_session_layer(
    pool: PgPool,
    secure: bool,
) -> Result<SessionManagerLayer<PostgresStore>, sqlx::Error> {
    let session_store = PostgresStore::new(pool);
    session_store.migrate().await?;

    Ok(session_layer(session_store, secure))
}

/// Cookie settings shared by every store
pub fn session_layer<S: SessionStore + Clone>(store: S, secure: bool) -> SessionManagerLayer<S> {
    SessionManagerLayer::new(store)
        .with_secure(secure) // HTTPS deployments only
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(24)))
}

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub mailer: Mailer,
    pub emails: EmailContext,
    pub voucher_validation_limiter: ClientRateLimiter,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, mailer: Mailer) -> Self {
        let emails = EmailContext::from_config(&config);
        let voucher_validation_limiter = client_rate_limiter(config.voucher_validations_per_minute);
        Self {
            pool,
            config,
            mailer,
            emails,
            voucher_validation_limiter,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> PgPool {
        state.pool.clone()
    }
}

/// Reads the signed-in user, if any, out of the session
pub async fn load_request_user(session: &Session) -> Result<RequestUser, tower_sessions::session::Error> {
    let Some(user_id) = session.get::<i64>(SESSION_KEY_USER_ID).await? else {
        return Ok(RequestUser {
            cart_item_count: session.get(SESSION_KEY_CART_ITEM_COUNT).await?,
            ..RequestUser::anonymous()
        });
    };

    Ok(RequestUser {
        user_id: Some(user_id),
        email: session.get(SESSION_KEY_EMAIL).await?,
        display_name: session.get(SESSION_KEY_DISPLAY_NAME).await?,
        is_staff: session
            .get(SESSION_KEY_IS_STAFF)
            .await?
            .unwrap_or_default(),
        retailer: session.get(SESSION_KEY_RETAILER).await?,
        cart_item_count: session.get(SESSION_KEY_CART_ITEM_COUNT).await?,
    })
}

/// Populates the session after a successful login
pub async fn store_login(
    session: &Session,
    user: &EmailUser,
    retailer: Option<RetailerInfo>,
    cart_item_count: u32,
) -> Result<(), tower_sessions::session::Error> {
    // New id on privilege change
    session.cycle_id().await?;

    session.insert(SESSION_KEY_USER_ID, user.id).await?;
    session.insert(SESSION_KEY_EMAIL, &user.email).await?;
    session
        .insert(SESSION_KEY_DISPLAY_NAME, user.display_name())
        .await?;
    session.insert(SESSION_KEY_IS_STAFF, user.is_staff).await?;
    match retailer {
        Some(retailer) => session.insert(SESSION_KEY_RETAILER, retailer).await?,
        None => {
            session.remove::<RetailerInfo>(SESSION_KEY_RETAILER).await?;
        }
    }
    set_cart_item_count(session, cart_item_count).await
}

pub async fn set_cart_item_count(
    session: &Session,
    count: u32,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(SESSION_KEY_CART_ITEM_COUNT, count).await
}

pub async fn increment_cart_item_count(
    session: &Session,
) -> Result<u32, tower_sessions::session::Error> {
    let count = session
        .get::<u32>(SESSION_KEY_CART_ITEM_COUNT)
        .await?
        .unwrap_or_default()
        + 1;
    set_cart_item_count(session, count).await?;
    Ok(count)
}

/// One-shot message shown on the next page rendered
pub async fn set_flash(
    session: &Session,
    message: impl Into<String>,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(SESSION_KEY_FLASH, message.into()).await
}

pub async fn take_flash(session: &Session) -> Result<Option<String>, tower_sessions::session::Error> {
    session.remove(SESSION_KEY_FLASH).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use tower_sessions::MemoryStore;

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    fn user(is_staff: bool) -> EmailUser {
        EmailUser {
            id: 11,
            email: "ranger@parks.example".to_string(),
            first_name: "Sam".to_string(),
            last_name: "Ranger".to_string(),
            is_staff,
            datetime_created: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_empty_session_is_anonymous() {
        let user = load_request_user(&session()).await.unwrap();
        assert!(!user.is_authenticated());
        assert_eq!(user.cart_item_count, None);
    }

    #[tokio::test]
    async fn test_login_populates_request_user() {
        let session = session();
        let retailer = RetailerInfo {
            id: 3,
            name: "Busselton Visitor Centre".to_string(),
        };
        store_login(&session, &user(false), Some(retailer.clone()), 2)
            .await
            .unwrap();

        let loaded = load_request_user(&session).await.unwrap();
        assert_eq!(loaded.user_id, Some(11));
        assert_eq!(loaded.display_name.as_deref(), Some("Sam Ranger"));
        assert!(!loaded.is_staff);
        assert_eq!(loaded.retailer, Some(retailer));
        assert_eq!(loaded.cart_item_count, Some(2));
    }

    #[tokio::test]
    async fn test_cart_count_increments_from_zero() {
        let session = session();
        assert_eq!(increment_cart_item_count(&session).await.unwrap(), 1);
        assert_eq!(increment_cart_item_count(&session).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_flash_is_taken_once() {
        let session = session();
        set_flash(&session, "Pass cancelled").await.unwrap();
        assert_eq!(take_flash(&session).await.unwrap().as_deref(), Some("Pass cancelled"));
        assert_eq!(take_flash(&session).await.unwrap(), None);
    }
}

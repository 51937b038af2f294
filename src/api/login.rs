use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::session::{store_login, take_flash, AppState};
use crate::api::navigation::{PageChrome, RequestUser, RetailerInfo};
use crate::error::Result;
use crate::routes::Route;
use crate::services::login::{self, LoginError};
use crate::services::orders::Cart;

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginPage {
    pub chrome: PageChrome,
    pub error: Option<String>,
    pub email: String,
}

#[derive(Template)]
#[template(path = "pages/login_sent.html")]
pub struct LoginSentPage {
    pub chrome: PageChrome,
    pub email: String,
    pub valid_minutes: i64,
}

async fn login_page(
    state: &AppState,
    session: &Session,
    user: &RequestUser,
    email: String,
    error: Option<String>,
) -> Result<LoginPage> {
    let flash = take_flash(session).await?;
    Ok(LoginPage {
        chrome: PageChrome::new(&state.config, user, Some(Route::Login), flash),
        error,
        email,
    })
}

pub async fn login_form(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
) -> Result<Response> {
    if user.is_authenticated() {
        return Ok(Redirect::to(Route::Home.path()).into_response());
    }
    Ok(login_page(&state, &session, &user, String::new(), None)
        .await?
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
}

pub async fn request_link(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let verify_url = state.config.absolute_url(Route::LoginVerify.path());
    let ttl = state.config.login_token_ttl_minutes;

    match login::send_login_link(
        &state.pool,
        &state.mailer,
        &state.emails,
        &form.email,
        &verify_url,
        ttl,
        Utc::now(),
    )
    .await
    {
        Ok(()) => Ok(LoginSentPage {
            chrome: PageChrome::new(&state.config, &user, Some(Route::Login), None),
            email: form.email.trim().to_string(),
            valid_minutes: ttl,
        }
        .into_response()),
        Err(e @ LoginError::InvalidEmail) => {
            let page = login_page(&state, &session, &user, form.email, Some(e.to_string())).await?;
            Ok((StatusCode::BAD_REQUEST, page).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(default)]
    pub token: String,
}

pub async fn verify(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
    Query(query): Query<VerifyQuery>,
) -> Result<Response> {
    let logged_in = match login::redeem_token(&state.pool, &query.token, Utc::now()).await {
        Ok(logged_in) => logged_in,
        Err(e @ LoginError::InvalidToken) => {
            let page = login_page(&state, &session, &user, String::new(), Some(e.to_string())).await?;
            return Ok((StatusCode::BAD_REQUEST, page).into_response());
        }
        Err(e) => return Err(e.into()),
    };

    let cart = Cart::load(&state.pool, logged_in.user.id).await?;
    let retailer = logged_in.retailer.map(|group| RetailerInfo {
        id: group.id,
        name: group.name,
    });
    store_login(&session, &logged_in.user, retailer, cart.item_count()).await?;

    let dashboard = if logged_in.user.is_staff {
        Route::Internal
    } else {
        Route::External
    };
    Ok(Redirect::to(dashboard.path()).into_response())
}

pub async fn logout(session: Session) -> Result<Redirect> {
    session.flush().await?;
    Ok(Redirect::to(Route::Home.path()))
}

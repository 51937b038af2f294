use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use super::session::load_request_user;
use crate::api::navigation::{RequestUser, Role};
use crate::routes::Route;

/// Authentication error responses
#[derive(Debug)]
pub enum AuthError {
    LoginRequired,
    Unauthorized,
    Forbidden,
    SessionError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::LoginRequired => Redirect::to(Route::Login.path()).into_response(),
            AuthError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required. Please log in.",
            )
                .into_response(),
            AuthError::Forbidden => (
                StatusCode::FORBIDDEN,
                "You do not have permission to view this page.",
            )
                .into_response(),
            AuthError::SessionError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Session error occurred.").into_response()
            }
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthError::SessionError)?;

        load_request_user(&session).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to read session");
            AuthError::SessionError
        })
    }
}

/// Pages for signed-in users; anonymous visitors are sent to the login page
pub async fn require_login_page(
    user: RequestUser,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !user.is_authenticated() {
        return Err(AuthError::LoginRequired);
    }

    Ok(next.run(request).await)
}

pub async fn require_staff_page(
    user: RequestUser,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    match user.role() {
        Role::Anonymous => Err(AuthError::LoginRequired),
        Role::Staff => Ok(next.run(request).await),
        Role::Customer | Role::Retailer => Err(AuthError::Forbidden),
    }
}

pub async fn require_retailer_page(
    user: RequestUser,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !user.is_authenticated() {
        return Err(AuthError::LoginRequired);
    }
    if user.retailer.is_none() {
        return Err(AuthError::Forbidden);
    }

    Ok(next.run(request).await)
}

/// JSON endpoints answer 401 rather than redirecting
pub async fn require_auth_api(
    user: RequestUser,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !user.is_authenticated() {
        return Err(AuthError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// The signed-in user's id, for handlers behind one of the guards above
pub fn authenticated_user_id(user: &RequestUser) -> Result<i64, AuthError> {
    user.user_id.ok_or(AuthError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_required_redirects() {
        let response = AuthError::LoginRequired.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/login/");
    }

    #[test]
    fn test_api_errors() {
        assert_eq!(
            AuthError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }
}

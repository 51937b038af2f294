use axum::{
    extract::{Query, State},
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::rate_limit::{limit_by_client, ClientRateLimiter};
use crate::api::middleware::session::{increment_cart_item_count, AppState};
use crate::api::navigation::RequestUser;
use crate::error::{AppError, Result};
use crate::models::Voucher;
use crate::services::vouchers::{self, PurchaseVoucherRequest, VoucherValidation};

/// Voucher endpoints that need no login. Credential checks are rate limited per client.
pub fn public_router(limiter: ClientRateLimiter) -> Router<AppState> {
    Router::new()
        .route("/api/vouchers/validate", get(validate_voucher))
        .route_layer(from_fn_with_state(limiter, limit_by_client))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/vouchers", post(purchase_voucher))
}

async fn purchase_voucher(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
    Json(request): Json<PurchaseVoucherRequest>,
) -> Result<Json<Voucher>> {
    let user_id = user.user_id.ok_or(AppError::Unauthorized)?;

    let voucher = vouchers::purchase_voucher(
        &state.pool,
        Some(user_id),
        request,
        state.config.voucher_expiry_days,
        Utc::now(),
    )
    .await?;
    increment_cart_item_count(&session).await?;

    Ok(Json(voucher))
}

/// Missing fields make the voucher invalid rather than the request
#[derive(Debug, Default, Deserialize)]
pub struct ValidateQuery {
    pub email: Option<String>,
    pub code: Option<String>,
    pub pin: Option<String>,
}

async fn validate_voucher(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Result<Json<VoucherValidation>> {
    let (Some(email), Some(code), Some(pin)) = (query.email, query.code, query.pin) else {
        return Ok(Json(VoucherValidation::invalid()));
    };

    let validation = vouchers::validate_voucher(&state.pool, &email, &code, &pin).await?;
    Ok(Json(validation))
}

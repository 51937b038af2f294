use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::api::middleware::session::{increment_cart_item_count, AppState};
use crate::api::navigation::{RequestUser, Role};
use crate::api::pages::owned_pass;
use crate::error::{AppError, Result};
use crate::models::pass_type::Audience;
use crate::models::{PassDetails, PassStatus, PassType, PricingWindow, PricingWindowOption};
use crate::services::passes::{self, details_status_on, NewPassRequest, PriceBreakdown, RefundQuote};
use crate::services::pricing::{self, NewPricingWindow};
use crate::services::qr_generator::{generate_qr_png, generate_qr_svg, PassQrPayload};

/// Pass endpoints open to anyone browsing the shop
pub fn catalogue_router() -> Router<AppState> {
    Router::new()
        .route("/api/passes/pass-types", get(list_pass_types))
        .route("/api/passes/pass-types/:id/options", get(list_options))
}

/// Pass endpoints for signed-in users
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/passes", get(list_passes).post(create_pass))
        .route("/api/passes/:id/vehicles", patch(update_vehicles))
        .route("/api/passes/:id/cancel-auto-renewal", post(cancel_auto_renewal))
        .route("/api/passes/:id/refund", get(refund_quote))
        .route("/api/passes/:id/qr", get(qr_code))
        .route(
            "/api/passes/pass-types/:id/pricing-windows",
            post(add_pricing_window),
        )
}

fn audience_for(user: &RequestUser) -> Audience {
    match user.role() {
        Role::Staff => Audience::Internal,
        Role::Retailer => Audience::Retailer,
        Role::Customer | Role::Anonymous => Audience::Public,
    }
}

async fn list_pass_types(
    State(state): State<AppState>,
    user: RequestUser,
) -> Result<Json<Vec<PassType>>> {
    let pass_types = PassType::list_for(&state.pool, audience_for(&user)).await?;
    Ok(Json(pass_types))
}

#[derive(Debug, Serialize)]
struct PassTypeOptions {
    pricing_window: PricingWindow,
    options: Vec<PricingWindowOption>,
}

async fn list_options(
    State(state): State<AppState>,
    Path(pass_type_id): Path<i64>,
) -> Result<Json<PassTypeOptions>> {
    let (pricing_window, options) =
        pricing::current_options(&state.pool, pass_type_id, Utc::now().date_naive()).await?;
    Ok(Json(PassTypeOptions {
        pricing_window,
        options,
    }))
}

/// Staff only
async fn add_pricing_window(
    State(state): State<AppState>,
    user: RequestUser,
    Path(pass_type_id): Path<i64>,
    Json(request): Json<NewPricingWindow>,
) -> Result<Json<PassTypeOptions>> {
    if !user.is_staff {
        return Err(AppError::Forbidden);
    }
    let (pricing_window, options) = pricing::add_pricing_window(
        &state.pool,
        pass_type_id,
        request,
        Utc::now().date_naive(),
    )
    .await?;
    Ok(Json(PassTypeOptions {
        pricing_window,
        options,
    }))
}

/// A pass with the figures the client shows alongside it
#[derive(Debug, Serialize)]
pub struct PassResponse {
    #[serde(flatten)]
    pub details: PassDetails,
    pub status: PassStatus,
    pub price_breakdown: PriceBreakdown,
}

impl PassResponse {
    fn new(details: PassDetails) -> Self {
        Self {
            status: details_status_on(&details, Utc::now().date_naive()),
            price_breakdown: PriceBreakdown::for_details(&details),
            details,
        }
    }
}

async fn list_passes(
    State(state): State<AppState>,
    user: RequestUser,
) -> Result<Json<Vec<PassResponse>>> {
    let user_id = user.user_id.ok_or(AppError::Unauthorized)?;
    let passes = PassDetails::list_for_user(&state.pool, user_id)
        .await?
        .into_iter()
        .map(PassResponse::new)
        .collect();
    Ok(Json(passes))
}

async fn create_pass(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
    Json(mut request): Json<NewPassRequest>,
) -> Result<Json<PassResponse>> {
    let user_id = user.user_id.ok_or(AppError::Unauthorized)?;
    request.pass.user_id = Some(user_id);

    let details = passes::create_pass(&state.pool, request, Utc::now()).await?;
    let cart_item_count = increment_cart_item_count(&session).await?;
    tracing::debug!(pass_id = details.pass.id, cart_item_count, "Pass added to cart");

    Ok(Json(PassResponse::new(details)))
}

#[derive(Debug, Deserialize)]
pub struct VehiclesRequest {
    pub vehicle_registration_1: Option<String>,
    pub vehicle_registration_2: Option<String>,
}

async fn update_vehicles(
    State(state): State<AppState>,
    user: RequestUser,
    Path(pass_id): Path<i64>,
    Json(request): Json<VehiclesRequest>,
) -> Result<Json<PassResponse>> {
    owned_pass(&state, &user, pass_id).await?;

    let details = passes::update_vehicles(
        &state.pool,
        pass_id,
        request.vehicle_registration_1.as_deref(),
        request.vehicle_registration_2.as_deref(),
    )
    .await?;

    // Purchased passes get a confirmation; cart items are confirmed at checkout
    if !details.pass.in_cart {
        match state.emails.pass_updated(&details) {
            Ok(message) => {
                if let Err(e) = state.mailer.send(&message).await {
                    tracing::error!(pass_id, error = %e, "Failed to send pass updated email");
                }
            }
            Err(e) => tracing::error!(pass_id, error = %e, "Failed to render pass updated email"),
        }
    }

    Ok(Json(PassResponse::new(details)))
}

async fn cancel_auto_renewal(
    State(state): State<AppState>,
    user: RequestUser,
    Path(pass_id): Path<i64>,
) -> Result<Json<PassResponse>> {
    owned_pass(&state, &user, pass_id).await?;
    passes::cancel_automatic_renewal(&state.pool, pass_id, Utc::now()).await?;

    let details = PassDetails::find(&state.pool, pass_id)
        .await?
        .ok_or(passes::PassError::NotFound(pass_id))?;
    Ok(Json(PassResponse::new(details)))
}

async fn refund_quote(
    State(state): State<AppState>,
    user: RequestUser,
    Path(pass_id): Path<i64>,
) -> Result<Json<RefundQuote>> {
    if !user.is_staff {
        return Err(AppError::Forbidden);
    }
    let details = PassDetails::find(&state.pool, pass_id)
        .await?
        .ok_or(passes::PassError::NotFound(pass_id))?;
    Ok(Json(passes::refund_quote(&details, Utc::now().date_naive())))
}

#[derive(Debug, Default, Deserialize)]
pub struct QrQuery {
    pub format: Option<String>,
}

async fn qr_code(
    State(state): State<AppState>,
    user: RequestUser,
    Path(pass_id): Path<i64>,
    Query(query): Query<QrQuery>,
) -> Result<Response> {
    owned_pass(&state, &user, pass_id).await?;
    let details = PassDetails::find(&state.pool, pass_id)
        .await?
        .ok_or(passes::PassError::NotFound(pass_id))?;

    let token =
        PassQrPayload::from_details(&details).seal(state.config.qr_encryption_key.expose_secret())?;

    let response = match query.format.as_deref() {
        Some("png") => (
            [(header::CONTENT_TYPE, "image/png")],
            generate_qr_png(&token)?,
        )
            .into_response(),
        _ => (
            [(header::CONTENT_TYPE, "image/svg+xml")],
            generate_qr_svg(&token)?,
        )
            .into_response(),
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::navigation::RetailerInfo;

    #[test]
    fn test_audience_follows_role() {
        let anonymous = RequestUser::anonymous();
        let customer = RequestUser {
            user_id: Some(1),
            ..RequestUser::anonymous()
        };
        let retailer = RequestUser {
            retailer: Some(RetailerInfo {
                id: 1,
                name: "Kalbarri Visitor Centre".to_string(),
            }),
            ..customer.clone()
        };
        let staff = RequestUser {
            is_staff: true,
            ..customer.clone()
        };

        assert_eq!(audience_for(&anonymous), Audience::Public);
        assert_eq!(audience_for(&customer), Audience::Public);
        assert_eq!(audience_for(&retailer), Audience::Retailer);
        assert_eq!(audience_for(&staff), Audience::Internal);
    }
}

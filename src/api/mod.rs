// API module - HTML pages and JSON endpoints

pub mod health;
pub mod login;
pub mod middleware;
pub mod navigation;
pub mod pages;
pub mod passes;
pub mod vouchers;

use axum::{
    middleware::from_fn,
    routing::{get, get_service, post},
    Router,
};
use tower_http::services::ServeDir;

use self::middleware::auth::{
    require_auth_api, require_login_page, require_retailer_page, require_staff_page,
};
use self::middleware::session::AppState;
use crate::routes::Route;

/// Every route of the application; the caller adds the session and trace layers
pub fn app(state: AppState) -> Router {
    let public = Router::new()
        .route(Route::Home.path(), get(pages::home))
        .route(Route::Help.path(), get(pages::help))
        .route(Route::Faq.path(), get(pages::faq))
        .route(Route::Contact.path(), get(pages::contact))
        .route(Route::FurtherInfo.path(), get(pages::further_info))
        .route(
            Route::Login.path(),
            get(login::login_form).post(login::request_link),
        )
        .route(Route::LoginVerify.path(), get(login::verify))
        .route(Route::Logout.path(), get(login::logout))
        .route("/health", get(health::health_check))
        .merge(passes::catalogue_router())
        .merge(vouchers::public_router(
            state.voucher_validation_limiter.clone(),
        ));

    let customer_pages = Router::new()
        .route(Route::External.path(), get(pages::external))
        .route(
            "/external/passes/:id/cancel-auto-renewal",
            post(pages::cancel_auto_renewal),
        )
        .route(
            Route::ManageAccount.path(),
            get(pages::account).post(pages::update_account),
        )
        .route(Route::Cart.path(), get(pages::cart))
        .route("/cart/checkout", post(pages::checkout))
        .route_layer(from_fn(require_login_page));

    let retailer_pages = Router::new()
        .route(Route::Retailer.path(), get(pages::retailer))
        .route_layer(from_fn(require_retailer_page));

    let staff_pages = Router::new()
        .route(Route::Internal.path(), get(pages::internal))
        .route("/internal/passes/:id/cancel", post(pages::cancel_pass))
        .route("/internal/passes/:id/reinstate", post(pages::reinstate_pass))
        .route(Route::InternalVouchers.path(), get(pages::internal_vouchers))
        .route(
            Route::InternalDiscountCodes.path(),
            get(pages::internal_discount_codes),
        )
        .route(
            Route::MgtCommands.path(),
            get(pages::mgt_commands).post(pages::run_mgt_command),
        )
        .route_layer(from_fn(require_staff_page));

    let api = Router::new()
        .merge(passes::router())
        .merge(vouchers::router())
        .route_layer(from_fn(require_auth_api));

    Router::new()
        .merge(public)
        .merge(customer_pages)
        .merge(retailer_pages)
        .merge(staff_pages)
        .merge(api)
        .nest_service("/static", get_service(ServeDir::new("static")))
        .with_state(state)
}

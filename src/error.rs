use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::jobs::JobError;
use crate::services::{
    invoicing::InvoiceError, login::LoginError, mailer::MailError, orders::OrderError,
    passes::PassError, pricing::PricingError, qr_generator::QrGenerationError,
    vouchers::VoucherError,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    #[error("Pass error: {0}")]
    Pass(#[from] PassError),

    #[error("Voucher error: {0}")]
    Voucher(#[from] VoucherError),

    #[error("Email error: {0}")]
    Mail(#[from] MailError),

    #[error("{0}")]
    Order(#[from] OrderError),

    #[error("Invoice error: {0}")]
    Invoice(#[from] InvoiceError),

    #[error("{0}")]
    Login(#[from] LoginError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("QR code error: {0}")]
    Qr(#[from] QrGenerationError),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(e: tower_sessions::session::Error) -> Self {
        AppError::Session(e.to_string())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Pass(e) if e.is_user_error() => StatusCode::BAD_REQUEST,
            AppError::Voucher(e) if e.is_user_error() => StatusCode::BAD_REQUEST,
            AppError::Order(e) if e.is_user_error() => StatusCode::BAD_REQUEST,
            AppError::Pricing(e) if e.is_user_error() => StatusCode::BAD_REQUEST,
            AppError::Login(e) if e.is_user_error() => StatusCode::BAD_REQUEST,
            AppError::Login(LoginError::Mail(_)) => StatusCode::BAD_GATEWAY,
            AppError::Pass(PassError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Pricing(PricingError::PassTypeNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Mail(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_debug = format!("{:?}", self);

        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            match self {
                AppError::Database(_) => "Database error".to_string(),
                AppError::Mail(_) => "Email delivery failed".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": error_debug,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

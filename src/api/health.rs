use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use sqlx::PgPool;
use std::path::Path;
use std::time::Instant;

use crate::api::middleware::session::AppState;
use crate::services::mailer::Mailer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Healthy,
    Unhealthy,
    Configured,
    NotConfigured,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus) -> Self {
        Self {
            status,
            response_time_ms: None,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: ComponentStatus,
    pub checked_at: String,
    pub version: &'static str,
    pub database: ComponentHealth,
    pub email: ComponentHealth,
    pub retailer_documents: ComponentHealth,
}

/// 200 when the database answers, 503 otherwise.
/// Email and document storage are reported for operators but never fail the check.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let database = check_database(&state.pool).await;
    let email = email_status(&state.mailer);
    let retailer_documents = document_root_status(Path::new(&state.config.retailer_document_root)).await;

    let (code, status) = match database.status {
        ComponentStatus::Healthy => (StatusCode::OK, ComponentStatus::Healthy),
        _ => (StatusCode::SERVICE_UNAVAILABLE, ComponentStatus::Unhealthy),
    };

    if status == ComponentStatus::Unhealthy {
        tracing::warn!(detail = ?database.detail, "Health check failed");
    } else {
        tracing::debug!(db_ms = ?database.response_time_ms, "Health check passed");
    }

    let report = HealthReport {
        status,
        checked_at: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        database,
        email,
        retailer_documents,
    };

    (code, Json(report))
}

async fn check_database(pool: &PgPool) -> ComponentHealth {
    let start = Instant::now();
    let result = sqlx::query("SELECT 1").execute(pool).await;

    let health = match result {
        Ok(_) => ComponentHealth::new(ComponentStatus::Healthy),
        Err(e) => ComponentHealth::new(ComponentStatus::Unhealthy).with_detail(e.to_string()),
    };
    ComponentHealth {
        response_time_ms: Some(start.elapsed().as_millis()),
        ..health
    }
}

fn email_status(mailer: &Mailer) -> ComponentHealth {
    match mailer {
        Mailer::Relay(_) => ComponentHealth::new(ComponentStatus::Configured),
        Mailer::Log => ComponentHealth::new(ComponentStatus::NotConfigured)
            .with_detail("EMAIL_RELAY_URL unset; messages are written to the log"),
    }
}

// The directory is created by the first invoice run, so a missing one is not an error
async fn document_root_status(root: &Path) -> ComponentHealth {
    match tokio::fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => ComponentHealth::new(ComponentStatus::Healthy),
        Ok(_) => ComponentHealth::new(ComponentStatus::Unhealthy)
            .with_detail(format!("{} is not a directory", root.display())),
        Err(_) => ComponentHealth::new(ComponentStatus::NotConfigured)
            .with_detail(format!("{} does not exist yet", root.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_status() {
        assert_eq!(email_status(&Mailer::Log).status, ComponentStatus::NotConfigured);
        let relay = Mailer::relay("https://mail.parks.example/send", None);
        assert_eq!(email_status(&relay).status, ComponentStatus::Configured);
    }

    #[tokio::test]
    async fn test_document_root_status() {
        let existing = document_root_status(&std::env::temp_dir()).await;
        assert_eq!(existing.status, ComponentStatus::Healthy);

        let missing = document_root_status(Path::new("/nonexistent/parkpasses/retailers")).await;
        assert_eq!(missing.status, ComponentStatus::NotConfigured);
        assert!(missing.detail.unwrap().contains("does not exist"));
    }

    #[test]
    fn test_status_serializes_as_snake_case() {
        let json = serde_json::to_string(&ComponentHealth::new(ComponentStatus::NotConfigured)).unwrap();
        assert_eq!(json, r#"{"status":"not_configured"}"#);
    }
}

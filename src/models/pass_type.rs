use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use super::money::Money;

/// Name given to the open-ended pricing window of every pass type
pub const DEFAULT_PRICING_WINDOW_NAME: &str = "Default";

/// Which pass types a requester may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Internal,
    Retailer,
    Public,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PassType {
    pub id: i64,
    pub slug: String,
    pub name: String, // reserved for system use
    pub display_name: String,
    pub description: Option<String>,
    pub oracle_code: Option<String>,
    pub display_order: i16,
    pub display_retailer: bool,
    pub display_externally: bool,
}

impl PassType {
    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM pass_types WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Lists the pass types visible to an audience in display order
    pub async fn list_for(pool: &PgPool, audience: Audience) -> Result<Vec<Self>, sqlx::Error> {
        let filter = match audience {
            Audience::Internal => "TRUE",
            Audience::Retailer => "display_retailer = TRUE",
            Audience::Public => "display_externally = TRUE",
        };

        sqlx::query_as::<_, Self>(&format!(
            "SELECT * FROM pass_types WHERE {} ORDER BY display_order, id",
            filter
        ))
        .fetch_all(pool)
        .await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PricingWindow {
    pub id: i64,
    pub name: String,
    pub pass_type_id: i64,
    pub date_start: NaiveDate,
    pub date_expiry: Option<NaiveDate>, // None marks the default window
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PricingWindowStatus {
    Current,
    Future,
    Expired,
}

impl std::fmt::Display for PricingWindowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PricingWindowStatus::Current => "Current",
            PricingWindowStatus::Future => "Future",
            PricingWindowStatus::Expired => "Expired",
        };
        f.write_str(label)
    }
}

impl PricingWindow {
    pub fn is_default(&self) -> bool {
        self.date_expiry.is_none()
    }

    pub fn status_on(&self, today: NaiveDate) -> PricingWindowStatus {
        match self.date_expiry {
            None => PricingWindowStatus::Current,
            Some(_) if self.date_start > today => PricingWindowStatus::Future,
            Some(expiry) if expiry <= today => PricingWindowStatus::Expired,
            Some(_) => PricingWindowStatus::Current,
        }
    }

    /// True when `today` falls inside a non-default window (inclusive)
    pub fn covers(&self, today: NaiveDate) -> bool {
        match self.date_expiry {
            Some(expiry) => self.date_start <= today && today <= expiry,
            None => false,
        }
    }

    pub async fn list_by_pass_type(
        pool: &PgPool,
        pass_type_id: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM pricing_windows
            WHERE pass_type_id = $1
            ORDER BY date_start, date_expiry
            "#,
        )
        .bind(pass_type_id)
        .fetch_all(pool)
        .await
    }

    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
        pass_type_id: i64,
        date_start: NaiveDate,
        date_expiry: Option<NaiveDate>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO pricing_windows (name, pass_type_id, date_start, date_expiry)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(pass_type_id)
        .bind(date_start)
        .bind(date_expiry)
        .fetch_one(&mut **tx)
        .await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PricingWindowOption {
    pub id: i64,
    pub pricing_window_id: i64,
    pub name: String,  // i.e. "5 days"
    pub duration: i16, // in days i.e. 5, 14, 28, 365
    pub price: Money,
}

impl PricingWindowOption {
    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM pricing_window_options WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_by_window(
        pool: &PgPool,
        pricing_window_id: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM pricing_window_options
            WHERE pricing_window_id = $1
            ORDER BY price
            "#,
        )
        .bind(pricing_window_id)
        .fetch_all(pool)
        .await
    }

    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        pricing_window_id: i64,
        name: &str,
        duration: i16,
        price: Money,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO pricing_window_options (pricing_window_id, name, duration, price)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(pricing_window_id)
        .bind(name)
        .bind(duration)
        .bind(price)
        .fetch_one(&mut **tx)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn window(start: NaiveDate, expiry: Option<NaiveDate>) -> PricingWindow {
        PricingWindow {
            id: 1,
            name: "Summer".to_string(),
            pass_type_id: 1,
            date_start: start,
            date_expiry: expiry,
        }
    }

    #[test]
    fn test_default_window_is_always_current() {
        let w = window(date(2030, 1, 1), None);
        assert_eq!(w.status_on(date(2024, 1, 1)), PricingWindowStatus::Current);
        assert!(w.is_default());
        assert!(!w.covers(date(2031, 1, 1)));
    }

    #[test]
    fn test_window_status() {
        let w = window(date(2024, 12, 1), Some(date(2025, 2, 28)));
        assert_eq!(w.status_on(date(2024, 11, 30)), PricingWindowStatus::Future);
        assert_eq!(w.status_on(date(2025, 1, 15)), PricingWindowStatus::Current);
        assert_eq!(w.status_on(date(2025, 2, 28)), PricingWindowStatus::Expired);
        assert!(w.covers(date(2025, 2, 28)));
        assert!(w.covers(date(2024, 12, 1)));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::money::Money;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RetailerGroup {
    pub id: i64,
    pub name: String,
    pub commission_basis_points: i32, // 750 = 7.50%
    pub datetime_created: DateTime<Utc>,
}

impl RetailerGroup {
    /// Commission rate formatted for documents, e.g. "7.5%"
    pub fn commission_display(&self) -> String {
        let whole = self.commission_basis_points / 100;
        let fraction = self.commission_basis_points % 100;
        match fraction {
            0 => format!("{}%", whole),
            f if f % 10 == 0 => format!("{}.{}%", whole, f / 10),
            f => format!("{}.{:02}%", whole, f),
        }
    }

    /// Commission owed to the retailer on a sales total
    pub fn commission_on(&self, total_sales: Money) -> Money {
        total_sales.scale(i64::from(self.commission_basis_points), 10_000)
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM retailer_groups WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Lists every group except the one named `excluded` (the online shop)
    pub async fn list_excluding(pool: &PgPool, excluded: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM retailer_groups
            WHERE name <> $1
            ORDER BY name
            "#,
        )
        .bind(excluded)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM retailer_groups WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// The active retailer group a user belongs to, if any
    pub async fn find_for_user(pool: &PgPool, user_id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT rg.* FROM retailer_groups rg
            JOIN retailer_group_users rgu ON rgu.retailer_group_id = rg.id
            WHERE rgu.user_id = $1 AND rgu.active = TRUE
            ORDER BY rg.name
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RetailerReport {
    pub id: i64,
    pub uuid: Uuid,
    pub retailer_group_id: i64,
    pub report_year: i32,
    pub report_month: i32,
    pub invoice_path: String,
    pub report_path: String,
    pub datetime_created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertReportData {
    pub uuid: Uuid,
    pub retailer_group_id: i64,
    pub report_year: i32,
    pub report_month: i32,
    pub invoice_path: String,
    pub report_path: String,
}

impl RetailerReport {
    /// Records the documents for a group and month, replacing any earlier run
    pub async fn upsert(pool: &PgPool, data: UpsertReportData) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO retailer_reports (
                uuid, retailer_group_id, report_year, report_month, invoice_path, report_path
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (retailer_group_id, report_year, report_month) DO UPDATE
            SET uuid = EXCLUDED.uuid,
                invoice_path = EXCLUDED.invoice_path,
                report_path = EXCLUDED.report_path
            RETURNING *
            "#,
        )
        .bind(data.uuid)
        .bind(data.retailer_group_id)
        .bind(data.report_year)
        .bind(data.report_month)
        .bind(&data.invoice_path)
        .bind(&data.report_path)
        .fetch_one(pool)
        .await
    }

    pub async fn list_by_group(
        pool: &PgPool,
        retailer_group_id: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM retailer_reports
            WHERE retailer_group_id = $1
            ORDER BY report_year DESC, report_month DESC
            "#,
        )
        .bind(retailer_group_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(bp: i32) -> RetailerGroup {
        RetailerGroup {
            id: 1,
            name: "Visitor Centre".to_string(),
            commission_basis_points: bp,
            datetime_created: Utc::now(),
        }
    }

    #[test]
    fn test_commission_display() {
        assert_eq!(group(1000).commission_display(), "10%");
        assert_eq!(group(750).commission_display(), "7.5%");
        assert_eq!(group(1225).commission_display(), "12.25%");
    }

    #[test]
    fn test_commission_on_rounds_to_cents() {
        // 7.5% of $123.45 = $9.25875
        assert_eq!(group(750).commission_on(Money(12345)), Money(926));
        assert_eq!(group(0).commission_on(Money(12345)), Money::ZERO);
    }
}

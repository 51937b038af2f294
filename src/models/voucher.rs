use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, QueryBuilder, Transaction};

use super::money::Money;

/// Voucher processing status codes
pub const VOUCHER_NEW: &str = "N";
pub const VOUCHER_DELIVERED: &str = "D";
pub const VOUCHER_NOT_DELIVERED: &str = "ND";

const REDEEMABLE: &str = r#"
    SELECT * FROM vouchers
    WHERE in_cart = FALSE
      AND LOWER(recipient_email) = LOWER($1)
      AND code = $2
      AND pin = $3
      AND processing_status = $4
"#;

pub fn processing_status_display(code: &str) -> &'static str {
    match code {
        VOUCHER_NEW => "New",
        VOUCHER_DELIVERED => "Delivered",
        VOUCHER_NOT_DELIVERED => "Not Delivered",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Voucher {
    pub id: i64,
    pub voucher_number: Option<String>,
    pub purchaser_id: Option<i64>,
    pub recipient_name: String,
    pub recipient_email: String,
    pub datetime_to_email: DateTime<Utc>,
    pub personal_message: String,
    pub amount: Money,
    pub expiry: DateTime<Utc>,
    pub code: String,
    #[serde(skip_serializing)]
    pub pin: String,
    pub processing_status: String,
    pub in_cart: bool,
    pub datetime_purchased: DateTime<Utc>,
    pub datetime_updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateVoucherData {
    pub purchaser_id: Option<i64>,
    pub recipient_name: String,
    pub recipient_email: String,
    pub datetime_to_email: DateTime<Utc>,
    pub personal_message: String,
    pub amount: Money,
    pub expiry: DateTime<Utc>,
    pub code: String,
    pub pin: String,
}

/// Filters for the internal voucher list
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoucherFilter {
    pub processing_status: Option<String>,
    pub datetime_to_email_from: Option<NaiveDate>,
    pub datetime_to_email_to: Option<NaiveDate>,
    pub search: Option<String>,
}

impl Voucher {
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    pub fn processing_status_display(&self) -> &'static str {
        processing_status_display(&self.processing_status)
    }

    pub async fn create(pool: &PgPool, data: CreateVoucherData) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let voucher = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO vouchers (
                purchaser_id, recipient_name, recipient_email, datetime_to_email,
                personal_message, amount, expiry, code, pin
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(data.purchaser_id)
        .bind(&data.recipient_name)
        .bind(&data.recipient_email)
        .bind(data.datetime_to_email)
        .bind(&data.personal_message)
        .bind(data.amount)
        .bind(data.expiry)
        .bind(&data.code)
        .bind(&data.pin)
        .fetch_one(&mut *tx)
        .await?;

        let voucher = sqlx::query_as::<_, Self>(
            r#"
            UPDATE vouchers SET voucher_number = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(voucher.id)
        .bind(crate::services::vouchers::voucher_number_for(voucher.id))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(voucher)
    }

    pub async fn code_exists(pool: &PgPool, code: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM vouchers WHERE code = $1)")
            .bind(code)
            .fetch_one(pool)
            .await
    }

    /// Finds a delivered, purchased voucher matching all three credentials
    pub async fn find_redeemable(
        pool: &PgPool,
        email: &str,
        code: &str,
        pin: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(REDEEMABLE)
            .bind(email)
            .bind(code)
            .bind(pin)
            .bind(VOUCHER_DELIVERED)
            .fetch_optional(pool)
            .await
    }

    /// Same match as `find_redeemable`, holding a row lock until `tx` ends so
    /// concurrent redemptions of one voucher queue behind each other
    pub async fn lock_redeemable(
        tx: &mut Transaction<'_, Postgres>,
        email: &str,
        code: &str,
        pin: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("{REDEEMABLE} FOR UPDATE");
        sqlx::query_as::<_, Self>(&query)
            .bind(email)
            .bind(code)
            .bind(pin)
            .bind(VOUCHER_DELIVERED)
            .fetch_optional(&mut **tx)
            .await
    }

    pub async fn list_by_purchaser<'e, E: PgExecutor<'e>>(
        executor: E,
        purchaser_id: i64,
        in_cart: bool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM vouchers
            WHERE purchaser_id = $1 AND in_cart = $2
            ORDER BY datetime_purchased DESC
            "#,
        )
        .bind(purchaser_id)
        .bind(in_cart)
        .fetch_all(executor)
        .await
    }

    /// Purchased vouchers due to be emailed on or before a date and not yet delivered
    pub async fn list_due_by(pool: &PgPool, date: NaiveDate) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM vouchers
            WHERE in_cart = FALSE
              AND datetime_to_email::date <= $1
              AND processing_status IN ($2, $3)
            ORDER BY id
            "#,
        )
        .bind(date)
        .bind(VOUCHER_NEW)
        .bind(VOUCHER_NOT_DELIVERED)
        .fetch_all(pool)
        .await
    }

    pub async fn list_filtered(
        pool: &PgPool,
        filter: &VoucherFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM vouchers WHERE TRUE");

        if let Some(status) = filter.processing_status.as_deref().filter(|s| !s.is_empty()) {
            query.push(" AND processing_status = ").push_bind(status.to_string());
        }
        if let Some(from) = filter.datetime_to_email_from {
            query.push(" AND datetime_to_email::date >= ").push_bind(from);
        }
        if let Some(to) = filter.datetime_to_email_to {
            query.push(" AND datetime_to_email::date <= ").push_bind(to);
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            query
                .push(" AND (recipient_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR recipient_email ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        query.push(" ORDER BY datetime_to_email DESC, id DESC LIMIT 500");

        query.build_query_as::<Self>().fetch_all(pool).await
    }

    pub async fn set_processing_status(
        pool: &PgPool,
        id: i64,
        status: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE vouchers
            SET processing_status = $2, datetime_updated = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Takes the voucher out of the cart; false when it had already left
    pub async fn complete_purchase(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE vouchers SET in_cart = FALSE, datetime_updated = NOW()
            WHERE id = $1 AND in_cart = TRUE
            "#,
        )
        .bind(id)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VoucherTransaction {
    pub pass_id: i64,
    pub voucher_id: i64,
    pub credit: Money,
    pub debit: Money,
    pub datetime_created: DateTime<Utc>,
}

impl VoucherTransaction {
    pub async fn create(
        tx: &mut Transaction<'_, Postgres>,
        voucher_id: i64,
        pass_id: i64,
        credit: Money,
        debit: Money,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO voucher_transactions (pass_id, voucher_id, credit, debit)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(pass_id)
        .bind(voucher_id)
        .bind(credit)
        .bind(debit)
        .fetch_one(&mut **tx)
        .await
    }

    pub async fn list_by_voucher<'e, E: PgExecutor<'e>>(
        executor: E,
        voucher_id: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM voucher_transactions
            WHERE voucher_id = $1
            ORDER BY datetime_created
            "#,
        )
        .bind(voucher_id)
        .fetch_all(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_status_display() {
        assert_eq!(processing_status_display(VOUCHER_NEW), "New");
        assert_eq!(processing_status_display(VOUCHER_DELIVERED), "Delivered");
        assert_eq!(processing_status_display(VOUCHER_NOT_DELIVERED), "Not Delivered");
        assert_eq!(processing_status_display("??"), "Unknown");
    }
}

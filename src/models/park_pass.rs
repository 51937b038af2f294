use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};

use super::money::Money;

/// Processing status stored on a pass
pub const PROCESSING_STATUS_VALID: &str = "VA";
pub const PROCESSING_STATUS_CANCELLED: &str = "CA";

/// Lifecycle status of a pass on a given day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassStatus {
    Future,
    Current,
    Expired,
    Cancelled,
}

impl PassStatus {
    pub fn code(self) -> &'static str {
        match self {
            PassStatus::Future => "FU",
            PassStatus::Current => "CU",
            PassStatus::Expired => "EX",
            PassStatus::Cancelled => "CA",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PassStatus::Future => "Future",
            PassStatus::Current => "Current",
            PassStatus::Expired => "Expired",
            PassStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for PassStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AustralianState {
    #[serde(rename = "NSW")]
    NewSouthWales,
    #[serde(rename = "VIC")]
    Victoria,
    #[serde(rename = "QLD")]
    Queensland,
    #[serde(rename = "WA")]
    WesternAustralia,
    #[serde(rename = "SA")]
    SouthAustralia,
    #[serde(rename = "TAS")]
    Tasmania,
    #[serde(rename = "ACT")]
    AustralianCapitalTerritory,
    #[serde(rename = "NT")]
    NorthernTerritory,
}

impl AustralianState {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "NSW" => Some(Self::NewSouthWales),
            "VIC" => Some(Self::Victoria),
            "QLD" => Some(Self::Queensland),
            "WA" => Some(Self::WesternAustralia),
            "SA" => Some(Self::SouthAustralia),
            "TAS" => Some(Self::Tasmania),
            "ACT" => Some(Self::AustralianCapitalTerritory),
            "NT" => Some(Self::NorthernTerritory),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::NewSouthWales => "NSW",
            Self::Victoria => "VIC",
            Self::Queensland => "QLD",
            Self::WesternAustralia => "WA",
            Self::SouthAustralia => "SA",
            Self::Tasmania => "TAS",
            Self::AustralianCapitalTerritory => "ACT",
            Self::NorthernTerritory => "NT",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NewSouthWales => "New South Wales",
            Self::Victoria => "Victoria",
            Self::Queensland => "Queensland",
            Self::WesternAustralia => "Western Australia",
            Self::SouthAustralia => "South Australia",
            Self::Tasmania => "Tasmania",
            Self::AustralianCapitalTerritory => "Australian Capital Territory",
            Self::NorthernTerritory => "Northern Territory",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Pass {
    pub id: i64,
    pub user_id: Option<i64>,
    pub option_id: i64,
    pub pass_number: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub mobile: String,
    pub company: Option<String>,
    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub suburb: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub rac_member_number: Option<String>,
    pub vehicle_registration_1: Option<String>,
    pub vehicle_registration_2: Option<String>,
    pub drivers_licence_number: Option<String>,
    pub park_group_id: Option<i64>,
    pub date_start: NaiveDate,
    pub date_expiry: NaiveDate,
    pub renew_automatically: bool,
    pub prevent_further_vehicle_updates: bool,
    pub processing_status: Option<String>, // "VA" or "CA"
    pub in_cart: bool,
    pub purchase_email_sent: bool,
    pub sold_via: Option<i64>,
    pub datetime_created: DateTime<Utc>,
    pub datetime_updated: DateTime<Utc>,
}

impl Pass {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn has_vehicle_details(&self) -> bool {
        self.vehicle_registration_1
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }

    pub fn state_name(&self) -> Option<&'static str> {
        self.state
            .as_deref()
            .and_then(AustralianState::from_code)
            .map(AustralianState::name)
    }
}

/// Data needed to create a pass
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePassData {
    #[serde(skip)]
    pub user_id: Option<i64>,
    pub option_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub mobile: String,
    pub company: Option<String>,
    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub suburb: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub rac_member_number: Option<String>,
    pub vehicle_registration_1: Option<String>,
    pub vehicle_registration_2: Option<String>,
    pub drivers_licence_number: Option<String>,
    pub park_group_id: Option<i64>,
    pub date_start: Option<NaiveDate>,
    #[serde(default)]
    pub renew_automatically: bool,
    #[serde(skip)]
    pub date_expiry: Option<NaiveDate>,
    #[serde(skip)]
    pub in_cart: bool,
    #[serde(skip)]
    pub sold_via: Option<i64>,
}

/// A discount applied through a discount code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discount {
    Percentage(i16),
    Amount(Money),
}

/// A pass joined with everything its display and pricing depend on
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PassDetails {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub pass: Pass,
    pub pass_type_id: i64,
    pub pass_type_name: String,
    pub pricing_window_name: String,
    pub duration_name: String,
    pub duration: i16,
    pub price: Money,
    pub park_group_name: Option<String>,
    pub sold_via_name: Option<String>,
    pub cancellation_reason: Option<String>,
    pub datetime_cancelled: Option<DateTime<Utc>>,
    pub concession_type: Option<String>,
    pub concession_percentage: Option<i16>,
    pub discount_code: Option<String>,
    pub discount_code_percentage: Option<i16>,
    pub discount_code_amount: Option<Money>,
    pub voucher_credit: Option<Money>,
    pub voucher_debit: Option<Money>,
}

const DETAILS_SELECT: &str = r#"
    SELECT
        p.*,
        pt.id AS pass_type_id,
        pt.display_name AS pass_type_name,
        pw.name AS pricing_window_name,
        o.name AS duration_name,
        o.duration,
        o.price,
        pg.name AS park_group_name,
        rg.name AS sold_via_name,
        pc.cancellation_reason,
        pc.datetime_cancelled,
        c.concession_type,
        c.discount_percentage AS concession_percentage,
        dc.code AS discount_code,
        dc.discount_percentage AS discount_code_percentage,
        dc.discount_amount AS discount_code_amount,
        vt.credit AS voucher_credit,
        vt.debit AS voucher_debit
    FROM passes p
    JOIN pricing_window_options o ON o.id = p.option_id
    JOIN pricing_windows pw ON pw.id = o.pricing_window_id
    JOIN pass_types pt ON pt.id = pw.pass_type_id
    LEFT JOIN park_groups pg ON pg.id = p.park_group_id
    LEFT JOIN retailer_groups rg ON rg.id = p.sold_via
    LEFT JOIN pass_cancellations pc ON pc.pass_id = p.id
    LEFT JOIN concession_usages cu ON cu.pass_id = p.id
    LEFT JOIN concessions c ON c.id = cu.concession_id
    LEFT JOIN discount_code_usages dcu ON dcu.pass_id = p.id
    LEFT JOIN discount_codes dc ON dc.id = dcu.discount_code_id
    LEFT JOIN voucher_transactions vt ON vt.pass_id = p.id
"#;

impl PassDetails {
    pub fn is_cancelled(&self) -> bool {
        self.datetime_cancelled.is_some()
            || self.pass.processing_status.as_deref() == Some(PROCESSING_STATUS_CANCELLED)
    }

    pub fn discount(&self) -> Option<Discount> {
        match (self.discount_code_percentage, self.discount_code_amount) {
            (Some(percentage), _) => Some(Discount::Percentage(percentage)),
            (None, Some(amount)) => Some(Discount::Amount(amount)),
            (None, None) => None,
        }
    }

    pub async fn find(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!("{} WHERE p.id = $1", DETAILS_SELECT))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Purchased passes owned by a user, newest first
    pub async fn list_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            "{} WHERE p.user_id = $1 AND p.in_cart = FALSE ORDER BY p.datetime_created DESC",
            DETAILS_SELECT
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Passes waiting in a user's cart
    pub async fn list_in_cart<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            "{} WHERE p.user_id = $1 AND p.in_cart = TRUE ORDER BY p.datetime_created",
            DETAILS_SELECT
        ))
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            "{} WHERE p.in_cart = FALSE ORDER BY p.datetime_created DESC LIMIT $1",
            DETAILS_SELECT
        ))
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn list_sold_via(
        pool: &PgPool,
        retailer_group_id: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            "{} WHERE p.sold_via = $1 AND p.in_cart = FALSE ORDER BY p.datetime_created DESC LIMIT $2",
            DETAILS_SELECT
        ))
        .bind(retailer_group_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Purchased, uncancelled passes expiring on a date
    pub async fn list_expiring_on(pool: &PgPool, date: NaiveDate) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            "{} WHERE p.date_expiry = $1 AND p.in_cart = FALSE AND pc.id IS NULL ORDER BY p.id",
            DETAILS_SELECT
        ))
        .bind(date)
        .fetch_all(pool)
        .await
    }

    /// Purchased passes created on a date that still have no vehicle registered
    pub async fn list_missing_vehicle_created_on(
        pool: &PgPool,
        date: NaiveDate,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            r#"{} WHERE p.in_cart = FALSE AND pc.id IS NULL
                AND p.datetime_created::date = $1
                AND COALESCE(TRIM(p.vehicle_registration_1), '') = ''
                ORDER BY p.id"#,
            DETAILS_SELECT
        ))
        .bind(date)
        .fetch_all(pool)
        .await
    }

    /// Passes sold through a retailer group inside a date range (inclusive)
    pub async fn list_sold_via_between(
        pool: &PgPool,
        retailer_group_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            r#"{} WHERE p.sold_via = $1 AND p.in_cart = FALSE
                AND p.datetime_created::date BETWEEN $2 AND $3
                ORDER BY p.datetime_created"#,
            DETAILS_SELECT
        ))
        .bind(retailer_group_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }
}

impl Pass {
    /// Inserts a pass and assigns its pass number from the new row id
    pub async fn create_in(
        tx: &mut Transaction<'_, Postgres>,
        data: CreatePassData,
    ) -> Result<Self, sqlx::Error> {
        let date_start = data.date_start.unwrap_or_else(|| Utc::now().date_naive());
        let date_expiry = data.date_expiry.unwrap_or(date_start);

        let pass = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO passes (
                user_id, option_id, first_name, last_name, email, mobile, company,
                address_line_1, address_line_2, suburb, state, postcode, rac_member_number,
                vehicle_registration_1, vehicle_registration_2, drivers_licence_number,
                park_group_id, date_start, date_expiry, renew_automatically,
                processing_status, in_cart, sold_via
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, 'VA', $21, $22
            )
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(data.option_id)
        .bind(&data.first_name)
        .bind(&data.last_name)
        .bind(&data.email)
        .bind(&data.mobile)
        .bind(&data.company)
        .bind(&data.address_line_1)
        .bind(&data.address_line_2)
        .bind(&data.suburb)
        .bind(&data.state)
        .bind(&data.postcode)
        .bind(&data.rac_member_number)
        .bind(&data.vehicle_registration_1)
        .bind(&data.vehicle_registration_2)
        .bind(&data.drivers_licence_number)
        .bind(data.park_group_id)
        .bind(date_start)
        .bind(date_expiry)
        .bind(data.renew_automatically)
        .bind(data.in_cart)
        .bind(data.sold_via)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query_as::<_, Self>(
            r#"
            UPDATE passes SET pass_number = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(pass.id)
        .bind(crate::services::passes::pass_number_for(pass.id))
        .fetch_one(&mut **tx)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM passes WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_vehicles(
        pool: &PgPool,
        id: i64,
        vehicle_registration_1: Option<&str>,
        vehicle_registration_2: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE passes
            SET vehicle_registration_1 = $2,
                vehicle_registration_2 = $3,
                datetime_updated = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(vehicle_registration_1)
        .bind(vehicle_registration_2)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn set_renew_automatically(
        pool: &PgPool,
        id: i64,
        renew_automatically: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE passes
            SET renew_automatically = $2, datetime_updated = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(renew_automatically)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn set_renew_automatically_in(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        renew_automatically: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE passes
            SET renew_automatically = $2, datetime_updated = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(renew_automatically)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Takes a pass out of the cart as part of an order; false when it had already left
    pub async fn complete_purchase(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        sold_via: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE passes
            SET in_cart = FALSE,
                sold_via = COALESCE($2, sold_via),
                datetime_updated = NOW()
            WHERE id = $1 AND in_cart = TRUE
            "#,
        )
        .bind(id)
        .bind(sold_via)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_purchase_email_sent(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE passes SET purchase_email_sent = TRUE WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PassCancellation {
    pub id: i64,
    pub pass_id: i64,
    pub cancellation_reason: String,
    pub datetime_cancelled: DateTime<Utc>,
}

impl PassCancellation {
    /// Records a cancellation and marks the pass cancelled
    pub async fn create(pool: &PgPool, pass_id: i64, reason: &str) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let cancellation = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO pass_cancellations (pass_id, cancellation_reason)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(pass_id)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE passes SET processing_status = $2, datetime_updated = NOW() WHERE id = $1")
            .bind(pass_id)
            .bind(PROCESSING_STATUS_CANCELLED)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(cancellation)
    }

    /// Removes a cancellation; the pass becomes valid again
    pub async fn delete(pool: &PgPool, pass_id: i64) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM pass_cancellations WHERE pass_id = $1")
            .bind(pass_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("UPDATE passes SET processing_status = $2, datetime_updated = NOW() WHERE id = $1")
            .bind(pass_id)
            .bind(PROCESSING_STATUS_VALID)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DiscountCode {
    pub id: i64,
    pub code: String,
    pub discount_percentage: Option<i16>,
    pub discount_amount: Option<Money>,
    pub expiry: DateTime<Utc>,
}

impl DiscountCode {
    pub fn discount_display(&self) -> String {
        match (self.discount_percentage, self.discount_amount) {
            (Some(percentage), _) => format!("{}%", percentage),
            (None, Some(amount)) => amount.to_string(),
            (None, None) => "-".to_string(),
        }
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM discount_codes ORDER BY expiry DESC, code")
            .fetch_all(pool)
            .await
    }
}

impl DiscountCode {
    /// An unexpired discount code, matched case-insensitively
    pub async fn find_valid(
        pool: &PgPool,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM discount_codes
            WHERE UPPER(code) = UPPER($1) AND expiry > $2
            "#,
        )
        .bind(code)
        .bind(now)
        .fetch_optional(pool)
        .await
    }

    pub async fn record_usage(
        tx: &mut Transaction<'_, Postgres>,
        discount_code_id: i64,
        pass_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO discount_code_usages (pass_id, discount_code_id) VALUES ($1, $2)")
            .bind(pass_id)
            .bind(discount_code_id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Concession {
    pub id: i64,
    pub concession_type: String,
    pub discount_percentage: i16,
}

impl Concession {
    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM concessions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn record_usage(
        tx: &mut Transaction<'_, Postgres>,
        concession_id: i64,
        pass_id: i64,
        card_number: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO concession_usages (pass_id, concession_id, concession_card_number)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(pass_id)
        .bind(concession_id)
        .bind(card_number)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_codes_map_to_names() {
        assert_eq!(
            AustralianState::from_code("NSW").map(AustralianState::name),
            Some("New South Wales")
        );
        assert_eq!(
            AustralianState::from_code("NT").map(AustralianState::name),
            Some("Northern Territory")
        );
        assert_eq!(AustralianState::from_code("XX"), None);
        assert_eq!(AustralianState::Tasmania.code(), "TAS");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(PassStatus::Future.code(), "FU");
        assert_eq!(PassStatus::Cancelled.to_string(), "Cancelled");
    }
}

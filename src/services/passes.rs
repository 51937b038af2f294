use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::models::money::mul_div_round;
use crate::models::park_pass::{
    Concession, CreatePassData, Discount, DiscountCode, Pass, PassCancellation, PassDetails,
    PassStatus,
};
use crate::models::pass_type::PricingWindowOption;
use crate::models::voucher::VoucherTransaction;
use crate::models::Money;
use crate::services::vouchers::{self, VoucherError};

#[derive(thiserror::Error, Debug)]
pub enum PassError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Voucher error: {0}")]
    Voucher(#[from] VoucherError),

    #[error("Pass {0} not found")]
    NotFound(i64),

    #[error("Pricing option {0} not found")]
    OptionNotFound(i64),

    #[error("Concession {0} not found")]
    ConcessionNotFound(i64),

    #[error("A concession card number is required")]
    MissingConcessionCardNumber,

    #[error("The discount code is not valid")]
    InvalidDiscountCode,

    #[error("This pass is not set to renew automatically")]
    NotAutoRenewing,

    #[error("Automatic renewal cannot be cancelled within 24 hours of expiry")]
    TooLateToCancelRenewal,

    #[error("Vehicle details can no longer be changed for this pass")]
    VehicleUpdatesLocked,

    #[error("The pass has already been cancelled")]
    AlreadyCancelled,

    #[error("The pass has not been cancelled")]
    NotCancelled,

    #[error("First name, last name and email are required")]
    MissingHolderDetails,
}

impl PassError {
    /// Errors caused by the request rather than the system
    pub fn is_user_error(&self) -> bool {
        match self {
            PassError::Database(_) | PassError::NotFound(_) => false,
            PassError::Voucher(e) => e.is_user_error(),
            _ => true,
        }
    }
}

pub fn pass_number_for(id: i64) -> String {
    format!("PP{:06}", id)
}

pub fn expiry_for(date_start: NaiveDate, duration: i16) -> NaiveDate {
    date_start + Duration::days(i64::from(duration))
}

/// Status of a pass on `today`; cancellation outranks every date rule
pub fn status_on(
    cancelled: bool,
    date_start: NaiveDate,
    date_expiry: NaiveDate,
    today: NaiveDate,
) -> PassStatus {
    if cancelled {
        PassStatus::Cancelled
    } else if date_start > today {
        PassStatus::Future
    } else if date_expiry <= today {
        PassStatus::Expired
    } else {
        PassStatus::Current
    }
}

pub fn details_status_on(details: &PassDetails, today: NaiveDate) -> PassStatus {
    status_on(
        details.is_cancelled(),
        details.pass.date_start,
        details.pass.date_expiry,
        today,
    )
}

/// How a pass price is reached from the option price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
    pub option_price: Money,
    pub after_concession: Money,
    pub after_discount: Money,
    pub voucher_debit: Money,
    pub voucher_credit: Money,
    pub final_price: Money,
}

impl PriceBreakdown {
    pub fn compute(
        option_price: Money,
        concession_percentage: Option<i16>,
        discount: Option<Discount>,
        voucher_debit: Money,
        voucher_credit: Money,
    ) -> Self {
        let after_concession = match concession_percentage {
            Some(pct) => option_price.saturating_sub(option_price.percent(i64::from(pct))),
            None => option_price,
        };

        let after_discount = match discount {
            Some(Discount::Percentage(pct)) => {
                after_concession.saturating_sub(after_concession.percent(i64::from(pct)))
            }
            Some(Discount::Amount(amount)) => after_concession.saturating_sub(amount),
            None => after_concession,
        };

        let final_price = (after_discount.saturating_sub(voucher_debit) + voucher_credit)
            .max(Money::ZERO);

        Self {
            option_price,
            after_concession,
            after_discount,
            voucher_debit,
            voucher_credit,
            final_price,
        }
    }

    pub fn for_details(details: &PassDetails) -> Self {
        Self::compute(
            details.price,
            details.concession_percentage,
            details.discount(),
            details.voucher_debit.unwrap_or_default(),
            details.voucher_credit.unwrap_or_default(),
        )
    }
}

/// GST component of a GST-inclusive price
pub fn gst_included(price: Money, gst_percentage: i64) -> Money {
    price.scale(gst_percentage, 100 + gst_percentage)
}

/// Percentage of the price refundable if the pass were cancelled on `today`
pub fn pro_rata_refund_percentage(
    date_start: NaiveDate,
    date_expiry: NaiveDate,
    duration: i16,
    today: NaiveDate,
) -> i64 {
    if date_start >= today {
        return 100;
    }
    if date_expiry <= today || duration <= 0 {
        return 0;
    }
    let duration = i64::from(duration);
    let days_used = (today - date_start).num_days();
    mul_div_round(duration - days_used, 100, duration).clamp(0, 100)
}

pub fn pro_rata_refund_amount(final_price: Money, refund_percentage: i64) -> Money {
    final_price.percent(refund_percentage)
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RefundQuote {
    pub final_price: Money,
    pub refund_percentage: i64,
    pub refund_amount: Money,
}

pub fn refund_quote(details: &PassDetails, today: NaiveDate) -> RefundQuote {
    let final_price = PriceBreakdown::for_details(details).final_price;
    let refund_percentage = pro_rata_refund_percentage(
        details.pass.date_start,
        details.pass.date_expiry,
        details.duration,
        today,
    );
    RefundQuote {
        final_price,
        refund_percentage,
        refund_amount: pro_rata_refund_amount(final_price, refund_percentage),
    }
}

/// Automatic renewal can be stopped until 24 hours before the pass expires
pub fn can_cancel_automatic_renewal(pass: &Pass, now: DateTime<Utc>) -> Result<(), PassError> {
    if !pass.renew_automatically {
        return Err(PassError::NotAutoRenewing);
    }
    let expires_at = pass.date_expiry.and_time(chrono::NaiveTime::MIN).and_utc();
    if now + Duration::hours(24) >= expires_at {
        return Err(PassError::TooLateToCancelRenewal);
    }
    Ok(())
}

/// A pass purchase with optional price reductions
#[derive(Debug, Clone, Deserialize)]
pub struct NewPassRequest {
    #[serde(flatten)]
    pub pass: CreatePassData,
    pub concession_id: Option<i64>,
    pub concession_card_number: Option<String>,
    pub discount_code: Option<String>,
    pub voucher_email: Option<String>,
    pub voucher_code: Option<String>,
    pub voucher_pin: Option<String>,
}

/// Creates a pass in the cart, recording any concession, discount code and voucher used
#[tracing::instrument(skip(pool, request), fields(option_id = request.pass.option_id))]
pub async fn create_pass(
    pool: &PgPool,
    request: NewPassRequest,
    now: DateTime<Utc>,
) -> Result<PassDetails, PassError> {
    let NewPassRequest {
        pass: mut data,
        concession_id,
        concession_card_number,
        discount_code,
        voucher_email,
        voucher_code,
        voucher_pin,
    } = request;

    if data.first_name.trim().is_empty()
        || data.last_name.trim().is_empty()
        || !data.email.contains('@')
    {
        return Err(PassError::MissingHolderDetails);
    }

    let option = PricingWindowOption::find_by_id(pool, data.option_id)
        .await?
        .ok_or(PassError::OptionNotFound(data.option_id))?;

    let concession = match concession_id {
        Some(id) => {
            let concession = Concession::find_by_id(pool, id)
                .await?
                .ok_or(PassError::ConcessionNotFound(id))?;
            let card_number = concession_card_number
                .filter(|n| !n.trim().is_empty())
                .ok_or(PassError::MissingConcessionCardNumber)?;
            Some((concession, card_number))
        }
        None => None,
    };

    let discount_code = match discount_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => Some(
            DiscountCode::find_valid(pool, code, now)
                .await?
                .ok_or(PassError::InvalidDiscountCode)?,
        ),
        _ => None,
    };

    let voucher_credentials = match (voucher_email, voucher_code, voucher_pin) {
        (Some(email), Some(code), Some(pin)) if !code.trim().is_empty() => {
            Some((email, code, pin))
        }
        _ => None,
    };

    let date_start = data.date_start.unwrap_or_else(|| now.date_naive());
    data.date_start = Some(date_start);
    data.date_expiry = Some(expiry_for(date_start, option.duration));
    data.in_cart = true;

    let discount = discount_code.as_ref().and_then(|dc| {
        match (dc.discount_percentage, dc.discount_amount) {
            (Some(pct), _) => Some(Discount::Percentage(pct)),
            (None, Some(amount)) => Some(Discount::Amount(amount)),
            (None, None) => None,
        }
    });
    let before_voucher = PriceBreakdown::compute(
        option.price,
        concession.as_ref().map(|(c, _)| c.discount_percentage),
        discount,
        Money::ZERO,
        Money::ZERO,
    )
    .final_price;

    let mut tx = pool.begin().await?;
    let pass = Pass::create_in(&mut tx, data).await?;

    if let Some((concession, card_number)) = &concession {
        Concession::record_usage(&mut tx, concession.id, pass.id, card_number).await?;
    }
    if let Some(code) = &discount_code {
        DiscountCode::record_usage(&mut tx, code.id, pass.id).await?;
    }
    if let Some((email, code, pin)) = &voucher_credentials {
        // Balance is read under the row lock so two passes cannot spend the same credit
        let (voucher, balance) = vouchers::lock_redeemable(&mut tx, email, code, pin, now).await?;
        let debit = before_voucher.min(balance);
        VoucherTransaction::create(&mut tx, voucher.id, pass.id, Money::ZERO, debit).await?;
    }

    tx.commit().await?;

    tracing::info!(pass_id = pass.id, pass_number = ?pass.pass_number, "Pass added to cart");

    PassDetails::find(pool, pass.id)
        .await?
        .ok_or(PassError::NotFound(pass.id))
}

#[tracing::instrument(skip(pool))]
pub async fn cancel_automatic_renewal(
    pool: &PgPool,
    pass_id: i64,
    now: DateTime<Utc>,
) -> Result<(), PassError> {
    let pass = Pass::find_by_id(pool, pass_id)
        .await?
        .ok_or(PassError::NotFound(pass_id))?;

    can_cancel_automatic_renewal(&pass, now)?;
    Pass::set_renew_automatically(pool, pass_id, false).await?;

    tracing::info!(pass_id, "Automatic renewal cancelled");
    Ok(())
}

fn normalise_registration(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_uppercase())
        .filter(|v| !v.is_empty())
}

#[tracing::instrument(skip(pool))]
pub async fn update_vehicles(
    pool: &PgPool,
    pass_id: i64,
    vehicle_registration_1: Option<&str>,
    vehicle_registration_2: Option<&str>,
) -> Result<PassDetails, PassError> {
    let pass = Pass::find_by_id(pool, pass_id)
        .await?
        .ok_or(PassError::NotFound(pass_id))?;

    if pass.prevent_further_vehicle_updates {
        return Err(PassError::VehicleUpdatesLocked);
    }

    let first = normalise_registration(vehicle_registration_1);
    let second = normalise_registration(vehicle_registration_2);
    Pass::update_vehicles(pool, pass_id, first.as_deref(), second.as_deref()).await?;

    PassDetails::find(pool, pass_id)
        .await?
        .ok_or(PassError::NotFound(pass_id))
}

#[tracing::instrument(skip(pool))]
pub async fn cancel_pass(
    pool: &PgPool,
    pass_id: i64,
    reason: &str,
) -> Result<PassCancellation, PassError> {
    let details = PassDetails::find(pool, pass_id)
        .await?
        .ok_or(PassError::NotFound(pass_id))?;

    if details.is_cancelled() {
        return Err(PassError::AlreadyCancelled);
    }

    let cancellation = PassCancellation::create(pool, pass_id, reason.trim()).await?;
    tracing::info!(pass_id, "Pass cancelled");
    Ok(cancellation)
}

#[tracing::instrument(skip(pool))]
pub async fn reinstate_pass(pool: &PgPool, pass_id: i64) -> Result<(), PassError> {
    if !PassCancellation::delete(pool, pass_id).await? {
        return Err(PassError::NotCancelled);
    }
    tracing::info!(pass_id, "Pass cancellation removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pass(renew: bool, expiry: NaiveDate) -> Pass {
        Pass {
            id: 1,
            user_id: Some(1),
            option_id: 1,
            pass_number: Some("PP000001".to_string()),
            first_name: "Jo".to_string(),
            last_name: "Bloggs".to_string(),
            email: "jo@example.com".to_string(),
            mobile: "0400000000".to_string(),
            company: None,
            address_line_1: None,
            address_line_2: None,
            suburb: None,
            state: Some("WA".to_string()),
            postcode: None,
            rac_member_number: None,
            vehicle_registration_1: None,
            vehicle_registration_2: None,
            drivers_licence_number: None,
            park_group_id: None,
            date_start: date(2024, 1, 1),
            date_expiry: expiry,
            renew_automatically: renew,
            prevent_further_vehicle_updates: false,
            processing_status: Some("VA".to_string()),
            in_cart: false,
            purchase_email_sent: true,
            sold_via: None,
            datetime_created: Utc::now(),
            datetime_updated: Utc::now(),
        }
    }

    #[test]
    fn test_pass_number_and_expiry() {
        assert_eq!(pass_number_for(7), "PP000007");
        assert_eq!(expiry_for(date(2024, 12, 25), 14), date(2025, 1, 8));
        assert_eq!(expiry_for(date(2024, 1, 1), 366), date(2025, 1, 1));
    }

    #[test]
    fn test_status_on() {
        let start = date(2024, 6, 1);
        let expiry = date(2024, 6, 15);

        assert_eq!(status_on(false, start, expiry, date(2024, 5, 31)), PassStatus::Future);
        assert_eq!(status_on(false, start, expiry, start), PassStatus::Current);
        assert_eq!(status_on(false, start, expiry, date(2024, 6, 14)), PassStatus::Current);
        assert_eq!(status_on(false, start, expiry, expiry), PassStatus::Expired);
        assert_eq!(status_on(true, start, expiry, date(2024, 6, 5)), PassStatus::Cancelled);
    }

    #[test]
    fn test_price_pipeline() {
        let breakdown = PriceBreakdown::compute(
            Money(10000),
            Some(25),
            Some(Discount::Percentage(10)),
            Money(2000),
            Money::ZERO,
        );

        assert_eq!(breakdown.after_concession, Money(7500));
        assert_eq!(breakdown.after_discount, Money(6750));
        assert_eq!(breakdown.final_price, Money(4750));
        assert_eq!(breakdown.final_price.to_string(), "$47.50");
    }

    #[test]
    fn test_price_never_below_zero() {
        let breakdown = PriceBreakdown::compute(
            Money(1500),
            None,
            Some(Discount::Amount(Money(2000))),
            Money::ZERO,
            Money::ZERO,
        );
        assert_eq!(breakdown.after_discount, Money::ZERO);

        let breakdown = PriceBreakdown::compute(Money(1500), None, None, Money(5000), Money::ZERO);
        assert_eq!(breakdown.final_price, Money::ZERO);
    }

    #[test]
    fn test_voucher_credit_is_added_back() {
        let breakdown = PriceBreakdown::compute(Money(1500), None, None, Money(1500), Money(500));
        assert_eq!(breakdown.final_price, Money(500));
    }

    #[test]
    fn test_gst_included() {
        assert_eq!(gst_included(Money(11000), 10), Money(1000));
        // $15.00 * 10 / 110 = $1.3636..
        assert_eq!(gst_included(Money(1500), 10), Money(136));
        assert_eq!(gst_included(Money::ZERO, 10), Money::ZERO);
    }

    #[test]
    fn test_pro_rata_refund_percentage() {
        let start = date(2024, 1, 1);
        let expiry = expiry_for(start, 365);

        assert_eq!(pro_rata_refund_percentage(start, expiry, 365, date(2023, 12, 1)), 100);
        assert_eq!(pro_rata_refund_percentage(start, expiry, 365, start), 100);
        assert_eq!(pro_rata_refund_percentage(start, expiry, 365, expiry), 0);
        // 91 days used: 274 * 100 / 365 = 75.07
        assert_eq!(pro_rata_refund_percentage(start, expiry, 365, date(2024, 4, 1)), 75);
        assert_eq!(pro_rata_refund_amount(Money(9000), 75), Money(6750));
    }

    #[test]
    fn test_refund_percentage_ties_round_to_even() {
        let start = date(2024, 1, 1);
        let expiry = expiry_for(start, 8);

        // 5 of 8 days left is 62.5%
        assert_eq!(pro_rata_refund_percentage(start, expiry, 8, date(2024, 1, 4)), 62);
        // 3 of 8 days left is 37.5%
        assert_eq!(pro_rata_refund_percentage(start, expiry, 8, date(2024, 1, 6)), 38);
        // $0.50 at 25% is 12.5c
        assert_eq!(pro_rata_refund_amount(Money(50), 25), Money(12));
    }

    #[test]
    fn test_cancel_automatic_renewal_rules() {
        let expiry = date(2024, 6, 15);
        let early = Utc.with_ymd_and_hms(2024, 6, 13, 23, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 6, 14, 1, 0, 0).unwrap();

        assert!(can_cancel_automatic_renewal(&pass(true, expiry), early).is_ok());
        assert!(matches!(
            can_cancel_automatic_renewal(&pass(true, expiry), late),
            Err(PassError::TooLateToCancelRenewal)
        ));
        assert!(matches!(
            can_cancel_automatic_renewal(&pass(false, expiry), early),
            Err(PassError::NotAutoRenewing)
        ));
    }

    #[test]
    fn test_registration_normalised() {
        assert_eq!(normalise_registration(Some(" 1abc234 ")), Some("1ABC234".to_string()));
        assert_eq!(normalise_registration(Some("  ")), None);
        assert_eq!(normalise_registration(None), None);
    }

    #[test]
    fn test_user_errors() {
        assert!(PassError::VehicleUpdatesLocked.is_user_error());
        assert!(!PassError::NotFound(1).is_user_error());
        assert!(PassError::Voucher(VoucherError::InvalidCredentials).is_user_error());
    }
}

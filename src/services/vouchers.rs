use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::voucher::{CreateVoucherData, Voucher, VoucherTransaction};
use crate::models::Money;

const CODE_ATTEMPTS: usize = 10;

#[derive(thiserror::Error, Debug)]
pub enum VoucherError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Voucher {0} not found")]
    NotFound(i64),

    #[error("The voucher code, pin or email address is not valid")]
    InvalidCredentials,

    #[error("The voucher has expired")]
    Expired,

    #[error("The voucher has no remaining balance")]
    NoBalance,

    #[error("Voucher amount must be greater than zero")]
    InvalidAmount,

    #[error("A valid recipient email address is required")]
    InvalidRecipientEmail,

    #[error("Remaining balance {balance} is greater than the voucher amount {amount}")]
    BalanceAboveAmount { balance: Money, amount: Money },

    #[error("Remaining balance {0} is below zero")]
    NegativeBalance(Money),

    #[error("Could not generate a unique voucher code")]
    CodeGenerationFailed,
}

impl VoucherError {
    /// Errors caused by the request rather than the system
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            VoucherError::InvalidCredentials
                | VoucherError::Expired
                | VoucherError::NoBalance
                | VoucherError::InvalidAmount
                | VoucherError::InvalidRecipientEmail
        )
    }
}

pub fn voucher_number_for(id: i64) -> String {
    format!("V{:06}", id)
}

/// First eight characters of an upper-cased UUIDv4
pub fn generate_code() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()[..8].to_string()
}

/// Six random digits, zero padded
pub fn generate_pin() -> Result<String, VoucherError> {
    let mut bytes = [0u8; 4];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| VoucherError::CodeGenerationFailed)?;
    Ok(format!("{:06}", u32::from_be_bytes(bytes) % 1_000_000))
}

async fn unique_code(pool: &PgPool) -> Result<String, VoucherError> {
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_code();
        if !Voucher::code_exists(pool, &code).await? {
            return Ok(code);
        }
    }
    Err(VoucherError::CodeGenerationFailed)
}

/// `amount + credits - debits`, rejecting balances outside `0..=amount`
pub fn remaining_balance(
    amount: Money,
    transactions: &[VoucherTransaction],
) -> Result<Money, VoucherError> {
    let balance = transactions
        .iter()
        .fold(amount, |balance, t| balance + t.credit - t.debit);

    if balance > amount {
        return Err(VoucherError::BalanceAboveAmount { balance, amount });
    }
    if balance < Money::ZERO {
        return Err(VoucherError::NegativeBalance(balance));
    }
    Ok(balance)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoucherValidation {
    pub is_voucher_code_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_remaining: Option<Money>,
}

impl VoucherValidation {
    pub fn invalid() -> Self {
        Self {
            is_voucher_code_valid: false,
            balance_remaining: None,
        }
    }
}

/// Locks the matching voucher for the rest of `tx` and returns it with its balance.
/// Expired and spent vouchers are rejected here, at the point of redemption.
pub async fn lock_redeemable(
    tx: &mut Transaction<'_, Postgres>,
    email: &str,
    code: &str,
    pin: &str,
    now: DateTime<Utc>,
) -> Result<(Voucher, Money), VoucherError> {
    let voucher = Voucher::lock_redeemable(tx, email.trim(), code.trim(), pin.trim())
        .await?
        .ok_or(VoucherError::InvalidCredentials)?;

    if voucher.has_expired(now) {
        return Err(VoucherError::Expired);
    }

    let transactions = VoucherTransaction::list_by_voucher(&mut **tx, voucher.id).await?;
    let balance = remaining_balance(voucher.amount, &transactions)?;
    if balance.is_zero() {
        return Err(VoucherError::NoBalance);
    }

    Ok((voucher, balance))
}

/// Checks voucher credentials for the checkout form.
///
/// Any delivered, purchased voucher matching all three credentials is valid and
/// reports its balance; expiry and a zero balance are left to redemption.
#[tracing::instrument(skip(pool, pin))]
pub async fn validate_voucher(
    pool: &PgPool,
    email: &str,
    code: &str,
    pin: &str,
) -> Result<VoucherValidation, VoucherError> {
    let (email, code, pin) = (email.trim(), code.trim(), pin.trim());
    if email.is_empty() || code.is_empty() || pin.is_empty() {
        return Ok(VoucherValidation::invalid());
    }

    let Some(voucher) = Voucher::find_redeemable(pool, email, code, pin).await? else {
        tracing::debug!("Voucher credentials did not match");
        return Ok(VoucherValidation::invalid());
    };

    let transactions = VoucherTransaction::list_by_voucher(pool, voucher.id).await?;
    Ok(VoucherValidation {
        is_voucher_code_valid: true,
        balance_remaining: Some(remaining_balance(voucher.amount, &transactions)?),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseVoucherRequest {
    pub recipient_name: String,
    pub recipient_email: String,
    pub datetime_to_email: Option<DateTime<Utc>>,
    #[serde(default)]
    pub personal_message: String,
    pub amount: Money,
}

/// Creates a voucher in the purchaser's cart
#[tracing::instrument(skip(pool, request), fields(amount = %request.amount))]
pub async fn purchase_voucher(
    pool: &PgPool,
    purchaser_id: Option<i64>,
    request: PurchaseVoucherRequest,
    expiry_days: i64,
    now: DateTime<Utc>,
) -> Result<Voucher, VoucherError> {
    if request.amount <= Money::ZERO {
        return Err(VoucherError::InvalidAmount);
    }
    let recipient_email = request.recipient_email.trim();
    if !recipient_email.contains('@') {
        return Err(VoucherError::InvalidRecipientEmail);
    }

    let voucher = Voucher::create(
        pool,
        CreateVoucherData {
            purchaser_id,
            recipient_name: request.recipient_name.trim().to_string(),
            recipient_email: recipient_email.to_string(),
            datetime_to_email: request.datetime_to_email.unwrap_or(now),
            personal_message: request.personal_message,
            amount: request.amount,
            expiry: now + Duration::days(expiry_days),
            code: unique_code(pool).await?,
            pin: generate_pin()?,
        },
    )
    .await?;

    tracing::info!(voucher_id = voucher.id, "Voucher added to cart");

    Ok(voucher)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction(credit: i64, debit: i64) -> VoucherTransaction {
        VoucherTransaction {
            pass_id: 1,
            voucher_id: 1,
            credit: Money(credit),
            debit: Money(debit),
            datetime_created: Utc::now(),
        }
    }

    #[test]
    fn test_voucher_number() {
        assert_eq!(voucher_number_for(42), "V000042");
        assert_eq!(voucher_number_for(1234567), "V1234567");
    }

    #[test]
    fn test_generated_code_shape() {
        let code = generate_code();
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generated_pin_shape() {
        let pin = generate_pin().unwrap();
        assert_eq!(pin.len(), 6);
        assert!(pin.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_remaining_balance() {
        let amount = Money(10000);
        assert_eq!(remaining_balance(amount, &[]).unwrap(), amount);
        assert_eq!(
            remaining_balance(amount, &[transaction(0, 3000), transaction(0, 2500)]).unwrap(),
            Money(4500)
        );
        assert_eq!(
            remaining_balance(amount, &[transaction(0, 3000), transaction(1000, 0)]).unwrap(),
            Money(8000)
        );
    }

    #[test]
    fn test_remaining_balance_out_of_range() {
        let amount = Money(10000);
        assert!(matches!(
            remaining_balance(amount, &[transaction(500, 0)]),
            Err(VoucherError::BalanceAboveAmount { .. })
        ));
        assert!(matches!(
            remaining_balance(amount, &[transaction(0, 10001)]),
            Err(VoucherError::NegativeBalance(_))
        ));
    }

    #[test]
    fn test_invalid_validation_omits_balance() {
        let json = serde_json::to_value(VoucherValidation::invalid()).unwrap();
        assert_eq!(json, serde_json::json!({ "is_voucher_code_valid": false }));

        let valid = VoucherValidation {
            is_voucher_code_valid: true,
            balance_remaining: Some(Money(2500)),
        };
        let json = serde_json::to_value(valid).unwrap();
        assert_eq!(json["is_voucher_code_valid"], true);
        assert!(json.get("balance_remaining").is_some());
    }

    #[test]
    fn test_user_errors() {
        assert!(VoucherError::InvalidCredentials.is_user_error());
        assert!(!VoucherError::CodeGenerationFailed.is_user_error());
    }
}

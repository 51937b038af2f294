use sqlx::{PgPool, Postgres, Transaction};

use crate::models::order::Order;
use crate::models::{Money, Pass, PassDetails, RetailerGroup, Voucher};
use crate::services::emails::EmailContext;
use crate::services::mailer::Mailer;
use crate::services::passes::PriceBreakdown;

#[derive(thiserror::Error, Debug)]
pub enum OrderError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("This order has already been completed")]
    AlreadyCompleted,

    #[error("Online payment is not available; only retailer sales and free orders can be completed")]
    PaymentRequired,
}

impl OrderError {
    pub fn is_user_error(&self) -> bool {
        !matches!(self, OrderError::Database(_))
    }
}

/// Everything waiting in a user's cart
#[derive(Debug, Clone, Default)]
pub struct Cart {
    pub passes: Vec<PassDetails>,
    pub vouchers: Vec<Voucher>,
}

impl Cart {
    pub async fn load(pool: &PgPool, user_id: i64) -> Result<Self, sqlx::Error> {
        Ok(Self {
            passes: PassDetails::list_in_cart(pool, user_id).await?,
            vouchers: Voucher::list_by_purchaser(pool, user_id, true).await?,
        })
    }

    /// Reads the cart inside the transaction that completes it
    pub async fn load_in(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> Result<Self, sqlx::Error> {
        Ok(Self {
            passes: PassDetails::list_in_cart(&mut **tx, user_id).await?,
            vouchers: Voucher::list_by_purchaser(&mut **tx, user_id, true).await?,
        })
    }

    pub fn item_count(&self) -> u32 {
        (self.passes.len() + self.vouchers.len()) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty() && self.vouchers.is_empty()
    }

    pub fn total(&self) -> Money {
        let passes: Money = self
            .passes
            .iter()
            .map(|p| PriceBreakdown::for_details(p).final_price)
            .sum();
        let vouchers: Money = self.vouchers.iter().map(|v| v.amount).sum();
        passes + vouchers
    }

    /// Orders can complete without payment for retailer sales or when nothing is owed
    pub fn can_complete_without_payment(&self, retailer: Option<&RetailerGroup>) -> bool {
        retailer.is_some() || self.total().is_zero()
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutResult {
    pub order: Order,
    pub pass_count: usize,
    pub voucher_count: usize,
    pub total: Money,
}

/// Completes the cart as an order and emails each pass holder
#[tracing::instrument(skip(pool, mailer, emails, retailer, default_sold_via))]
pub async fn checkout(
    pool: &PgPool,
    mailer: &Mailer,
    emails: &EmailContext,
    user_id: i64,
    retailer: Option<&RetailerGroup>,
    default_sold_via: &str,
) -> Result<CheckoutResult, OrderError> {
    let sold_via = match retailer {
        Some(group) => Some(group.id),
        None => RetailerGroup::find_by_name(pool, default_sold_via)
            .await?
            .map(|g| g.id),
    };

    let mut tx = pool.begin().await?;
    let cart = Cart::load_in(&mut tx, user_id).await?;

    if cart.is_empty() {
        return Err(OrderError::EmptyCart);
    }
    if !cart.can_complete_without_payment(retailer) {
        return Err(OrderError::PaymentRequired);
    }

    let order = Order::create(&mut tx, Some(user_id), retailer.map(|g| g.id)).await?;

    for details in &cart.passes {
        let description = format!(
            "{} ({}) {}",
            details.pass_type_name,
            details.duration_name,
            details.pass.pass_number.as_deref().unwrap_or_default()
        );
        let amount = PriceBreakdown::for_details(details).final_price;
        Order::add_item(&mut tx, order.id, &description, amount).await?;
        if !Pass::complete_purchase(&mut tx, details.pass.id, sold_via).await? {
            return Err(OrderError::AlreadyCompleted);
        }
    }

    for voucher in &cart.vouchers {
        let description = format!(
            "Voucher {} for {}",
            voucher.voucher_number.as_deref().unwrap_or_default(),
            voucher.recipient_name
        );
        Order::add_item(&mut tx, order.id, &description, voucher.amount).await?;
        if !Voucher::complete_purchase(&mut tx, voucher.id).await? {
            return Err(OrderError::AlreadyCompleted);
        }
    }

    tx.commit().await?;

    tracing::info!(
        order_id = order.id,
        passes = cart.passes.len(),
        vouchers = cart.vouchers.len(),
        total = %cart.total(),
        "Order completed"
    );

    for details in &cart.passes {
        if let Err(e) = send_purchase_email(pool, mailer, emails, details.pass.id).await {
            tracing::error!(pass_id = details.pass.id, error = %e, "Failed to send pass purchase email");
        }
    }

    Ok(CheckoutResult {
        order,
        pass_count: cart.passes.len(),
        voucher_count: cart.vouchers.len(),
        total: cart.total(),
    })
}

async fn send_purchase_email(
    pool: &PgPool,
    mailer: &Mailer,
    emails: &EmailContext,
    pass_id: i64,
) -> anyhow::Result<()> {
    let details = PassDetails::find(pool, pass_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("pass {} disappeared after checkout", pass_id))?;

    mailer.send(&emails.pass_purchased(&details)?).await?;
    Pass::mark_purchase_email_sent(pool, pass_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cart_with(price: i64, discount_percentage: Option<i16>) -> Cart {
        let mut details = crate::services::emails::tests::details();
        details.price = Money(price);
        details.discount_code_percentage = discount_percentage;
        Cart {
            passes: vec![details],
            vouchers: Vec::new(),
        }
    }

    fn retailer() -> RetailerGroup {
        RetailerGroup {
            id: 4,
            name: "Visitor Centre".to_string(),
            commission_basis_points: 1000,
            datetime_created: Utc::now(),
        }
    }

    #[test]
    fn test_total_uses_final_prices() {
        assert_eq!(cart_with(6000, Some(25)).total(), Money(4500));
        assert_eq!(cart_with(6000, None).item_count(), 1);
    }

    #[test]
    fn test_payment_rules() {
        assert!(!cart_with(6000, None).can_complete_without_payment(None));
        assert!(cart_with(6000, None).can_complete_without_payment(Some(&retailer())));
        assert!(cart_with(6000, Some(100)).can_complete_without_payment(None));
    }

    #[test]
    fn test_repeat_checkout_is_reported_to_the_user() {
        assert!(OrderError::EmptyCart.is_user_error());
        assert!(OrderError::AlreadyCompleted.is_user_error());
        assert!(!OrderError::Database(sqlx::Error::PoolClosed).is_user_error());
    }

    #[test]
    fn test_empty_cart() {
        let cart = Cart::default();
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Money::ZERO);
    }
}

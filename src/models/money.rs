use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

/// An amount in Australian cents.
///
/// Stored as `BIGINT`. Every division rounds half to even, matching the
/// decimal arithmetic the finance system uses.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Money(pub i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn from_dollars(dollars: i64) -> Self {
        Money(dollars * 100)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `self * numerator / denominator`, rounded to the nearest cent
    pub fn scale(self, numerator: i64, denominator: i64) -> Money {
        Money(mul_div_round(self.0, numerator, denominator))
    }

    /// The given whole percentage of this amount
    pub fn percent(self, percentage: i64) -> Money {
        self.scale(percentage, 100)
    }

    /// Subtraction that stops at zero
    pub fn saturating_sub(self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }
}

/// Integer `value * numerator / denominator` rounded half to even
pub fn mul_div_round(value: i64, numerator: i64, denominator: i64) -> i64 {
    debug_assert!(denominator != 0);
    let product = i128::from(value) * i128::from(numerator);
    let denominator = i128::from(denominator);
    let negative = (product < 0) != (denominator < 0);
    let (p, d) = (product.abs(), denominator.abs());

    let (quotient, remainder) = (p / d, p % d);
    let rounded = match (2 * remainder).cmp(&d) {
        std::cmp::Ordering::Less => quotient,
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal => quotient + (quotient % 2),
    };
    let signed = if negative { -rounded } else { rounded };
    signed as i64
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}${}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money(0).to_string(), "$0.00");
        assert_eq!(Money(5).to_string(), "$0.05");
        assert_eq!(Money(12550).to_string(), "$125.50");
        assert_eq!(Money(-120).to_string(), "-$1.20");
    }

    #[test]
    fn test_rounding_half_to_even() {
        assert_eq!(mul_div_round(5, 1, 2), 2);
        assert_eq!(mul_div_round(7, 1, 2), 4);
        assert_eq!(mul_div_round(-5, 1, 2), -2);
        assert_eq!(mul_div_round(-7, 1, 2), -4);
        assert_eq!(mul_div_round(4, 1, 3), 1);
        assert_eq!(mul_div_round(5, 1, 3), 2);
        assert_eq!(Money(1999).percent(15), Money(300));
    }

    #[test]
    fn test_percent_ties_round_to_even_cent() {
        // 50 * 5% = 2.5c, 70 * 5% = 3.5c
        assert_eq!(Money(50).percent(5), Money(2));
        assert_eq!(Money(70).percent(5), Money(4));
    }

    #[test]
    fn test_saturating_sub_stops_at_zero() {
        assert_eq!(Money(500).saturating_sub(Money(800)), Money::ZERO);
        assert_eq!(Money(800).saturating_sub(Money(500)), Money(300));
    }

    #[test]
    fn test_sum() {
        let total: Money = [Money(100), Money(250), Money(5)].into_iter().sum();
        assert_eq!(total, Money(355));
    }
}

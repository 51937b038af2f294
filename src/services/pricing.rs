use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::PgPool;

use crate::models::pass_type::{
    PassType, PricingWindow, PricingWindowOption, DEFAULT_PRICING_WINDOW_NAME,
};
use crate::models::Money;

#[derive(thiserror::Error, Debug)]
pub enum PricingError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Pass type {0} not found")]
    PassTypeNotFound(i64),

    #[error("There is no default pricing window for this pass type")]
    NoDefaultPricingWindow,

    #[error("A default pricing window already exists for this pass type")]
    DefaultWindowExists,

    #[error("The default pricing window must not start in the future")]
    DefaultWindowStartsInFuture,

    #[error("The start date must be before the expiry date")]
    StartNotBeforeExpiry,

    #[error("The expiry date must be in the future")]
    ExpiryNotInFuture,

    #[error("Pricing window options must match the default window's options")]
    OptionsDoNotMatchDefault,

    #[error("A pricing window needs at least one option")]
    NoOptions,
}

impl PricingError {
    /// Errors caused by the request rather than the system
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            PricingError::Database(_) | PricingError::PassTypeNotFound(_)
        )
    }
}

/// Picks the pricing window in force on `today`.
///
/// A pass type with a single window uses it. Otherwise the non-default
/// windows covering `today` win over the default; when several overlap the
/// one that started most recently is used.
pub fn select_current_window(
    windows: &[PricingWindow],
    today: NaiveDate,
) -> Result<&PricingWindow, PricingError> {
    match windows {
        [] => return Err(PricingError::NoDefaultPricingWindow),
        [only] => return Ok(only),
        _ => {}
    }

    let covering: Vec<&PricingWindow> = windows.iter().filter(|w| w.covers(today)).collect();

    match covering.as_slice() {
        [] => windows
            .iter()
            .find(|w| w.is_default())
            .ok_or(PricingError::NoDefaultPricingWindow),
        [window] => Ok(*window),
        several => {
            tracing::warn!(
                pass_type_id = several[0].pass_type_id,
                count = several.len(),
                "Overlapping pricing windows, using the latest to start"
            );
            several
                .iter()
                .copied()
                .max_by_key(|w| (w.date_start, w.id))
                .ok_or(PricingError::NoDefaultPricingWindow)
        }
    }
}

/// Checks a window's dates before it is saved
pub fn validate_window(
    window: &PricingWindow,
    other_default_exists: bool,
    today: NaiveDate,
) -> Result<(), PricingError> {
    match window.date_expiry {
        None => {
            if other_default_exists {
                return Err(PricingError::DefaultWindowExists);
            }
            if window.date_start > today {
                return Err(PricingError::DefaultWindowStartsInFuture);
            }
        }
        Some(expiry) => {
            if window.date_start >= expiry {
                return Err(PricingError::StartNotBeforeExpiry);
            }
            if expiry <= today {
                return Err(PricingError::ExpiryNotInFuture);
            }
        }
    }
    Ok(())
}

/// A non-default window must offer the same (name, duration) options as the default
pub fn window_matches_default(
    options: &[PricingWindowOption],
    default_options: &[PricingWindowOption],
) -> bool {
    let key = |options: &[PricingWindowOption]| {
        let mut pairs: Vec<(String, i16)> = options
            .iter()
            .map(|o| (o.name.clone(), o.duration))
            .collect();
        pairs.sort();
        pairs
    };
    key(options) == key(default_options)
}

/// Validates a non-default window's options against the default window
pub fn validate_window_options(
    window: &PricingWindow,
    options: &[PricingWindowOption],
    default_options: &[PricingWindowOption],
) -> Result<(), PricingError> {
    if window.is_default() || window_matches_default(options, default_options) {
        Ok(())
    } else {
        Err(PricingError::OptionsDoNotMatchDefault)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWindowOption {
    pub name: String,
    pub duration: i16,
    pub price: Money,
}

/// A pricing window with its options; no expiry makes it the default window
#[derive(Debug, Clone, Deserialize)]
pub struct NewPricingWindow {
    #[serde(default)]
    pub name: String,
    pub date_start: NaiveDate,
    pub date_expiry: Option<NaiveDate>,
    pub options: Vec<NewWindowOption>,
}

/// Validates and saves a pricing window and its options in one transaction
#[tracing::instrument(skip(pool, new), fields(date_start = %new.date_start))]
pub async fn add_pricing_window(
    pool: &PgPool,
    pass_type_id: i64,
    new: NewPricingWindow,
    today: NaiveDate,
) -> Result<(PricingWindow, Vec<PricingWindowOption>), PricingError> {
    PassType::find_by_id(pool, pass_type_id)
        .await?
        .ok_or(PricingError::PassTypeNotFound(pass_type_id))?;

    if new.options.is_empty() {
        return Err(PricingError::NoOptions);
    }

    let name = match new.name.trim() {
        "" if new.date_expiry.is_none() => DEFAULT_PRICING_WINDOW_NAME.to_string(),
        name => name.to_string(),
    };
    let candidate = PricingWindow {
        id: 0,
        name,
        pass_type_id,
        date_start: new.date_start,
        date_expiry: new.date_expiry,
    };

    let existing = PricingWindow::list_by_pass_type(pool, pass_type_id).await?;
    let default = existing.iter().find(|w| w.is_default());
    validate_window(&candidate, default.is_some(), today)?;

    let mut tx = pool.begin().await?;
    let window = PricingWindow::insert(
        &mut tx,
        &candidate.name,
        pass_type_id,
        candidate.date_start,
        candidate.date_expiry,
    )
    .await?;

    let mut options = Vec::with_capacity(new.options.len());
    for option in &new.options {
        options.push(
            PricingWindowOption::insert(
                &mut tx,
                window.id,
                option.name.trim(),
                option.duration,
                option.price,
            )
            .await?,
        );
    }

    if !window.is_default() {
        let default = default.ok_or(PricingError::NoDefaultPricingWindow)?;
        let default_options = PricingWindowOption::list_by_window(pool, default.id).await?;
        validate_window_options(&window, &options, &default_options)?;
    }

    tx.commit().await?;

    tracing::info!(window_id = window.id, pass_type_id, "Pricing window added");

    Ok((window, options))
}

/// The purchasable options of a pass type on `today`
#[tracing::instrument(skip(pool))]
pub async fn current_options(
    pool: &PgPool,
    pass_type_id: i64,
    today: NaiveDate,
) -> Result<(PricingWindow, Vec<PricingWindowOption>), PricingError> {
    PassType::find_by_id(pool, pass_type_id)
        .await?
        .ok_or(PricingError::PassTypeNotFound(pass_type_id))?;

    let windows = PricingWindow::list_by_pass_type(pool, pass_type_id).await?;
    let window = select_current_window(&windows, today)?.clone();
    let options = PricingWindowOption::list_by_window(pool, window.id).await?;

    tracing::debug!(window = %window.name, options = options.len(), "Resolved pricing window");

    Ok((window, options))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn window(id: i64, start: NaiveDate, expiry: Option<NaiveDate>) -> PricingWindow {
        PricingWindow {
            id,
            name: format!("Window {}", id),
            pass_type_id: 1,
            date_start: start,
            date_expiry: expiry,
        }
    }

    fn option(name: &str, duration: i16, price: i64) -> PricingWindowOption {
        PricingWindowOption {
            id: 0,
            pricing_window_id: 0,
            name: name.to_string(),
            duration,
            price: Money(price),
        }
    }

    #[test]
    fn test_no_windows_is_an_error() {
        let result = select_current_window(&[], date(2024, 6, 1));
        assert!(matches!(result, Err(PricingError::NoDefaultPricingWindow)));
    }

    #[test]
    fn test_single_window_is_used() {
        let windows = [window(7, date(2024, 1, 1), None)];
        let selected = select_current_window(&windows, date(2024, 6, 1)).unwrap();
        assert_eq!(selected.id, 7);
    }

    #[test]
    fn test_default_used_when_nothing_covers_today() {
        let windows = [
            window(1, date(2020, 1, 1), None),
            window(2, date(2024, 12, 1), Some(date(2025, 2, 28))),
        ];
        let selected = select_current_window(&windows, date(2024, 6, 1)).unwrap();
        assert_eq!(selected.id, 1);
    }

    #[test]
    fn test_covering_window_beats_default() {
        let windows = [
            window(1, date(2020, 1, 1), None),
            window(2, date(2024, 12, 1), Some(date(2025, 2, 28))),
        ];
        let selected = select_current_window(&windows, date(2025, 2, 28)).unwrap();
        assert_eq!(selected.id, 2);
    }

    #[test]
    fn test_latest_start_wins_when_windows_overlap() {
        let windows = [
            window(1, date(2020, 1, 1), None),
            window(2, date(2024, 12, 1), Some(date(2025, 2, 28))),
            window(3, date(2024, 12, 20), Some(date(2025, 1, 10))),
        ];
        let selected = select_current_window(&windows, date(2025, 1, 1)).unwrap();
        assert_eq!(selected.id, 3);
    }

    #[test]
    fn test_missing_default_is_an_error() {
        let windows = [
            window(2, date(2024, 12, 1), Some(date(2025, 2, 28))),
            window(3, date(2025, 3, 1), Some(date(2025, 4, 30))),
        ];
        let result = select_current_window(&windows, date(2024, 6, 1));
        assert!(matches!(result, Err(PricingError::NoDefaultPricingWindow)));
    }

    #[test]
    fn test_validate_default_window() {
        let today = date(2024, 6, 1);
        let default = window(1, date(2024, 1, 1), None);

        assert!(validate_window(&default, false, today).is_ok());
        assert!(matches!(
            validate_window(&default, true, today),
            Err(PricingError::DefaultWindowExists)
        ));
        assert!(matches!(
            validate_window(&window(1, date(2024, 7, 1), None), false, today),
            Err(PricingError::DefaultWindowStartsInFuture)
        ));
    }

    #[test]
    fn test_validate_dated_window() {
        let today = date(2024, 6, 1);

        assert!(validate_window(&window(2, date(2024, 7, 1), Some(date(2024, 8, 1))), false, today).is_ok());
        assert!(matches!(
            validate_window(&window(2, date(2024, 8, 1), Some(date(2024, 8, 1))), false, today),
            Err(PricingError::StartNotBeforeExpiry)
        ));
        assert!(matches!(
            validate_window(&window(2, date(2024, 1, 1), Some(date(2024, 6, 1))), false, today),
            Err(PricingError::ExpiryNotInFuture)
        ));
    }

    #[test]
    fn test_pricing_user_errors() {
        assert!(PricingError::DefaultWindowExists.is_user_error());
        assert!(PricingError::NoOptions.is_user_error());
        assert!(!PricingError::PassTypeNotFound(3).is_user_error());
    }

    #[test]
    fn test_options_must_match_default() {
        let default_options = [option("5 days", 5, 1500), option("14 days", 14, 4000)];
        let same = [option("14 days", 14, 3000), option("5 days", 5, 1000)];
        let different = [option("5 days", 5, 1000)];

        assert!(window_matches_default(&same, &default_options));
        assert!(!window_matches_default(&different, &default_options));

        let dated = window(2, date(2024, 7, 1), Some(date(2024, 8, 1)));
        assert!(matches!(
            validate_window_options(&dated, &different, &default_options),
            Err(PricingError::OptionsDoNotMatchDefault)
        ));
        let default = window(1, date(2024, 1, 1), None);
        assert!(validate_window_options(&default, &different, &default_options).is_ok());
    }
}

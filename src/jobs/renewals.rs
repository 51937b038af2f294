use chrono::NaiveDate;

use crate::jobs::{JobContext, JobError};
use crate::models::park_pass::CreatePassData;
use crate::models::{Pass, PassDetails, PricingWindowOption};
use crate::services::passes::expiry_for;
use crate::services::pricing::{self, PricingError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenewalStats {
    pub due: usize,
    pub renewed: usize,
    pub failed: usize,
    pub errors: usize,
}

impl std::fmt::Display for RenewalStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} pass(es) due, {} renewed, {} could not be renewed, {} error(s)",
            self.due, self.renewed, self.failed, self.errors
        )
    }
}

/// The option a renewal is reissued from: same duration as the expiring pass
pub fn matching_option(
    options: &[PricingWindowOption],
    duration: i16,
) -> Option<&PricingWindowOption> {
    options.iter().find(|o| o.duration == duration)
}

/// Holder and vehicle details carried onto the reissued pass
pub fn renewal_data(expiring: &Pass, option: &PricingWindowOption) -> CreatePassData {
    CreatePassData {
        user_id: expiring.user_id,
        option_id: option.id,
        first_name: expiring.first_name.clone(),
        last_name: expiring.last_name.clone(),
        email: expiring.email.clone(),
        mobile: expiring.mobile.clone(),
        company: expiring.company.clone(),
        address_line_1: expiring.address_line_1.clone(),
        address_line_2: expiring.address_line_2.clone(),
        suburb: expiring.suburb.clone(),
        state: expiring.state.clone(),
        postcode: expiring.postcode.clone(),
        rac_member_number: expiring.rac_member_number.clone(),
        vehicle_registration_1: expiring.vehicle_registration_1.clone(),
        vehicle_registration_2: expiring.vehicle_registration_2.clone(),
        drivers_licence_number: expiring.drivers_licence_number.clone(),
        park_group_id: expiring.park_group_id,
        date_start: Some(expiring.date_expiry),
        renew_automatically: true,
        date_expiry: Some(expiry_for(expiring.date_expiry, option.duration)),
        in_cart: false,
        sold_via: expiring.sold_via,
    }
}

enum Outcome {
    Renewed,
    NoMatchingOption,
}

#[tracing::instrument(skip(ctx))]
pub async fn renew_passes(
    ctx: &JobContext,
    today: NaiveDate,
    dry_run: bool,
) -> Result<RenewalStats, JobError> {
    let due: Vec<PassDetails> = PassDetails::list_expiring_on(&ctx.pool, today)
        .await?
        .into_iter()
        .filter(|d| d.pass.renew_automatically)
        .collect();

    let mut stats = RenewalStats {
        due: due.len(),
        ..Default::default()
    };

    for details in &due {
        match renew(ctx, details, today, dry_run).await {
            Ok(Outcome::Renewed) => stats.renewed += 1,
            Ok(Outcome::NoMatchingOption) => stats.failed += 1,
            Err(e) => {
                tracing::error!(pass_id = details.pass.id, error = %e, "Failed to renew pass");
                stats.errors += 1;
            }
        }
    }

    tracing::info!(?stats, dry_run, "Pass renewals finished");

    Ok(stats)
}

async fn renew(
    ctx: &JobContext,
    details: &PassDetails,
    today: NaiveDate,
    dry_run: bool,
) -> anyhow::Result<Outcome> {
    let options = match pricing::current_options(&ctx.pool, details.pass_type_id, today).await {
        Ok((_, options)) => options,
        Err(PricingError::NoDefaultPricingWindow) => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    let Some(option) = matching_option(&options, details.duration) else {
        tracing::warn!(
            pass_id = details.pass.id,
            duration = details.duration,
            "No current option matches the expiring pass"
        );
        if !dry_run {
            Pass::set_renew_automatically(&ctx.pool, details.pass.id, false).await?;
            ctx.mailer
                .send(&ctx.emails.autorenew_failure(details)?)
                .await?;
        }
        return Ok(Outcome::NoMatchingOption);
    };

    if dry_run {
        tracing::info!(pass_id = details.pass.id, option_id = option.id, "Would renew pass");
        return Ok(Outcome::Renewed);
    }

    let mut tx = ctx.pool.begin().await?;
    let renewed = Pass::create_in(&mut tx, renewal_data(&details.pass, option)).await?;
    Pass::set_renew_automatically_in(&mut tx, details.pass.id, false).await?;
    tx.commit().await?;

    tracing::info!(pass_id = details.pass.id, renewed_pass_id = renewed.id, "Renewed pass");

    let renewed = PassDetails::find(&ctx.pool, renewed.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("renewed pass {} not found", renewed.id))?;
    let previous_number = details.pass.pass_number.as_deref().unwrap_or_default();
    ctx.mailer
        .send(&ctx.emails.autorenew_success(&renewed, previous_number)?)
        .await?;

    Ok(Outcome::Renewed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Money;

    fn option(id: i64, duration: i16) -> PricingWindowOption {
        PricingWindowOption {
            id,
            pricing_window_id: 1,
            name: format!("{} days", duration),
            duration,
            price: Money(6000),
        }
    }

    #[test]
    fn test_matching_option_by_duration() {
        let options = vec![option(1, 5), option(2, 14), option(3, 28)];
        assert_eq!(matching_option(&options, 14).map(|o| o.id), Some(2));
        assert!(matching_option(&options, 365).is_none());
    }

    #[test]
    fn test_renewal_starts_at_previous_expiry() {
        let mut pass = crate::services::emails::tests::details().pass;
        pass.renew_automatically = true;
        pass.in_cart = true;
        pass.drivers_licence_number = Some("1234567".to_string());

        let data = renewal_data(&pass, &option(7, 28));

        assert_eq!(data.option_id, 7);
        assert_eq!(data.date_start, Some(pass.date_expiry));
        assert_eq!(
            data.date_expiry,
            NaiveDate::from_ymd_opt(2025, 1, 31)
        );
        assert!(data.renew_automatically);
        assert!(!data.in_cart);
        assert_eq!(data.drivers_licence_number.as_deref(), Some("1234567"));
        assert_eq!(data.vehicle_registration_1.as_deref(), Some("1ABC234"));
    }
}

use chrono::{Days, NaiveDate};

use crate::jobs::{JobContext, JobError};
use crate::models::{PassDetails, PassStatus};
use crate::services::mailer::EmailMessage;
use crate::services::passes::details_status_on;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassNotificationStats {
    pub expiry_notices: usize,
    pub autorenew_notices: usize,
    pub expired: usize,
    pub vehicle_reminders: usize,
    pub errors: usize,
}

impl std::fmt::Display for PassNotificationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} expiry notice(s), {} auto-renewal notice(s), {} expired, {} vehicle reminder(s), {} error(s)",
            self.expiry_notices,
            self.autorenew_notices,
            self.expired,
            self.vehicle_reminders,
            self.errors
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notice {
    ExpiryNotice,
    AutoRenewNotice,
    Expired,
    VehicleReminder,
}

/// Passes due a reminder because they expire `notice_days` from today
fn upcoming_notice(details: &PassDetails) -> Notice {
    if details.pass.renew_automatically {
        Notice::AutoRenewNotice
    } else {
        Notice::ExpiryNotice
    }
}

/// Passes expiring today get an expired email unless they are about to be renewed
fn is_expiring_without_renewal(details: &PassDetails) -> bool {
    !details.pass.renew_automatically
}

fn wants_vehicle_reminder(details: &PassDetails, today: NaiveDate) -> bool {
    !details.pass.has_vehicle_details() && details_status_on(details, today) == PassStatus::Current
}

#[tracing::instrument(skip(ctx))]
pub async fn send_pass_notifications(
    ctx: &JobContext,
    today: NaiveDate,
    dry_run: bool,
) -> Result<PassNotificationStats, JobError> {
    let mut stats = PassNotificationStats::default();
    let notice_days = u64::try_from(ctx.config.expiry_notice_days).unwrap_or_default();

    if let Some(notice_date) = today.checked_add_days(Days::new(notice_days)) {
        for details in PassDetails::list_expiring_on(&ctx.pool, notice_date).await? {
            notify(ctx, &details, upcoming_notice(&details), today, dry_run, &mut stats).await;
        }
    }

    for details in PassDetails::list_expiring_on(&ctx.pool, today).await? {
        if is_expiring_without_renewal(&details) {
            notify(ctx, &details, Notice::Expired, today, dry_run, &mut stats).await;
        }
    }

    if let Some(yesterday) = today.pred_opt() {
        for details in PassDetails::list_missing_vehicle_created_on(&ctx.pool, yesterday).await? {
            if wants_vehicle_reminder(&details, today) {
                notify(ctx, &details, Notice::VehicleReminder, today, dry_run, &mut stats).await;
            }
        }
    }

    tracing::info!(?stats, dry_run, "Pass notifications finished");

    Ok(stats)
}

async fn notify(
    ctx: &JobContext,
    details: &PassDetails,
    notice: Notice,
    today: NaiveDate,
    dry_run: bool,
    stats: &mut PassNotificationStats,
) {
    if dry_run {
        tracing::info!(pass_id = details.pass.id, ?notice, "Would send pass notification");
    } else {
        let sent = match render(ctx, details, notice, today) {
            Ok(message) => ctx.mailer.send(&message).await.map_err(anyhow::Error::from),
            Err(e) => Err(anyhow::Error::from(e)),
        };
        if let Err(e) = sent {
            tracing::error!(pass_id = details.pass.id, ?notice, error = %e, "Failed to send pass notification");
            stats.errors += 1;
            return;
        }
    }

    match notice {
        Notice::ExpiryNotice => stats.expiry_notices += 1,
        Notice::AutoRenewNotice => stats.autorenew_notices += 1,
        Notice::Expired => stats.expired += 1,
        Notice::VehicleReminder => stats.vehicle_reminders += 1,
    }
}

fn render(
    ctx: &JobContext,
    details: &PassDetails,
    notice: Notice,
    today: NaiveDate,
) -> Result<EmailMessage, askama::Error> {
    match notice {
        Notice::ExpiryNotice => ctx.emails.expiry_notice(details, today),
        Notice::AutoRenewNotice => ctx.emails.autorenew_notice(details, today),
        Notice::Expired => ctx.emails.expired(details),
        Notice::VehicleReminder => ctx.emails.vehicle_details_missing(details),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn details(renew: bool) -> PassDetails {
        let mut details = crate::services::emails::tests::details();
        details.pass.renew_automatically = renew;
        details
    }

    #[test]
    fn test_upcoming_notice_depends_on_renewal() {
        assert_eq!(upcoming_notice(&details(true)), Notice::AutoRenewNotice);
        assert_eq!(upcoming_notice(&details(false)), Notice::ExpiryNotice);
    }

    #[test]
    fn test_renewing_passes_skip_expired_email() {
        assert!(!is_expiring_without_renewal(&details(true)));
        assert!(is_expiring_without_renewal(&details(false)));
    }

    #[test]
    fn test_vehicle_reminder_only_for_current_passes_without_vehicle() {
        let mut pass = details(false);
        pass.pass.date_start = date(2024, 6, 1);
        pass.pass.date_expiry = date(2024, 7, 1);
        pass.pass.vehicle_registration_1 = None;
        assert!(wants_vehicle_reminder(&pass, date(2024, 6, 2)));
        assert!(!wants_vehicle_reminder(&pass, date(2024, 5, 30)));

        pass.pass.vehicle_registration_1 = Some("1ABC234".to_string());
        assert!(!wants_vehicle_reminder(&pass, date(2024, 6, 2)));
    }

    #[test]
    fn test_stats_summary() {
        let stats = PassNotificationStats {
            expiry_notices: 2,
            expired: 1,
            ..Default::default()
        };
        assert_eq!(
            stats.to_string(),
            "2 expiry notice(s), 0 auto-renewal notice(s), 1 expired, 0 vehicle reminder(s), 0 error(s)"
        );
    }
}

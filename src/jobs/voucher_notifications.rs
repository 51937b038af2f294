use chrono::NaiveDate;

use crate::jobs::{JobContext, JobError};
use crate::models::voucher::{VOUCHER_DELIVERED, VOUCHER_NOT_DELIVERED};
use crate::models::{EmailUser, Voucher};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VoucherEmailStats {
    pub due: usize,
    pub delivered: usize,
    pub not_delivered: usize,
}

impl std::fmt::Display for VoucherEmailStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} voucher(s) due, {} delivered, {} not delivered",
            self.due, self.delivered, self.not_delivered
        )
    }
}

/// Emails every purchased voucher scheduled for `today` or earlier to its recipient, then lets
/// the purchaser know.
///
/// Vouchers bought after their send date went past, and vouchers that failed, stay due and are
/// picked up by the next run.
#[tracing::instrument(skip(ctx))]
pub async fn send_voucher_emails(
    ctx: &JobContext,
    today: NaiveDate,
    dry_run: bool,
) -> Result<VoucherEmailStats, JobError> {
    let vouchers = Voucher::list_due_by(&ctx.pool, today).await?;
    let mut stats = VoucherEmailStats {
        due: vouchers.len(),
        ..Default::default()
    };

    for voucher in &vouchers {
        if dry_run {
            tracing::info!(
                voucher_id = voucher.id,
                recipient = %voucher.recipient_email,
                "Would send voucher email"
            );
            continue;
        }

        match deliver(ctx, voucher).await {
            Ok(()) => {
                Voucher::set_processing_status(&ctx.pool, voucher.id, VOUCHER_DELIVERED).await?;
                stats.delivered += 1;
            }
            Err(e) => {
                tracing::error!(voucher_id = voucher.id, error = %e, "Failed to deliver voucher");
                Voucher::set_processing_status(&ctx.pool, voucher.id, VOUCHER_NOT_DELIVERED)
                    .await?;
                stats.not_delivered += 1;
            }
        }
    }

    tracing::info!(?stats, dry_run, "Voucher emails finished");

    Ok(stats)
}

async fn deliver(ctx: &JobContext, voucher: &Voucher) -> anyhow::Result<()> {
    ctx.mailer.send(&ctx.emails.voucher_recipient(voucher)?).await?;

    // The recipient has the voucher at this point; a purchaser copy failing is only logged
    let Some(purchaser_id) = voucher.purchaser_id else {
        return Ok(());
    };
    let Some(purchaser) = EmailUser::find_by_id(&ctx.pool, purchaser_id).await? else {
        return Ok(());
    };

    let message = ctx
        .emails
        .voucher_purchaser(voucher, &purchaser.email, &purchaser.display_name())?;
    if let Err(e) = ctx.mailer.send(&message).await {
        tracing::warn!(voucher_id = voucher.id, error = %e, "Failed to notify voucher purchaser");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_summary() {
        let stats = VoucherEmailStats {
            due: 3,
            delivered: 2,
            not_delivered: 1,
        };
        assert_eq!(
            stats.to_string(),
            "3 voucher(s) due, 2 delivered, 1 not delivered"
        );
    }
}

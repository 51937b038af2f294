use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::jobs::{Command, JobContext, JobError};

// Six-field cron expressions (with seconds), evaluated in UTC
const DAILY: &str = "0 0 17 * * *";
const MONTHLY: &str = "0 30 17 1 * *";

// Notifications go out before renewals clear the auto-renew flag on today's expiring passes
const DAILY_COMMANDS: [Command; 3] = [
    Command::SendPassNotifications,
    Command::RenewPasses,
    Command::SendVoucherEmails,
];

/// Starts the cron scheduler that runs the management commands unattended
pub async fn start(ctx: JobContext) -> Result<JobScheduler, JobError> {
    let scheduler = JobScheduler::new().await?;

    let daily_ctx = ctx.clone();
    scheduler
        .add(Job::new_async(DAILY, move |_uuid, _lock| {
            let ctx = daily_ctx.clone();
            Box::pin(async move {
                for command in DAILY_COMMANDS {
                    run(&ctx, command).await;
                }
            })
        })?)
        .await?;

    scheduler
        .add(Job::new_async(MONTHLY, move |_uuid, _lock| {
            let ctx = ctx.clone();
            Box::pin(async move {
                run(&ctx, Command::GenerateRetailerInvoices).await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!(daily = DAILY, monthly = MONTHLY, "Job scheduler started");

    Ok(scheduler)
}

async fn run(ctx: &JobContext, command: Command) {
    let today = Utc::now().date_naive();
    match command.run(ctx, today, false).await {
        Ok(summary) => tracing::info!(command = command.name(), %summary, "Scheduled job completed"),
        Err(e) => tracing::error!(command = command.name(), error = %e, "Scheduled job failed"),
    }
}

// Background jobs - run daily by the scheduler or on demand from the CLI

pub mod pass_notifications;
pub mod renewals;
pub mod retailer_invoices;
pub mod scheduler;
pub mod voucher_notifications;

use sqlx::PgPool;

use crate::config::Config;
use crate::services::emails::EmailContext;
use crate::services::invoicing::InvoiceError;
use crate::services::mailer::Mailer;

#[derive(thiserror::Error, Debug)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invoice error: {0}")]
    Invoice(#[from] InvoiceError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
}

/// Everything a job needs, cheap to clone into scheduled tasks
#[derive(Clone)]
pub struct JobContext {
    pub pool: PgPool,
    pub config: Config,
    pub mailer: Mailer,
    pub emails: EmailContext,
}

impl JobContext {
    pub fn new(pool: PgPool, config: Config, mailer: Mailer) -> Self {
        let emails = EmailContext::from_config(&config);
        Self {
            pool,
            config,
            mailer,
            emails,
        }
    }
}

/// Management commands that can be run by hand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SendVoucherEmails,
    SendPassNotifications,
    RenewPasses,
    GenerateRetailerInvoices,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::SendVoucherEmails,
        Command::SendPassNotifications,
        Command::RenewPasses,
        Command::GenerateRetailerInvoices,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::SendVoucherEmails => "send-voucher-emails",
            Command::SendPassNotifications => "send-pass-notifications",
            Command::RenewPasses => "renew-passes",
            Command::GenerateRetailerInvoices => "generate-retailer-invoices",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Command::SendVoucherEmails => "Email vouchers due to be delivered today",
            Command::SendPassNotifications => {
                "Send expiry, renewal and missing vehicle notices for passes"
            }
            Command::RenewPasses => "Reissue passes set to renew automatically that expire today",
            Command::GenerateRetailerInvoices => {
                "Write last month's invoice and sales report for each retailer"
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Runs the command and returns its one-line summary
    pub async fn run(
        self,
        ctx: &JobContext,
        today: chrono::NaiveDate,
        test: bool,
    ) -> Result<String, JobError> {
        let summary = match self {
            Command::SendVoucherEmails => {
                voucher_notifications::send_voucher_emails(ctx, today, test)
                    .await?
                    .to_string()
            }
            Command::SendPassNotifications => {
                pass_notifications::send_pass_notifications(ctx, today, test)
                    .await?
                    .to_string()
            }
            Command::RenewPasses => renewals::renew_passes(ctx, today, test).await?.to_string(),
            Command::GenerateRetailerInvoices => {
                retailer_invoices::generate_retailer_invoices(ctx, today, test)
                    .await?
                    .to_string()
            }
        };
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names_round_trip() {
        for command in Command::ALL {
            assert_eq!(Command::from_name(command.name()), Some(command));
        }
        assert_eq!(Command::from_name("drop-database"), None);
    }
}

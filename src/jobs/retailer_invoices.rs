use std::path::Path;

use chrono::NaiveDate;

use crate::jobs::{JobContext, JobError};
use crate::models::retailer::UpsertReportData;
use crate::models::{PassDetails, RetailerGroup, RetailerReport};
use crate::services::invoicing::{build_statement, write_documents, ReportingPeriod};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceStats {
    pub groups: usize,
    pub generated: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl std::fmt::Display for InvoiceStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} retailer group(s), {} invoice(s) generated, {} without sales, {} error(s)",
            self.groups, self.generated, self.skipped, self.errors
        )
    }
}

/// Writes last month's invoice and sales report for each retailer group.
///
/// Test runs report on the current month so the documents can be checked mid-month.
#[tracing::instrument(skip(ctx))]
pub async fn generate_retailer_invoices(
    ctx: &JobContext,
    today: NaiveDate,
    test: bool,
) -> Result<InvoiceStats, JobError> {
    let period = ReportingPeriod::for_run(today, test)?;
    let groups = RetailerGroup::list_excluding(&ctx.pool, &ctx.config.default_sold_via).await?;
    let root = Path::new(&ctx.config.retailer_document_root);

    let mut stats = InvoiceStats {
        groups: groups.len(),
        ..Default::default()
    };

    for group in &groups {
        let passes =
            PassDetails::list_sold_via_between(&ctx.pool, group.id, period.first_day, period.last_day)
                .await?;

        if passes.is_empty() {
            tracing::debug!(retailer_group = %group.name, "No sales in period");
            stats.skipped += 1;
            continue;
        }

        match invoice_group(ctx, root, group, &period, &passes, today).await {
            Ok(report) => {
                tracing::info!(
                    retailer_group = %group.name,
                    report_id = report.id,
                    passes = passes.len(),
                    "Generated retailer invoice"
                );
                stats.generated += 1;
            }
            Err(e) => {
                tracing::error!(retailer_group = %group.name, error = %e, "Failed to generate retailer invoice");
                stats.errors += 1;
            }
        }
    }

    tracing::info!(?stats, period = %period.label(), test, "Retailer invoices finished");

    Ok(stats)
}

async fn invoice_group(
    ctx: &JobContext,
    root: &Path,
    group: &RetailerGroup,
    period: &ReportingPeriod,
    passes: &[PassDetails],
    today: NaiveDate,
) -> Result<RetailerReport, JobError> {
    let statement = build_statement(
        &ctx.config.organisation,
        group,
        period,
        passes,
        ctx.config.gst_percentage,
        today,
    );
    let (invoice_path, report_path) = write_documents(root, &statement, period).await?;

    let report = RetailerReport::upsert(
        &ctx.pool,
        UpsertReportData {
            uuid: statement.invoice_uuid,
            retailer_group_id: group.id,
            report_year: period.year(),
            report_month: period.month_number() as i32,
            invoice_path: invoice_path.to_string_lossy().into_owned(),
            report_path: report_path.to_string_lossy().into_owned(),
        },
    )
    .await?;

    Ok(report)
}

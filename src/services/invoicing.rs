use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use askama::Template;
use chrono::{Datelike, NaiveDate};
use uuid::Uuid;

use crate::models::{Money, PassDetails, RetailerGroup};
use crate::services::passes::{gst_included, PriceBreakdown};
use crate::services::slug::slugify;

#[derive(thiserror::Error, Debug)]
pub enum InvoiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Could not write document: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid reporting period {year}-{month}")]
    InvalidPeriod { year: i32, month: u32 },
}

/// A calendar month being invoiced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingPeriod {
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

impl ReportingPeriod {
    pub fn month(year: i32, month: u32) -> Result<Self, InvoiceError> {
        let invalid = || InvoiceError::InvalidPeriod { year, month };
        let first_day = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let next_month = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(invalid)?;
        let last_day = next_month.pred_opt().ok_or_else(invalid)?;

        Ok(Self {
            first_day,
            last_day,
        })
    }

    /// The month before `today`, or the current month for test runs
    pub fn for_run(today: NaiveDate, current_month: bool) -> Result<Self, InvoiceError> {
        if current_month {
            return Self::month(today.year(), today.month());
        }
        match today.month() {
            1 => Self::month(today.year() - 1, 12),
            m => Self::month(today.year(), m - 1),
        }
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month_number(&self) -> u32 {
        self.first_day.month()
    }

    pub fn label(&self) -> String {
        self.first_day.format("%B %Y").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceLine {
    pub pass_number: String,
    pub pass_type: String,
    pub holder_name: String,
    pub date_sold: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassTypeTotal {
    pub pass_type: String,
    pub pass_count: usize,
    pub total_sales: String,
}

/// Money owed between the agency and a retailer group for one month
#[derive(Debug, Clone)]
pub struct RetailerStatement {
    pub invoice_uuid: Uuid,
    pub organisation: String,
    pub retailer_group: String,
    pub period: String,
    pub date_from: String,
    pub date_to: String,
    pub date_generated: String,
    pub commission_percentage: String,
    pub lines: Vec<InvoiceLine>,
    pub totals_by_pass_type: Vec<PassTypeTotal>,
    pub total_sales: String,
    pub commission_amount: String,
    pub total_payable: String,
    pub gst_included: String,
}

/// Figures behind a statement, kept numeric for checking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementTotals {
    pub total_sales: Money,
    pub commission_amount: Money,
    pub total_payable: Money,
}

pub fn statement_totals(group: &RetailerGroup, passes: &[PassDetails]) -> StatementTotals {
    let total_sales: Money = passes
        .iter()
        .map(|p| PriceBreakdown::for_details(p).after_concession)
        .sum();
    let commission_amount = group.commission_on(total_sales);

    StatementTotals {
        total_sales,
        commission_amount,
        total_payable: total_sales - commission_amount,
    }
}

/// Option list price per pass type, before concessions. The finance report
/// reconciles against the price list, so these need not add up to `total_sales`.
pub fn totals_by_pass_type(passes: &[PassDetails]) -> Vec<PassTypeTotal> {
    let mut by_type: BTreeMap<&str, (usize, Money)> = BTreeMap::new();
    for details in passes {
        let entry = by_type
            .entry(details.pass_type_name.as_str())
            .or_insert((0, Money::ZERO));
        entry.0 += 1;
        entry.1 += details.price;
    }

    by_type
        .into_iter()
        .map(|(pass_type, (pass_count, total))| PassTypeTotal {
            pass_type: pass_type.to_string(),
            pass_count,
            total_sales: total.to_string(),
        })
        .collect()
}

pub fn build_statement(
    organisation: &str,
    group: &RetailerGroup,
    period: &ReportingPeriod,
    passes: &[PassDetails],
    gst_percentage: i64,
    generated_on: NaiveDate,
) -> RetailerStatement {
    let totals = statement_totals(group, passes);

    let lines = passes
        .iter()
        .map(|details| InvoiceLine {
            pass_number: details.pass.pass_number.clone().unwrap_or_default(),
            pass_type: details.pass_type_name.clone(),
            holder_name: details.pass.full_name(),
            date_sold: details.pass.datetime_created.format("%d/%m/%Y").to_string(),
            amount: PriceBreakdown::for_details(details)
                .after_concession
                .to_string(),
        })
        .collect();

    RetailerStatement {
        invoice_uuid: Uuid::new_v4(),
        organisation: organisation.to_string(),
        retailer_group: group.name.clone(),
        period: period.label(),
        date_from: period.first_day.format("%d/%m/%Y").to_string(),
        date_to: period.last_day.format("%d/%m/%Y").to_string(),
        date_generated: generated_on.format("%d/%m/%Y").to_string(),
        commission_percentage: group.commission_display(),
        lines,
        totals_by_pass_type: totals_by_pass_type(passes),
        total_sales: totals.total_sales.to_string(),
        commission_amount: totals.commission_amount.to_string(),
        total_payable: totals.total_payable.to_string(),
        gst_included: gst_included(totals.total_sales, gst_percentage).to_string(),
    }
}

#[derive(Template)]
#[template(path = "documents/retailer_invoice.html")]
struct InvoiceDocument<'a> {
    s: &'a RetailerStatement,
}

#[derive(Template)]
#[template(path = "documents/retailer_report.html")]
struct ReportDocument<'a> {
    s: &'a RetailerStatement,
}

/// Where a group's documents for a period are written
pub fn document_paths(root: &Path, group_name: &str, period: &ReportingPeriod) -> (PathBuf, PathBuf) {
    let dir = root.join(slugify(group_name));
    let suffix = format!("{} - {} {}.html", group_name, period.first_day, period.last_day);
    (
        dir.join(format!("Park Passes Invoice - {}", suffix)),
        dir.join(format!("Park Passes Report - {}", suffix)),
    )
}

/// Renders the invoice and report and writes both under `root/<group slug>/`
#[tracing::instrument(skip(root, statement, period), fields(retailer_group = %statement.retailer_group))]
pub async fn write_documents(
    root: &Path,
    statement: &RetailerStatement,
    period: &ReportingPeriod,
) -> Result<(PathBuf, PathBuf), InvoiceError> {
    let (invoice_path, report_path) = document_paths(root, &statement.retailer_group, period);

    if let Some(dir) = invoice_path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let invoice = InvoiceDocument { s: statement }.render()?;
    let report = ReportDocument { s: statement }.render()?;

    tokio::fs::write(&invoice_path, invoice).await?;
    tokio::fs::write(&report_path, report).await?;

    tracing::info!(invoice = %invoice_path.display(), report = %report_path.display(), "Wrote retailer documents");

    Ok((invoice_path, report_path))
}

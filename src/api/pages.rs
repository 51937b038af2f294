use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::auth::authenticated_user_id;
use crate::api::middleware::session::{set_cart_item_count, set_flash, take_flash, AppState};
use crate::api::navigation::{PageChrome, RequestUser};
use crate::error::{AppError, Result};
use crate::jobs::{Command, JobContext};
use crate::models::voucher::{
    processing_status_display, VoucherFilter, VOUCHER_DELIVERED, VOUCHER_NEW,
    VOUCHER_NOT_DELIVERED,
};
use crate::models::park_pass::DiscountCode;
use crate::models::{EmailUser, Pass, PassDetails, PassStatus, RetailerGroup, Voucher};
use crate::routes::Route;
use crate::services::emails::format_datetime;
use crate::services::orders::{self, Cart};
use crate::services::passes::{
    self, can_cancel_automatic_renewal, details_status_on, PriceBreakdown,
};

const DATE_FORMAT: &str = "%d/%m/%Y";
const RECENT_PASS_LIMIT: i64 = 100;

async fn chrome(
    state: &AppState,
    session: &Session,
    user: &RequestUser,
    current: Option<Route>,
) -> Result<PageChrome> {
    let flash = take_flash(session).await?;
    Ok(PageChrome::new(&state.config, user, current, flash))
}

/// A pass as listed in dashboard tables
#[derive(Debug, Clone)]
pub struct PassRow {
    pub id: i64,
    pub pass_number: String,
    pub pass_type: String,
    pub duration: String,
    pub holder_name: String,
    pub email: String,
    pub price: String,
    pub date_start: String,
    pub date_expiry: String,
    pub status: PassStatus,
    pub status_class: String,
    pub park_group: Option<String>,
    pub vehicles: Option<String>,
    pub sold_via: Option<String>,
    pub renew_automatically: bool,
    pub can_cancel_renewal: bool,
    pub cancellation_reason: Option<String>,
}

impl PassRow {
    pub fn from_details(details: &PassDetails, now: DateTime<Utc>) -> Self {
        let pass = &details.pass;
        let status = details_status_on(details, now.date_naive());
        let vehicles = [&pass.vehicle_registration_1, &pass.vehicle_registration_2]
            .into_iter()
            .flatten()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            id: pass.id,
            pass_number: pass.pass_number.clone().unwrap_or_default(),
            pass_type: details.pass_type_name.clone(),
            duration: details.duration_name.clone(),
            holder_name: pass.full_name(),
            email: pass.email.clone(),
            price: PriceBreakdown::for_details(details).final_price.to_string(),
            date_start: pass.date_start.format(DATE_FORMAT).to_string(),
            date_expiry: pass.date_expiry.format(DATE_FORMAT).to_string(),
            status,
            status_class: format!("status-{}", status.label().to_lowercase()),
            park_group: details.park_group_name.clone(),
            vehicles: Some(vehicles).filter(|v| !v.is_empty()),
            sold_via: details.sold_via_name.clone(),
            renew_automatically: pass.renew_automatically,
            can_cancel_renewal: status != PassStatus::Cancelled
                && can_cancel_automatic_renewal(pass, now).is_ok(),
            cancellation_reason: details.cancellation_reason.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == PassStatus::Cancelled
    }
}

#[derive(Debug, Clone)]
pub struct VoucherRow {
    pub id: i64,
    pub voucher_number: String,
    pub recipient_name: String,
    pub recipient_email: String,
    pub amount: String,
    pub datetime_to_email: String,
    pub expiry: String,
    pub status: &'static str,
}

impl VoucherRow {
    pub fn from_voucher(voucher: &Voucher) -> Self {
        Self {
            id: voucher.id,
            voucher_number: voucher.voucher_number.clone().unwrap_or_default(),
            recipient_name: voucher.recipient_name.clone(),
            recipient_email: voucher.recipient_email.clone(),
            amount: voucher.amount.to_string(),
            datetime_to_email: format_datetime(voucher.datetime_to_email),
            expiry: format_datetime(voucher.expiry),
            status: voucher.processing_status_display(),
        }
    }
}

// Public pages

#[derive(Template)]
#[template(path = "pages/home.html")]
pub struct HomePage {
    pub chrome: PageChrome,
}

#[derive(Template)]
#[template(path = "pages/help.html")]
pub struct HelpPage {
    pub chrome: PageChrome,
}

#[derive(Template)]
#[template(path = "pages/faq.html")]
pub struct FaqPage {
    pub chrome: PageChrome,
}

#[derive(Template)]
#[template(path = "pages/contact.html")]
pub struct ContactPage {
    pub chrome: PageChrome,
    pub organisation: String,
    pub support_email: String,
}

#[derive(Template)]
#[template(path = "pages/further_info.html")]
pub struct FurtherInfoPage {
    pub chrome: PageChrome,
}

/// Signed-in users land on their dashboard instead of the home page
pub async fn home(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
) -> Result<Response> {
    if user.is_authenticated() {
        let dashboard = if user.is_staff {
            Route::Internal
        } else {
            Route::External
        };
        return Ok(Redirect::to(dashboard.path()).into_response());
    }

    let chrome = chrome(&state, &session, &user, Some(Route::Home)).await?;
    Ok(HomePage { chrome }.into_response())
}

pub async fn help(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
) -> Result<HelpPage> {
    Ok(HelpPage {
        chrome: chrome(&state, &session, &user, Some(Route::Help)).await?,
    })
}

pub async fn faq(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
) -> Result<FaqPage> {
    Ok(FaqPage {
        chrome: chrome(&state, &session, &user, Some(Route::Faq)).await?,
    })
}

pub async fn contact(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
) -> Result<ContactPage> {
    Ok(ContactPage {
        chrome: chrome(&state, &session, &user, Some(Route::Contact)).await?,
        organisation: state.config.organisation.clone(),
        support_email: state.config.support_email.clone(),
    })
}

pub async fn further_info(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
) -> Result<FurtherInfoPage> {
    Ok(FurtherInfoPage {
        chrome: chrome(&state, &session, &user, Some(Route::FurtherInfo)).await?,
    })
}

// Customer pages

#[derive(Template)]
#[template(path = "pages/external.html")]
pub struct ExternalPage {
    pub chrome: PageChrome,
    pub passes: Vec<PassRow>,
    pub vouchers: Vec<VoucherRow>,
}

pub async fn external(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
) -> Result<ExternalPage> {
    let user_id = authenticated_user_id(&user).map_err(|_| AppError::Unauthorized)?;
    let now = Utc::now();

    let passes = PassDetails::list_for_user(&state.pool, user_id)
        .await?
        .iter()
        .map(|d| PassRow::from_details(d, now))
        .collect();
    let vouchers = Voucher::list_by_purchaser(&state.pool, user_id, false)
        .await?
        .iter()
        .map(VoucherRow::from_voucher)
        .collect();

    Ok(ExternalPage {
        chrome: chrome(&state, &session, &user, Some(Route::External)).await?,
        passes,
        vouchers,
    })
}

/// Loads a pass the signed-in user may act on: their own, or any pass for staff
pub(crate) async fn owned_pass(state: &AppState, user: &RequestUser, pass_id: i64) -> Result<Pass> {
    let pass = Pass::find_by_id(&state.pool, pass_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Pass {}", pass_id)))?;

    if user.is_staff || (pass.user_id.is_some() && pass.user_id == user.user_id) {
        Ok(pass)
    } else {
        Err(AppError::Forbidden)
    }
}

pub async fn cancel_auto_renewal(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
    Path(pass_id): Path<i64>,
) -> Result<Redirect> {
    let pass = owned_pass(&state, &user, pass_id).await?;

    let message = match passes::cancel_automatic_renewal(&state.pool, pass.id, Utc::now()).await {
        Ok(()) => format!(
            "Automatic renewal cancelled for {}",
            pass.pass_number.unwrap_or_default()
        ),
        Err(e) if e.is_user_error() => e.to_string(),
        Err(e) => return Err(e.into()),
    };
    set_flash(&session, message).await?;

    Ok(Redirect::to(Route::External.path()))
}

#[derive(Template)]
#[template(path = "pages/account.html")]
pub struct AccountPage {
    pub chrome: PageChrome,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

pub async fn account(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
) -> Result<AccountPage> {
    let user_id = authenticated_user_id(&user).map_err(|_| AppError::Unauthorized)?;
    let account = EmailUser::find_by_id(&state.pool, user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(AccountPage {
        chrome: chrome(&state, &session, &user, Some(Route::ManageAccount)).await?,
        email: account.email,
        first_name: account.first_name,
        last_name: account.last_name,
    })
}

#[derive(Debug, Deserialize)]
pub struct AccountForm {
    pub first_name: String,
    pub last_name: String,
}

pub async fn update_account(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
    Form(form): Form<AccountForm>,
) -> Result<Redirect> {
    let user_id = authenticated_user_id(&user).map_err(|_| AppError::Unauthorized)?;
    let updated = EmailUser::update_name(
        &state.pool,
        user_id,
        form.first_name.trim(),
        form.last_name.trim(),
    )
    .await?;

    session
        .insert(
            crate::api::middleware::session::SESSION_KEY_DISPLAY_NAME,
            updated.display_name(),
        )
        .await?;
    set_flash(&session, "Your details have been saved").await?;

    Ok(Redirect::to(Route::ManageAccount.path()))
}

#[derive(Template)]
#[template(path = "pages/cart.html")]
pub struct CartPage {
    pub chrome: PageChrome,
    pub passes: Vec<PassRow>,
    pub vouchers: Vec<VoucherRow>,
    pub total: String,
    pub can_checkout: bool,
}

impl CartPage {
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty() && self.vouchers.is_empty()
    }
}

async fn session_retailer(state: &AppState, user: &RequestUser) -> Result<Option<RetailerGroup>> {
    match &user.retailer {
        Some(info) => Ok(RetailerGroup::find_by_id(&state.pool, info.id).await?),
        None => Ok(None),
    }
}

pub async fn cart(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
) -> Result<CartPage> {
    let user_id = authenticated_user_id(&user).map_err(|_| AppError::Unauthorized)?;
    let cart = Cart::load(&state.pool, user_id).await?;
    let retailer = session_retailer(&state, &user).await?;
    let now = Utc::now();

    // Keep the badge honest if the cart changed elsewhere
    set_cart_item_count(&session, cart.item_count()).await?;
    let user = RequestUser {
        cart_item_count: Some(cart.item_count()),
        ..user
    };

    Ok(CartPage {
        chrome: chrome(&state, &session, &user, Some(Route::Cart)).await?,
        passes: cart.passes.iter().map(|d| PassRow::from_details(d, now)).collect(),
        vouchers: cart.vouchers.iter().map(VoucherRow::from_voucher).collect(),
        total: cart.total().to_string(),
        can_checkout: !cart.is_empty() && cart.can_complete_without_payment(retailer.as_ref()),
    })
}

pub async fn checkout(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
) -> Result<Redirect> {
    let user_id = authenticated_user_id(&user).map_err(|_| AppError::Unauthorized)?;
    let retailer = session_retailer(&state, &user).await?;

    let result = match orders::checkout(
        &state.pool,
        &state.mailer,
        &state.emails,
        user_id,
        retailer.as_ref(),
        &state.config.default_sold_via,
    )
    .await
    {
        Ok(result) => result,
        Err(e) if e.is_user_error() => {
            set_flash(&session, e.to_string()).await?;
            return Ok(Redirect::to(Route::Cart.path()));
        }
        Err(e) => return Err(e.into()),
    };

    set_cart_item_count(&session, 0).await?;
    set_flash(
        &session,
        format!(
            "Order complete: {} pass(es) and {} voucher(s), total {}",
            result.pass_count, result.voucher_count, result.total
        ),
    )
    .await?;

    let next = if retailer.is_some() {
        Route::Retailer
    } else {
        Route::External
    };
    Ok(Redirect::to(next.path()))
}

// Retailer pages

#[derive(Template)]
#[template(path = "pages/retailer.html")]
pub struct RetailerPage {
    pub chrome: PageChrome,
    pub group_name: String,
    pub passes: Vec<PassRow>,
}

pub async fn retailer(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
) -> Result<RetailerPage> {
    let group = session_retailer(&state, &user)
        .await?
        .ok_or(AppError::Forbidden)?;
    let now = Utc::now();

    let passes = PassDetails::list_sold_via(&state.pool, group.id, RECENT_PASS_LIMIT)
        .await?
        .iter()
        .map(|d| PassRow::from_details(d, now))
        .collect();

    Ok(RetailerPage {
        chrome: chrome(&state, &session, &user, Some(Route::Retailer)).await?,
        group_name: group.name,
        passes,
    })
}

// Staff pages

#[derive(Template)]
#[template(path = "pages/internal.html")]
pub struct InternalPage {
    pub chrome: PageChrome,
    pub passes: Vec<PassRow>,
}

pub async fn internal(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
) -> Result<InternalPage> {
    let now = Utc::now();
    let passes = PassDetails::list_recent(&state.pool, RECENT_PASS_LIMIT)
        .await?
        .iter()
        .map(|d| PassRow::from_details(d, now))
        .collect();

    Ok(InternalPage {
        chrome: chrome(&state, &session, &user, Some(Route::Internal)).await?,
        passes,
    })
}

#[derive(Debug, Deserialize)]
pub struct CancelPassForm {
    pub cancellation_reason: String,
}

pub async fn cancel_pass(
    State(state): State<AppState>,
    session: Session,
    Path(pass_id): Path<i64>,
    Form(form): Form<CancelPassForm>,
) -> Result<Redirect> {
    if form.cancellation_reason.trim().is_empty() {
        set_flash(&session, "A cancellation reason is required").await?;
        return Ok(Redirect::to(Route::Internal.path()));
    }

    let message = match passes::cancel_pass(&state.pool, pass_id, &form.cancellation_reason).await
    {
        Ok(_) => format!("Pass {} cancelled", passes::pass_number_for(pass_id)),
        Err(e) if e.is_user_error() => e.to_string(),
        Err(e) => return Err(e.into()),
    };
    set_flash(&session, message).await?;

    Ok(Redirect::to(Route::Internal.path()))
}

pub async fn reinstate_pass(
    State(state): State<AppState>,
    session: Session,
    Path(pass_id): Path<i64>,
) -> Result<Redirect> {
    let message = match passes::reinstate_pass(&state.pool, pass_id).await {
        Ok(()) => format!("Cancellation removed from {}", passes::pass_number_for(pass_id)),
        Err(e) if e.is_user_error() => e.to_string(),
        Err(e) => return Err(e.into()),
    };
    set_flash(&session, message).await?;

    Ok(Redirect::to(Route::Internal.path()))
}

/// Voucher list filters as submitted by the filter form; blank fields are ignored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoucherFilterQuery {
    #[serde(default)]
    pub processing_status: String,
    #[serde(default)]
    pub datetime_to_email_from: String,
    #[serde(default)]
    pub datetime_to_email_to: String,
    #[serde(default)]
    pub search: String,
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn non_empty(value: &str) -> Option<String> {
    Some(value.trim().to_string()).filter(|v| !v.is_empty())
}

impl VoucherFilterQuery {
    pub fn to_filter(&self) -> VoucherFilter {
        VoucherFilter {
            processing_status: non_empty(&self.processing_status),
            datetime_to_email_from: parse_date(&self.datetime_to_email_from),
            datetime_to_email_to: parse_date(&self.datetime_to_email_to),
            search: non_empty(&self.search),
        }
    }
}

pub struct StatusOption {
    pub code: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "pages/internal_vouchers.html")]
pub struct InternalVouchersPage {
    pub chrome: PageChrome,
    pub filter: VoucherFilterQuery,
    pub statuses: Vec<StatusOption>,
    pub vouchers: Vec<VoucherRow>,
}

pub async fn internal_vouchers(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
    Query(filter): Query<VoucherFilterQuery>,
) -> Result<InternalVouchersPage> {
    let vouchers = Voucher::list_filtered(&state.pool, &filter.to_filter())
        .await?
        .iter()
        .map(VoucherRow::from_voucher)
        .collect();

    let statuses = [VOUCHER_NEW, VOUCHER_DELIVERED, VOUCHER_NOT_DELIVERED]
        .into_iter()
        .map(|code| StatusOption {
            code,
            label: processing_status_display(code),
            selected: filter.processing_status == code,
        })
        .collect();

    Ok(InternalVouchersPage {
        chrome: chrome(&state, &session, &user, Some(Route::InternalVouchers)).await?,
        filter,
        statuses,
        vouchers,
    })
}

pub struct DiscountCodeRow {
    pub code: String,
    pub discount: String,
    pub expiry: String,
    pub expired: bool,
}

#[derive(Template)]
#[template(path = "pages/internal_discount_codes.html")]
pub struct InternalDiscountCodesPage {
    pub chrome: PageChrome,
    pub codes: Vec<DiscountCodeRow>,
}

pub async fn internal_discount_codes(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
) -> Result<InternalDiscountCodesPage> {
    let now = Utc::now();
    let codes = DiscountCode::list(&state.pool)
        .await?
        .into_iter()
        .map(|code| DiscountCodeRow {
            discount: code.discount_display(),
            expiry: format_datetime(code.expiry),
            expired: code.expiry <= now,
            code: code.code,
        })
        .collect();

    Ok(InternalDiscountCodesPage {
        chrome: chrome(&state, &session, &user, Some(Route::InternalDiscountCodes)).await?,
        codes,
    })
}

pub struct CommandRow {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Template)]
#[template(path = "pages/mgt_commands.html")]
pub struct MgtCommandsPage {
    pub chrome: PageChrome,
    pub commands: Vec<CommandRow>,
}

pub async fn mgt_commands(
    State(state): State<AppState>,
    session: Session,
    user: RequestUser,
) -> Result<MgtCommandsPage> {
    let commands = Command::ALL
        .into_iter()
        .map(|c| CommandRow {
            name: c.name(),
            description: c.description(),
        })
        .collect();

    Ok(MgtCommandsPage {
        chrome: chrome(&state, &session, &user, Some(Route::MgtCommands)).await?,
        commands,
    })
}

#[derive(Debug, Deserialize)]
pub struct RunCommandForm {
    pub command: String,
    // Checkbox: present only when ticked
    pub test: Option<String>,
}

pub async fn run_mgt_command(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RunCommandForm>,
) -> Result<Redirect> {
    let command = Command::from_name(&form.command)
        .ok_or_else(|| AppError::Validation(format!("Unknown command: {}", form.command)))?;
    let test = form.test.is_some();

    let ctx = JobContext {
        pool: state.pool.clone(),
        config: state.config.clone(),
        mailer: state.mailer.clone(),
        emails: state.emails.clone(),
    };
    tracing::info!(command = command.name(), test, "Running management command");
    let summary = command.run(&ctx, Utc::now().date_naive(), test).await?;

    let mode = if test { " (test)" } else { "" };
    set_flash(&session, format!("{}{}: {}", command.name(), mode, summary)).await?;

    Ok(Redirect::to(Route::MgtCommands.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn details() -> PassDetails {
        crate::services::emails::tests::details()
    }

    #[test]
    fn test_pass_row_for_current_pass() {
        let mut details = details();
        details.pass.vehicle_registration_2 = Some("  ".to_string());
        let now = Utc.with_ymd_and_hms(2024, 12, 25, 9, 0, 0).unwrap();

        let row = PassRow::from_details(&details, now);

        assert_eq!(row.pass_number, "PP000042");
        assert_eq!(row.status, PassStatus::Current);
        assert_eq!(row.status_class, "status-current");
        assert_eq!(row.price, "$60.00");
        assert_eq!(row.date_start, "20/12/2024");
        assert_eq!(row.vehicles.as_deref(), Some("1ABC234"));
        assert!(!row.can_cancel_renewal);
    }

    #[test]
    fn test_pass_row_renewal_can_be_cancelled_until_day_before() {
        let mut details = details();
        details.pass.renew_automatically = true;

        let early = Utc.with_ymd_and_hms(2024, 12, 30, 9, 0, 0).unwrap();
        assert!(PassRow::from_details(&details, early).can_cancel_renewal);

        let late = Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap();
        assert!(!PassRow::from_details(&details, late).can_cancel_renewal);
    }

    #[test]
    fn test_cancelled_pass_row() {
        let mut details = details();
        details.cancellation_reason = Some("Duplicate purchase".to_string());
        details.datetime_cancelled = Some(Utc::now());

        let row = PassRow::from_details(&details, Utc::now());
        assert!(row.is_cancelled());
        assert_eq!(row.status_class, "status-cancelled");
    }

    #[test]
    fn test_voucher_filter_ignores_blank_fields() {
        let query = VoucherFilterQuery {
            processing_status: "ND".to_string(),
            datetime_to_email_from: "".to_string(),
            datetime_to_email_to: "2024-06-30".to_string(),
            search: "  ".to_string(),
        };
        let filter = query.to_filter();

        assert_eq!(filter.processing_status.as_deref(), Some("ND"));
        assert_eq!(filter.datetime_to_email_from, None);
        assert_eq!(filter.datetime_to_email_to, NaiveDate::from_ymd_opt(2024, 6, 30));
        assert_eq!(filter.search, None);
    }
}

use askama::Template;
use chrono::{DateTime, NaiveDate, Utc};

use crate::config::Config;
use crate::models::{PassDetails, Voucher};
use crate::routes::Route;
use crate::services::mailer::EmailMessage;
use crate::services::passes::PriceBreakdown;

const DATE_FORMAT: &str = "%d/%m/%Y";

/// Branding shared by every email
#[derive(Debug, Clone)]
pub struct EmailContext {
    pub site_name: String,
    pub organisation: String,
    pub support_email: String,
    pub no_reply_email: String,
    pub site_url: String,
    pub account_url: String,
}

impl EmailContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            site_name: config.site_name.clone(),
            organisation: config.organisation.clone(),
            support_email: config.support_email.clone(),
            no_reply_email: config.no_reply_email.clone(),
            site_url: config.absolute_url(Route::Home.path()),
            account_url: config.absolute_url(Route::External.path()),
        }
    }

    fn message(&self, to: &str, subject: String, html: String) -> EmailMessage {
        EmailMessage::new(&self.no_reply_email, to, subject, html)
    }
}

/// Pass attributes as they appear in an email body
#[derive(Debug, Clone)]
pub struct PassView {
    pub holder_name: String,
    pub email: String,
    pub pass_number: String,
    pub pass_type: String,
    pub duration: String,
    pub price: String,
    pub date_start: String,
    pub date_expiry: String,
    pub park_group: Option<String>,
    pub drivers_licence_number: Option<String>,
    pub vehicle_registration_1: Option<String>,
    pub vehicle_registration_2: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl PassView {
    pub fn from_details(details: &PassDetails) -> Self {
        let pass = &details.pass;
        Self {
            holder_name: pass.full_name(),
            email: pass.email.clone(),
            pass_number: pass.pass_number.clone().unwrap_or_default(),
            pass_type: details.pass_type_name.clone(),
            duration: details.duration_name.clone(),
            price: PriceBreakdown::for_details(details).final_price.to_string(),
            date_start: pass.date_start.format(DATE_FORMAT).to_string(),
            date_expiry: pass.date_expiry.format(DATE_FORMAT).to_string(),
            park_group: non_blank(&details.park_group_name),
            drivers_licence_number: non_blank(&pass.drivers_licence_number),
            vehicle_registration_1: non_blank(&pass.vehicle_registration_1),
            vehicle_registration_2: non_blank(&pass.vehicle_registration_2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VoucherView {
    pub voucher_number: String,
    pub recipient_name: String,
    pub recipient_email: String,
    pub amount: String,
    pub code: String,
    pub pin: String,
    pub expiry: String,
    pub datetime_to_email: String,
    pub personal_message: Option<String>,
}

impl VoucherView {
    pub fn from_voucher(voucher: &Voucher) -> Self {
        Self {
            voucher_number: voucher.voucher_number.clone().unwrap_or_default(),
            recipient_name: voucher.recipient_name.clone(),
            recipient_email: voucher.recipient_email.clone(),
            amount: voucher.amount.to_string(),
            code: voucher.code.clone(),
            pin: voucher.pin.clone(),
            expiry: voucher.expiry.format(DATE_FORMAT).to_string(),
            datetime_to_email: voucher.datetime_to_email.format(DATE_FORMAT).to_string(),
            personal_message: Some(voucher.personal_message.trim().to_string())
                .filter(|m| !m.is_empty()),
        }
    }
}

#[derive(Template)]
#[template(path = "emails/pass_purchased.html")]
pub struct PassPurchasedEmail<'a> {
    pub ctx: &'a EmailContext,
    pub pass: PassView,
}

#[derive(Template)]
#[template(path = "emails/pass_updated.html")]
pub struct PassUpdatedEmail<'a> {
    pub ctx: &'a EmailContext,
    pub pass: PassView,
}

#[derive(Template)]
#[template(path = "emails/autorenew_notice.html")]
pub struct AutoRenewNoticeEmail<'a> {
    pub ctx: &'a EmailContext,
    pub pass: PassView,
    pub days_until_expiry: i64,
}

#[derive(Template)]
#[template(path = "emails/autorenew_success.html")]
pub struct AutoRenewSuccessEmail<'a> {
    pub ctx: &'a EmailContext,
    pub pass: PassView,
    pub previous_pass_number: String,
}

#[derive(Template)]
#[template(path = "emails/autorenew_failure.html")]
pub struct AutoRenewFailureEmail<'a> {
    pub ctx: &'a EmailContext,
    pub pass: PassView,
}

#[derive(Template)]
#[template(path = "emails/expiry_notice.html")]
pub struct ExpiryNoticeEmail<'a> {
    pub ctx: &'a EmailContext,
    pub pass: PassView,
    pub days_until_expiry: i64,
}

#[derive(Template)]
#[template(path = "emails/expired.html")]
pub struct ExpiredEmail<'a> {
    pub ctx: &'a EmailContext,
    pub pass: PassView,
}

#[derive(Template)]
#[template(path = "emails/vehicle_details_missing.html")]
pub struct VehicleDetailsMissingEmail<'a> {
    pub ctx: &'a EmailContext,
    pub pass: PassView,
}

#[derive(Template)]
#[template(path = "emails/voucher_recipient.html")]
pub struct VoucherRecipientEmail<'a> {
    pub ctx: &'a EmailContext,
    pub voucher: VoucherView,
}

#[derive(Template)]
#[template(path = "emails/voucher_purchaser.html")]
pub struct VoucherPurchaserEmail<'a> {
    pub ctx: &'a EmailContext,
    pub voucher: VoucherView,
    pub purchaser_name: String,
}

#[derive(Template)]
#[template(path = "emails/login_link.html")]
pub struct LoginLinkEmail<'a> {
    pub ctx: &'a EmailContext,
    pub link: String,
    pub valid_minutes: i64,
}

impl EmailContext {
    pub fn pass_purchased(&self, details: &PassDetails) -> Result<EmailMessage, askama::Error> {
        let pass = PassView::from_details(details);
        let subject = format!("Your {} {}", self.site_name, pass.pass_number);
        let html = PassPurchasedEmail { ctx: self, pass }.render()?;
        Ok(self.message(&details.pass.email, subject, html))
    }

    pub fn pass_updated(&self, details: &PassDetails) -> Result<EmailMessage, askama::Error> {
        let pass = PassView::from_details(details);
        let subject = format!("Park pass {} has been updated", pass.pass_number);
        let html = PassUpdatedEmail { ctx: self, pass }.render()?;
        Ok(self.message(&details.pass.email, subject, html))
    }

    pub fn autorenew_notice(
        &self,
        details: &PassDetails,
        today: NaiveDate,
    ) -> Result<EmailMessage, askama::Error> {
        let pass = PassView::from_details(details);
        let subject = format!("Park pass {} will renew automatically", pass.pass_number);
        let html = AutoRenewNoticeEmail {
            ctx: self,
            pass,
            days_until_expiry: (details.pass.date_expiry - today).num_days(),
        }
        .render()?;
        Ok(self.message(&details.pass.email, subject, html))
    }

    pub fn autorenew_success(
        &self,
        renewed: &PassDetails,
        previous_pass_number: &str,
    ) -> Result<EmailMessage, askama::Error> {
        let pass = PassView::from_details(renewed);
        let subject = format!("Park pass {} has been renewed", previous_pass_number);
        let html = AutoRenewSuccessEmail {
            ctx: self,
            pass,
            previous_pass_number: previous_pass_number.to_string(),
        }
        .render()?;
        Ok(self.message(&renewed.pass.email, subject, html))
    }

    pub fn autorenew_failure(&self, details: &PassDetails) -> Result<EmailMessage, askama::Error> {
        let pass = PassView::from_details(details);
        let subject = format!("Park pass {} could not be renewed", pass.pass_number);
        let html = AutoRenewFailureEmail { ctx: self, pass }.render()?;
        Ok(self.message(&details.pass.email, subject, html))
    }

    pub fn expiry_notice(
        &self,
        details: &PassDetails,
        today: NaiveDate,
    ) -> Result<EmailMessage, askama::Error> {
        let pass = PassView::from_details(details);
        let subject = format!("Park pass {} is about to expire", pass.pass_number);
        let html = ExpiryNoticeEmail {
            ctx: self,
            pass,
            days_until_expiry: (details.pass.date_expiry - today).num_days(),
        }
        .render()?;
        Ok(self.message(&details.pass.email, subject, html))
    }

    pub fn expired(&self, details: &PassDetails) -> Result<EmailMessage, askama::Error> {
        let pass = PassView::from_details(details);
        let subject = format!("Park pass {} has expired", pass.pass_number);
        let html = ExpiredEmail { ctx: self, pass }.render()?;
        Ok(self.message(&details.pass.email, subject, html))
    }

    pub fn vehicle_details_missing(
        &self,
        details: &PassDetails,
    ) -> Result<EmailMessage, askama::Error> {
        let pass = PassView::from_details(details);
        let subject = format!("Add your vehicle to park pass {}", pass.pass_number);
        let html = VehicleDetailsMissingEmail { ctx: self, pass }.render()?;
        Ok(self.message(&details.pass.email, subject, html))
    }

    pub fn voucher_recipient(&self, voucher: &Voucher) -> Result<EmailMessage, askama::Error> {
        let view = VoucherView::from_voucher(voucher);
        let subject = format!("You have received a {} voucher", self.site_name);
        let html = VoucherRecipientEmail { ctx: self, voucher: view }.render()?;
        Ok(self.message(&voucher.recipient_email, subject, html))
    }

    pub fn voucher_purchaser(
        &self,
        voucher: &Voucher,
        purchaser_email: &str,
        purchaser_name: &str,
    ) -> Result<EmailMessage, askama::Error> {
        let view = VoucherView::from_voucher(voucher);
        let subject = format!("Your voucher {} has been delivered", view.voucher_number);
        let html = VoucherPurchaserEmail {
            ctx: self,
            voucher: view,
            purchaser_name: purchaser_name.to_string(),
        }
        .render()?;
        Ok(self.message(purchaser_email, subject, html))
    }

    pub fn login_link(
        &self,
        email: &str,
        link: &str,
        valid_minutes: i64,
    ) -> Result<EmailMessage, askama::Error> {
        let subject = format!("Log in to {}", self.site_name);
        let html = LoginLinkEmail {
            ctx: self,
            link: link.to_string(),
            valid_minutes,
        }
        .render()?;
        Ok(self.message(email, subject, html))
    }
}

/// Date shown in emails for timestamps
pub fn format_datetime(value: DateTime<Utc>) -> String {
    value.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::park_pass::Pass;
    use crate::models::Money;

    pub(crate) fn context() -> EmailContext {
        EmailContext {
            site_name: "Park Passes".to_string(),
            organisation: "Parks and Wildlife Service".to_string(),
            support_email: "help@parks.example".to_string(),
            no_reply_email: "no-reply@parks.example".to_string(),
            site_url: "https://passes.parks.example/".to_string(),
            account_url: "https://passes.parks.example/external/".to_string(),
        }
    }

    pub(crate) fn details() -> PassDetails {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        PassDetails {
            pass: Pass {
                id: 42,
                user_id: Some(3),
                option_id: 9,
                pass_number: Some("PP000042".to_string()),
                first_name: "Jo".to_string(),
                last_name: "Bloggs".to_string(),
                email: "jo@example.com".to_string(),
                mobile: "0400000000".to_string(),
                company: None,
                address_line_1: None,
                address_line_2: None,
                suburb: None,
                state: Some("WA".to_string()),
                postcode: Some("6000".to_string()),
                rac_member_number: None,
                vehicle_registration_1: Some("1ABC234".to_string()),
                vehicle_registration_2: None,
                drivers_licence_number: None,
                park_group_id: None,
                date_start: date(2024, 12, 20),
                date_expiry: date(2025, 1, 3),
                renew_automatically: false,
                prevent_further_vehicle_updates: false,
                processing_status: Some("VA".to_string()),
                in_cart: false,
                purchase_email_sent: false,
                sold_via: None,
                datetime_created: Utc::now(),
                datetime_updated: Utc::now(),
            },
            pass_type_id: 1,
            pass_type_name: "Holiday Pass".to_string(),
            pricing_window_name: "Default".to_string(),
            duration_name: "14 days".to_string(),
            duration: 14,
            price: Money(6000),
            park_group_name: None,
            sold_via_name: None,
            cancellation_reason: None,
            datetime_cancelled: None,
            concession_type: None,
            concession_percentage: None,
            discount_code: None,
            discount_code_percentage: None,
            discount_code_amount: None,
            voucher_credit: None,
            voucher_debit: None,
        }
    }

    #[test]
    fn test_pass_purchased_body() {
        let message = context().pass_purchased(&details()).unwrap();

        assert_eq!(message.to, vec!["jo@example.com".to_string()]);
        assert_eq!(message.from, "no-reply@parks.example");
        assert_eq!(message.subject, "Your Park Passes PP000042");
        assert!(message.text.contains("Dear Jo Bloggs,"));
        assert!(message.text.contains("Pass number: PP000042"));
        assert!(message.text.contains("Pass type: Holiday Pass"));
        assert!(message.text.contains("Duration: 14 days"));
        assert!(message.text.contains("Price: $60.00"));
        assert!(message.text.contains("Start date: 20/12/2024"));
        assert!(message.text.contains("Expiry date: 03/01/2025"));
        assert!(message.text.contains("Vehicle registration: 1ABC234"));
        assert!(message.text.contains("Parks and Wildlife Service"));
    }

    #[test]
    fn test_optional_pass_fields_are_omitted() {
        let message = context().pass_purchased(&details()).unwrap();

        assert!(!message.text.contains("Park group"));
        assert!(!message.text.contains("Driver's licence"));
        assert!(!message.text.contains("Second vehicle"));
    }

    #[test]
    fn test_optional_pass_fields_are_shown_when_present() {
        let mut details = details();
        details.park_group_name = Some("Southern Forests".to_string());
        details.pass.drivers_licence_number = Some("DL123".to_string());
        details.pass.vehicle_registration_2 = Some("2XYZ987".to_string());

        let message = context().pass_updated(&details).unwrap();

        assert!(message.text.contains("Park group: Southern Forests"));
        assert!(message.text.contains("Driver's licence number: DL123"));
        assert!(message.text.contains("Second vehicle registration: 2XYZ987"));
    }

    #[test]
    fn test_discounted_price_is_shown() {
        let mut details = details();
        details.discount_code_percentage = Some(50);

        let message = context().pass_purchased(&details).unwrap();
        assert!(message.text.contains("Price: $30.00"));
    }

    #[test]
    fn test_expiry_and_autorenew_notices() {
        let today = NaiveDate::from_ymd_opt(2024, 12, 4).unwrap();

        let expiry = context().expiry_notice(&details(), today).unwrap();
        assert_eq!(expiry.subject, "Park pass PP000042 is about to expire");
        assert!(expiry.text.contains("will expire in 30 days on 03/01/2025"));

        let renew = context().autorenew_notice(&details(), today).unwrap();
        assert!(renew.text.contains("will renew automatically in 30 days"));
    }

    #[test]
    fn test_renewal_outcome_emails() {
        let success = context().autorenew_success(&details(), "PP000007").unwrap();
        assert!(success.text.contains("PP000007 has been renewed"));
        assert!(success.text.contains("Pass number: PP000042"));

        let failure = context().autorenew_failure(&details()).unwrap();
        assert!(failure.text.contains("could not be renewed automatically"));
    }

    #[test]
    fn test_expired_and_vehicle_emails() {
        let expired = context().expired(&details()).unwrap();
        assert!(expired.text.contains("PP000042 expired on 03/01/2025"));

        let vehicle = context().vehicle_details_missing(&details()).unwrap();
        assert!(vehicle.text.contains("https://passes.parks.example/external/"));
    }

    #[test]
    fn test_greeting_is_escaped() {
        let mut details = details();
        details.pass.first_name = "<script>".to_string();

        let message = context().pass_purchased(&details).unwrap();
        assert!(!message.html.contains("<script>"));
        assert!(message.html.contains("&lt;script&gt;"));
    }

    fn voucher() -> Voucher {
        use chrono::TimeZone;
        Voucher {
            id: 5,
            voucher_number: Some("V000005".to_string()),
            purchaser_id: Some(3),
            recipient_name: "Sam".to_string(),
            recipient_email: "sam@example.com".to_string(),
            datetime_to_email: Utc.with_ymd_and_hms(2024, 12, 25, 0, 0, 0).unwrap(),
            personal_message: "Happy holidays".to_string(),
            amount: Money(5000),
            expiry: Utc.with_ymd_and_hms(2027, 12, 25, 0, 0, 0).unwrap(),
            code: "A1B2C3D4".to_string(),
            pin: "012345".to_string(),
            processing_status: "N".to_string(),
            in_cart: false,
            datetime_purchased: Utc::now(),
            datetime_updated: Utc::now(),
        }
    }

    #[test]
    fn test_voucher_emails() {
        let recipient = context().voucher_recipient(&voucher()).unwrap();
        assert_eq!(recipient.to, vec!["sam@example.com".to_string()]);
        assert!(recipient.text.contains("Dear Sam,"));
        assert!(recipient.text.contains("Voucher code: A1B2C3D4"));
        assert!(recipient.text.contains("PIN: 012345"));
        assert!(recipient.text.contains("Amount: $50.00"));
        assert!(recipient.text.contains("Happy holidays"));

        let purchaser = context()
            .voucher_purchaser(&voucher(), "jo@example.com", "Jo Bloggs")
            .unwrap();
        assert_eq!(purchaser.subject, "Your voucher V000005 has been delivered");
        assert!(purchaser.text.contains("Dear Jo Bloggs,"));
        assert!(!purchaser.text.contains("012345"));
    }

    #[test]
    fn test_login_link_email() {
        let message = context()
            .login_link("jo@example.com", "https://passes.parks.example/login/verify/?token=abc", 30)
            .unwrap();
        assert_eq!(message.subject, "Log in to Park Passes");
        assert!(message.text.contains("token=abc"));
        assert!(message.text.contains("30 minutes"));
    }
}

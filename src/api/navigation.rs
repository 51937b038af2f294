use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::routes::{static_asset, Route};

/// Retailer group a user sells on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetailerInfo {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Anonymous,
    Customer,
    Retailer,
    Staff,
}

/// The user behind a request, as recorded in their session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestUser {
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_staff: bool,
    pub retailer: Option<RetailerInfo>,
    pub cart_item_count: Option<u32>,
}

impl RequestUser {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Staff outrank retailers
    pub fn role(&self) -> Role {
        if !self.is_authenticated() {
            Role::Anonymous
        } else if self.is_staff {
            Role::Staff
        } else if self.retailer.is_some() {
            Role::Retailer
        } else {
            Role::Customer
        }
    }

    pub fn cart_item_count_display(&self) -> String {
        self.cart_item_count.unwrap_or_default().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavItem {
    pub label: String,
    pub href: String,
    pub active: bool,
    pub badge: Option<String>,
}

impl NavItem {
    fn new(label: impl Into<String>, route: Route, current: Option<Route>) -> Self {
        Self {
            label: label.into(),
            href: route.path().to_string(),
            active: current == Some(route),
            badge: None,
        }
    }

    fn with_badge(mut self, badge: String) -> Self {
        self.badge = Some(badge);
        self
    }
}

/// Menu entries for a page, left (`primary`) and right (`account`) of the header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    pub primary: Vec<NavItem>,
    pub account: Vec<NavItem>,
    pub greeting: Option<String>,
}

impl Navigation {
    pub fn build(user: &RequestUser, current: Option<Route>) -> Self {
        let item = |label: &str, route: Route| NavItem::new(label, route, current);

        let mut primary = vec![
            item("Home", Route::Home),
            item("Help", Route::Help),
            item("FAQ", Route::Faq),
            item("Contact", Route::Contact),
            item("Further information", Route::FurtherInfo),
        ];
        let mut account = Vec::new();

        let role = user.role();
        match role {
            Role::Staff => primary.extend([
                item("Passes", Route::Internal),
                item("Vouchers", Route::InternalVouchers),
                item("Discount codes", Route::InternalDiscountCodes),
                item("Management commands", Route::MgtCommands),
            ]),
            Role::Retailer => {
                if let Some(retailer) = &user.retailer {
                    primary.push(item(&format!("Retailer: {}", retailer.name), Route::Retailer));
                }
            }
            Role::Customer | Role::Anonymous => {}
        }

        if matches!(role, Role::Customer | Role::Retailer) {
            account.push(item("My passes", Route::External));
            account.push(item("Account", Route::ManageAccount));
            account.push(item("Cart", Route::Cart).with_badge(user.cart_item_count_display()));
        }

        let greeting = if user.is_authenticated() {
            account.push(item("Log out", Route::Logout));
            let name = user
                .display_name
                .as_deref()
                .or(user.email.as_deref())
                .unwrap_or_default();
            Some(format!("Hello, {}", name))
        } else {
            account.push(item("Log in", Route::Login));
            None
        };

        Self {
            primary,
            account,
            greeting,
        }
    }

    pub fn labels(&self) -> Vec<&str> {
        self.primary
            .iter()
            .chain(self.account.iter())
            .map(|i| i.label.as_str())
            .collect()
    }
}

/// Everything `base.html` needs around a page's content
#[derive(Debug, Clone)]
pub struct PageChrome {
    pub site_name: String,
    pub nav: Navigation,
    pub stylesheet: String,
    pub flash: Option<String>,
}

impl PageChrome {
    pub fn new(
        config: &Config,
        user: &RequestUser,
        current: Option<Route>,
        flash: Option<String>,
    ) -> Self {
        Self {
            site_name: config.site_name.clone(),
            nav: Navigation::build(user, current),
            stylesheet: static_asset("css/site.css"),
            flash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> RequestUser {
        RequestUser {
            user_id: Some(5),
            email: Some("jo@example.com".to_string()),
            display_name: Some("Jo Bloggs".to_string()),
            ..RequestUser::anonymous()
        }
    }

    fn retailer() -> RequestUser {
        RequestUser {
            retailer: Some(RetailerInfo {
                id: 2,
                name: "Albany Visitor Centre".to_string(),
            }),
            cart_item_count: Some(3),
            ..customer()
        }
    }

    fn staff() -> RequestUser {
        RequestUser {
            is_staff: true,
            ..retailer()
        }
    }

    const PUBLIC: [&str; 5] = ["Home", "Help", "FAQ", "Contact", "Further information"];

    #[test]
    fn test_roles() {
        assert_eq!(RequestUser::anonymous().role(), Role::Anonymous);
        assert_eq!(customer().role(), Role::Customer);
        assert_eq!(retailer().role(), Role::Retailer);
        assert_eq!(staff().role(), Role::Staff);
    }

    #[test]
    fn test_anonymous_navigation() {
        let nav = Navigation::build(&RequestUser::anonymous(), Some(Route::Home));

        let mut expected = PUBLIC.to_vec();
        expected.push("Log in");
        assert_eq!(nav.labels(), expected);
        assert_eq!(nav.greeting, None);
        assert!(nav.primary[0].active);
    }

    #[test]
    fn test_customer_navigation() {
        let nav = Navigation::build(&customer(), Some(Route::External));

        let mut expected = PUBLIC.to_vec();
        expected.extend(["My passes", "Account", "Cart", "Log out"]);
        assert_eq!(nav.labels(), expected);
        assert_eq!(nav.greeting.as_deref(), Some("Hello, Jo Bloggs"));

        let my_passes = &nav.account[0];
        assert!(my_passes.active);
        assert_eq!(my_passes.href, "/external/");

        // Missing cart count shows as zero
        assert_eq!(nav.account[2].badge.as_deref(), Some("0"));
    }

    #[test]
    fn test_retailer_navigation() {
        let nav = Navigation::build(&retailer(), None);

        assert!(nav.labels().contains(&"Retailer: Albany Visitor Centre"));
        assert!(nav.labels().contains(&"My passes"));
        assert_eq!(nav.account[2].badge.as_deref(), Some("3"));
        assert!(nav.primary.iter().all(|i| !i.active));
    }

    #[test]
    fn test_staff_navigation() {
        let nav = Navigation::build(&staff(), Some(Route::InternalVouchers));

        let mut expected = PUBLIC.to_vec();
        expected.extend([
            "Passes",
            "Vouchers",
            "Discount codes",
            "Management commands",
            "Log out",
        ]);
        assert_eq!(nav.labels(), expected);

        let active: Vec<_> = nav.primary.iter().filter(|i| i.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].href, "/internal/vouchers/");
    }
}

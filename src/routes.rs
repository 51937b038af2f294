/// Named routes for every HTML page, so templates and redirects never hard-code paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Help,
    Faq,
    Contact,
    FurtherInfo,
    Login,
    LoginVerify,
    Logout,
    Cart,
    External,
    ManageAccount,
    Internal,
    InternalVouchers,
    InternalDiscountCodes,
    Retailer,
    MgtCommands,
}

pub const STATIC_URL: &str = "/static/";

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Help => "/help/",
            Route::Faq => "/faq/",
            Route::Contact => "/contact/",
            Route::FurtherInfo => "/further_info/",
            Route::Login => "/login/",
            Route::LoginVerify => "/login/verify/",
            Route::Logout => "/logout/",
            Route::Cart => "/cart/",
            Route::External => "/external/",
            Route::ManageAccount => "/account/",
            Route::Internal => "/internal/",
            Route::InternalVouchers => "/internal/vouchers/",
            Route::InternalDiscountCodes => "/internal/discount-codes/",
            Route::Retailer => "/retailer/",
            Route::MgtCommands => "/mgt-commands/",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// URL of a file under the static directory
pub fn static_asset(path: &str) -> String {
    format!("{}{}", STATIC_URL, path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(Route::Home.path(), "/");
        assert_eq!(Route::FurtherInfo.path(), "/further_info/");
        assert_eq!(Route::InternalDiscountCodes.to_string(), "/internal/discount-codes/");
        assert_eq!(Route::MgtCommands.path(), "/mgt-commands/");
    }

    #[test]
    fn test_static_asset() {
        assert_eq!(static_asset("css/site.css"), "/static/css/site.css");
        assert_eq!(static_asset("/img/logo.svg"), "/static/img/logo.svg");
    }
}

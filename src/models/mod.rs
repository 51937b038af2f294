// Models module - Database entity representations

pub mod login_token;
pub mod money;
pub mod order;
pub mod park_pass;
pub mod pass_type;
pub mod retailer;
pub mod user;
pub mod voucher;

pub use money::Money;
pub use park_pass::{Pass, PassCancellation, PassDetails, PassStatus};
pub use pass_type::{PassType, PricingWindow, PricingWindowOption};
pub use retailer::{RetailerGroup, RetailerReport};
pub use user::EmailUser;
pub use voucher::{Voucher, VoucherTransaction};

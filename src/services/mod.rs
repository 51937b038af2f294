// Services module - Business logic

pub mod emails;
pub mod encryption;
pub mod invoicing;
pub mod login;
pub mod mailer;
pub mod orders;
pub mod passes;
pub mod pricing;
pub mod qr_generator;
pub mod signature;
pub mod slug;
pub mod vouchers;

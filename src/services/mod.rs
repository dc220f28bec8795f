pub mod auth_service;
pub mod checkout;
pub mod mailer;
pub mod ratings;
pub mod tour_stats;

pub use auth_service::{AuthService, IssuedSession};
pub use checkout::{CheckoutProvider, CheckoutSession, LocalCheckout};
pub use mailer::{LogMailer, Mailer, RecordingMailer};

pub mod app;
pub mod email;
pub mod sms;

pub use app::{AppChannel, AppConfig};
pub use email::{EmailChannel, EmailConfig};
pub use sms::{SmsChannel, SmsConfig};

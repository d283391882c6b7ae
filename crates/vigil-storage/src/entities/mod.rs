pub mod alarm;
pub mod alert;
pub mod device;
pub mod event;
pub mod org;
pub mod rule;
pub mod user;

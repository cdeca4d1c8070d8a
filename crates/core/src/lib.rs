pub mod acquisition;
pub mod dispatch;
pub mod error;
pub mod logger;
pub mod platform;
pub mod roi;
pub mod settings;
pub mod source;
pub mod types;

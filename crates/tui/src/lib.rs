pub mod app;
pub mod confirm;
pub mod event;
pub mod frontend;
pub mod ui;

pub use app::App;
pub use frontend::{FrontEndChannels, TuiFrontEnd};

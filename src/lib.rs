pub mod channel;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod events;
pub mod notifier;
pub mod session;
pub mod stores;

pub use dashboard::Dashboard;
pub use notifier::{AppEvent, Notifier};

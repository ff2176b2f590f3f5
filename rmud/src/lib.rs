pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod net;
pub mod panic;
pub mod script;
pub mod ui;

pub use config::CRATE_NAME;

pub type Result<T, E = error::Error> = core::result::Result<T, E>;

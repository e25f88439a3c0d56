//! Setup file loading and the merge of file values, `-S` overrides and command-line
//! flags into a validated core configuration.

mod builder;
mod defaults;
mod file;
mod models;

pub use builder::build_config;
pub use models::{AppConfig, BackendCommand};

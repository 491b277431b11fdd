// Shared kernel: errors, configuration and utilities used by every module

pub mod config;
pub mod errors;
pub mod utils;

pub use config::AppConfig;

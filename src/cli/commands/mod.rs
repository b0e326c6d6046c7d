//! Command implementations.

pub mod check_config;
pub mod completions;
pub mod run;
pub mod version;

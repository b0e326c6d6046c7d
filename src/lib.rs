//! Worklog ETL - sync Feishu Bitable worklog records into a flattened table.
//!
//! This crate provides the core functionality for the `wetl` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - JSON config file with environment overrides
//! - [`bitable`] - Bitable open API client, retries and pagination
//! - [`etl`] - Extract, transform, dedup and load stages
//! - [`notify`] - Run summary cards for the robot webhook or a chat
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bitable;
pub mod cli;
pub mod config;
pub mod error;
pub mod etl;
pub mod notify;

pub use error::{Error, Result};

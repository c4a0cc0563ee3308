//! Shared utilities for the chaos-analyst components
//!
//! This crate provides common functionality used across the harness:
//! - Structured logging initialization
//! - Environment variable parsing helpers
//! - Command execution utilities

pub mod command;
pub mod config;
pub mod logging;

pub use command::{run, run_checked};
pub use config::ConfigExt;
pub use logging::init_logging;

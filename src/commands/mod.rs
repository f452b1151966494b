//! CLI command implementations for herakles-process-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: System validation
//! - `groups`: Group rule listing
//! - `test`: Sampling cycle testing

pub mod check;
pub mod groups;

// Re-export command functions
pub use check::command_check;
pub use groups::command_groups;
pub use test::command_test;

// ABOUTME: Library module for clickhouse-migrator
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod clickhouse;
pub mod commands;
pub mod config;
pub mod error;
pub mod migration;
pub mod utils;

pub use error::{MigrationError, Result};

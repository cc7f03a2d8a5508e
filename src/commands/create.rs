// ABOUTME: Create command implementation - Scaffold a new migration file
// ABOUTME: Names files with a UTC timestamp version so they sort in creation order

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use dialoguer::{theme::ColorfulTheme, Input};
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[a-z0-9_]+$").expect("static regex"))
}

/// Normalize a user-supplied migration name
///
/// Trims, lowercases and turns whitespace runs into underscores, then
/// requires the result to be lowercase letters, digits and underscores.
///
/// # Examples
///
/// ```
/// # use clickhouse_migrator::commands::create::normalize_name;
/// assert_eq!(normalize_name("  Add Users Table ").unwrap(), "add_users_table");
/// assert!(normalize_name("drop-users").is_err());
/// ```
pub fn normalize_name(raw: &str) -> Result<String> {
    let name = raw
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");

    if name.is_empty() {
        bail!("Migration name cannot be empty");
    }
    if !name_regex().is_match(&name) {
        bail!(
            "Invalid migration name '{}'. Use only lowercase letters, numbers, and underscores",
            name
        );
    }

    Ok(name)
}

/// Write a new migration file stamped with `now`
///
/// Creates the directory if needed and never overwrites an existing file.
pub fn create_migration_file(dir: &Path, name: &str, now: DateTime<Utc>) -> Result<PathBuf> {
    let name = normalize_name(name)?;
    let file_name = format!("{}_{}.sql", now.format("%Y%m%d%H%M%S"), name);
    let path = dir.join(&file_name);

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create migrations directory {}", dir.display()))?;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("Failed to create migration file {}", path.display()))?;

    write!(
        file,
        "-- Migration: {}\n-- Created: {}\n\n-- Write your migration here\n",
        name,
        now.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
    .with_context(|| format!("Failed to write migration file {}", path.display()))?;

    Ok(path)
}

/// Create a new migration file, prompting for the name when none is given
pub fn create(migrations_dir: &Path, name: Option<String>) -> Result<PathBuf> {
    let name = match name {
        Some(name) => name,
        None => Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Migration name")
            .validate_with(|input: &String| normalize_name(input).map(|_| ()).map_err(|e| e.to_string()))
            .interact_text()
            .context("Failed to get migration name")?,
    };

    let path = create_migration_file(migrations_dir, &name, Utc::now())?;
    tracing::info!("✓ Created migration: {}", path.display());
    Ok(path)
}

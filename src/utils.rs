// ABOUTME: Utility functions for retries, display sanitizing, and provenance lookup
// ABOUTME: Provides retry logic plus host and user identity for tracking records

use std::fmt::Display;
use std::time::Duration;

/// Retry a function with exponential backoff
///
/// Executes an async operation with automatic retry on failure. Each retry doubles
/// the delay (exponential backoff) to handle transient failures gracefully.
///
/// # Arguments
///
/// * `operation` - Async function to retry (FnMut returning Future\<Output = Result\<T, E\>\>)
/// * `max_retries` - Maximum number of retry attempts (0 = no retries, just initial attempt)
/// * `initial_delay` - Delay before first retry (doubles each subsequent retry)
///
/// # Returns
///
/// Returns the successful result or the last error after all retries exhausted.
///
/// # Examples
///
/// ```no_run
/// # use std::time::Duration;
/// # use clickhouse_migrator::utils::retry_with_backoff;
/// # async fn example() -> anyhow::Result<()> {
/// let result = retry_with_backoff(
///     || async { Ok::<_, anyhow::Error>("success") },
///     3,  // Try up to 3 times
///     Duration::from_secs(1)  // Start with 1s delay
/// ).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Display,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries => {
                tracing::warn!(
                    "Operation failed (attempt {}/{}), retrying in {:?}: {}",
                    attempt + 1,
                    max_retries + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                delay *= 2; // Exponential backoff
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Sanitize an identifier (file name, cluster name, etc.) for display
///
/// Removes control characters and limits length to prevent log injection attacks
/// and ensure readable error messages.
///
/// # Examples
///
/// ```
/// # use clickhouse_migrator::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("001_init.sql"), "001_init.sql");
/// assert_eq!(sanitize_identifier("bad\nname.sql"), "badname.sql");
///
/// // Length limit
/// let long_name = "a".repeat(200);
/// assert_eq!(sanitize_identifier(&long_name).len(), 100);
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// First non-empty value among `vars`
fn env_fallback(vars: &[&str]) -> Option<String> {
    vars.iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Name of the machine applying migrations, or empty if unknown
///
/// Asks the OS first; `HOSTNAME`/`COMPUTERNAME` are only consulted when the
/// system call fails.
pub fn hostname() -> String {
    whoami::fallible::hostname()
        .ok()
        .map(|host| host.trim().to_string())
        .filter(|host| !host.is_empty())
        .or_else(|| env_fallback(&["HOSTNAME", "COMPUTERNAME"]))
        .unwrap_or_default()
}

/// OS user invoking the tool, or empty if unknown
///
/// Resolved from the process uid, so it works under cron, systemd and in
/// containers where `USER` is not exported.
pub fn current_user() -> String {
    whoami::fallible::username()
        .ok()
        .filter(|user| !user.is_empty())
        .or_else(|| env_fallback(&["USER", "USERNAME"]))
        .unwrap_or_default()
}

/// Version recorded in the `cli_version` column
pub fn tool_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ABOUTME: ClickHouse connection over the HTTP interface
// ABOUTME: Handles authentication, TLS/mTLS setup, JSONEachRow queries and inserts

use crate::config::{ConnectionTarget, MigratorConfig, TlsMaterial};
use crate::error::{MigrationError, Result};
use crate::utils;
use async_trait::async_trait;
use native_tls::{Certificate, Identity, TlsConnector};
use serde_json::Value;
use std::time::Duration;

/// The operations the migration engine needs from ClickHouse
///
/// A single connection is shared by every request of one run.
#[async_trait]
pub trait ClickHouseConnection: Send + Sync {
    /// Run a query and return one JSON object per result row
    async fn query_rows(&self, sql: &str) -> Result<Vec<Value>>;

    /// Run a statement that produces no rows (DDL, ALTER, INSERT ... SELECT)
    async fn command(&self, sql: &str) -> Result<()>;

    /// Insert JSON objects into `table`
    async fn insert_rows(&self, table: &str, rows: &[Value]) -> Result<()>;

    /// Release the connection
    async fn close(&self) -> Result<()>;
}

/// ClickHouse HTTP client bound to one database
pub struct HttpConnection {
    http: reqwest::Client,
    target: ConnectionTarget,
    mutual_tls: bool,
}

impl HttpConnection {
    /// Build the HTTP client without contacting the server
    pub fn new(target: &ConnectionTarget, tls: Option<&TlsMaterial>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));

        if let Some(tls) = tls {
            builder = builder.use_preconfigured_tls(build_tls_connector(tls)?);
        }

        let http = builder.build()?;

        Ok(Self {
            http,
            target: target.clone(),
            mutual_tls: tls.map(TlsMaterial::is_mutual).unwrap_or(false),
        })
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Cheap round trip used to verify credentials and reachability
    pub async fn ping(&self) -> Result<()> {
        self.query_rows("SELECT 1").await.map(|_| ())
    }

    async fn post(&self, params: &[(&str, &str)], body: String) -> Result<String> {
        let mut request = self
            .http
            .post(self.target.endpoint())
            .query(&self.target.settings)
            .query(&[("database", self.target.database.as_str())])
            .query(params);

        request = if self.mutual_tls {
            request
                .header("X-ClickHouse-User", &self.target.username)
                .header("X-ClickHouse-SSL-Certificate-Auth", "on")
        } else {
            request.basic_auth(&self.target.username, Some(&self.target.password))
        };

        let response = request.body(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(MigrationError::ClickHouse {
                message: text.trim().to_string(),
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl ClickHouseConnection for HttpConnection {
    async fn query_rows(&self, sql: &str) -> Result<Vec<Value>> {
        let query = format!(
            "{}\nFORMAT JSONEachRow",
            sql.trim().trim_end_matches(';')
        );
        tracing::debug!("Query: {}", query);

        let body = self.post(&[], query).await?;
        parse_json_each_row(&body)
    }

    async fn command(&self, sql: &str) -> Result<()> {
        tracing::debug!("Command: {}", sql);
        self.post(&[], sql.to_string()).await.map(|_| ())
    }

    async fn insert_rows(&self, table: &str, rows: &[Value]) -> Result<()> {
        let query = format!("INSERT INTO {} FORMAT JSONEachRow", table);
        let body = rows
            .iter()
            .map(|row| row.to_string())
            .collect::<Vec<_>>()
            .join("\n");

        tracing::debug!("Insert into {}: {} row(s)", table, rows.len());
        self.post(&[("query", query.as_str())], body).await.map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!(
            "Closing connection to {}:{}",
            self.target.host,
            self.target.port
        );
        Ok(())
    }
}

/// Parse a JSONEachRow response body: one JSON object per non-empty line
fn parse_json_each_row(body: &str) -> Result<Vec<Value>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| MigrationError::Decode(format!("{} in row: {}", e, line)))
        })
        .collect()
}

fn build_tls_connector(tls: &TlsMaterial) -> Result<TlsConnector> {
    let ca = Certificate::from_pem(&tls.ca_cert)
        .map_err(|e| MigrationError::Tls(format!("Invalid CA certificate: {}", e)))?;

    let mut builder = TlsConnector::builder();
    builder.add_root_certificate(ca);

    if let Some(client) = &tls.client {
        let identity = Identity::from_pkcs8(&client.cert, &client.key)
            .map_err(|e| MigrationError::Tls(format!("Invalid client certificate or key: {}", e)))?;
        builder.identity(identity);
    }

    builder
        .build()
        .map_err(|e| MigrationError::Tls(format!("Failed to build TLS connector: {}", e)))
}

/// Turn a failed ping into an actionable message
fn explain_connect_error(target: &ConnectionTarget, err: MigrationError) -> MigrationError {
    let error_msg = err.to_string();

    let message = if error_msg.contains("AUTHENTICATION_FAILED")
        || error_msg.contains("Authentication failed")
    {
        "Authentication failed: Invalid username or password.\n\
         Please verify your ClickHouse credentials."
            .to_string()
    } else if error_msg.contains("UNKNOWN_DATABASE") {
        format!(
            "Database '{}' does not exist.\n\
             Please create the database first or check the connection URL.",
            target.database
        )
    } else if error_msg.contains("Connection refused") || error_msg.contains("error trying to connect")
    {
        format!(
            "Connection refused: Unable to reach ClickHouse at {}.\n\
             Please check:\n\
             - The host and port are correct\n\
             - The server is running and the HTTP interface is enabled\n\
             - Firewall rules allow connections\n\
             Error: {}",
            target.endpoint(),
            error_msg
        )
    } else {
        return err;
    };

    MigrationError::ClickHouse { message }
}

/// Open the HTTP connection described by `config` and verify it with a ping
pub async fn connect(config: &MigratorConfig) -> Result<HttpConnection> {
    let connection = HttpConnection::new(config.target(), config.tls())?;
    connection
        .ping()
        .await
        .map_err(|e| explain_connect_error(config.target(), e))?;
    Ok(connection)
}

/// Connect, retrying the ping for transient failures
///
/// Client construction errors (bad TLS material) are not retried.
pub async fn connect_with_retry(config: &MigratorConfig) -> Result<HttpConnection> {
    let connection = HttpConnection::new(config.target(), config.tls())?;

    utils::retry_with_backoff(
        || connection.ping(),
        3,                      // Max 3 retries
        Duration::from_secs(1), // Start with 1 second delay
    )
    .await
    .map_err(|e| explain_connect_error(config.target(), e))?;

    Ok(connection)
}

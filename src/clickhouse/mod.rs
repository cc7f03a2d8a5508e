// ABOUTME: ClickHouse connectivity module
// ABOUTME: Exports the connection trait and the HTTP implementation used by the runner

pub mod connection;

pub use connection::{connect, connect_with_retry, ClickHouseConnection, HttpConnection};

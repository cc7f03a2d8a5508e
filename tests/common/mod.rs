// ABOUTME: In-memory ClickHouse stand-in shared by runner integration tests
// ABOUTME: Records every request and answers the handful of queries the engine issues

#![allow(dead_code)]

use async_trait::async_trait;
use clickhouse_migrator::clickhouse::ClickHouseConnection;
use clickhouse_migrator::{MigrationError, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeState {
    clusters: Vec<String>,
    table_created: bool,
    fail_on: Option<String>,
    queries: Vec<String>,
    commands: Vec<String>,
    inserts: Vec<(String, Value)>,
    closed: usize,
}

/// Cloneable handle; clones share state so tests can inspect after a run
#[derive(Clone, Default)]
pub struct FakeClickHouse {
    state: Arc<Mutex<FakeState>>,
}

impl FakeClickHouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned from `system.clusters`, one per replica
    pub fn with_clusters(self, clusters: &[&str]) -> Self {
        self.state.lock().unwrap().clusters = clusters.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Pretend `version` was applied earlier with `checksum`
    pub fn with_applied(self, version: &str, name: &str, checksum: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.table_created = true;
            state.inserts.push((
                "schema_migrations".to_string(),
                json!({"version": version, "name": name, "checksum": checksum}),
            ));
        }
        self
    }

    /// Reject any command containing `needle`
    pub fn fail_on(&self, needle: &str) {
        self.state.lock().unwrap().fail_on = Some(needle.to_string());
    }

    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Commands other than the tracking table DDL
    pub fn migration_statements(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| !c.starts_with("CREATE TABLE IF NOT EXISTS schema_migrations"))
            .collect()
    }

    pub fn inserted_rows(&self) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .inserts
            .iter()
            .map(|(_, row)| row.clone())
            .collect()
    }

    pub fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    pub fn count_queries(&self, needle: &str) -> usize {
        self.queries().iter().filter(|q| q.contains(needle)).count()
    }

    /// Latest row per version, mirroring ReplacingMergeTree with FINAL
    fn final_records(state: &FakeState) -> Vec<Value> {
        let mut latest: BTreeMap<String, Value> = BTreeMap::new();
        for (_, row) in &state.inserts {
            let version = row["version"].as_str().unwrap_or_default().to_string();
            let mut row = row.clone();
            row["applied_at"] = json!("2024-01-01 00:00:00");
            latest.insert(version, row);
        }
        latest.into_values().collect()
    }
}

#[async_trait]
impl ClickHouseConnection for FakeClickHouse {
    async fn query_rows(&self, sql: &str) -> Result<Vec<Value>> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(sql.to_string());

        if sql.contains("system.clusters") {
            return Ok(state
                .clusters
                .iter()
                .map(|c| json!({"cluster": c, "shard_num": 1, "replica_num": 1}))
                .collect());
        }
        if sql.contains("system.tables") {
            return Ok(if state.table_created {
                vec![json!({"name": "schema_migrations"})]
            } else {
                Vec::new()
            });
        }
        if sql.contains(" FINAL") {
            return Ok(Self::final_records(&state));
        }
        Ok(vec![json!({"1": 1})])
    }

    async fn command(&self, sql: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(sql.to_string());

        if let Some(needle) = &state.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(MigrationError::ClickHouse {
                    message: format!("Code: 62. DB::Exception: Syntax error near {}", needle),
                });
            }
        }
        if sql.starts_with("CREATE TABLE IF NOT EXISTS schema_migrations") {
            state.table_created = true;
        }
        Ok(())
    }

    async fn insert_rows(&self, table: &str, rows: &[Value]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for row in rows {
            state.inserts.push((table.to_string(), row.clone()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closed += 1;
        Ok(())
    }
}

/// Write `files` (name, content) into `dir`
pub fn write_migrations(dir: &std::path::Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        std::fs::write(dir.join(name), content).unwrap();
    }
}

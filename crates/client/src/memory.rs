//! In-process backend for tests.
//!
//! Statement batches are logged instead of executed, and the status record
//! lives in a mutex-guarded map. Every accepted call lands in one ordered
//! event log, so tests can assert how DDL and status writes interleave. A
//! batch containing a statement that starts with [`FAIL_MARKER`] is refused,
//! which lets tests stage a failure at a chosen migration; health checks can
//! likewise be staged to fail a given number of times before recovering.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::{ClientError, SchemaAdmin, StatusStore};

/// Statements starting with this prefix make [`MemoryAdmin::apply_ddl`] fail.
pub const FAIL_MARKER: &str = "FAIL:";

/// One accepted call, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminEvent {
    Ddl(Vec<String>),
    Status { id: String, applied: bool },
}

#[derive(Debug, Default)]
struct State {
    statuses: HashMap<String, bool>,
    events: Vec<AdminEvent>,
    health_checks: usize,
    health_failures_remaining: usize,
    status_fetches: usize,
}

/// Schema admin and status store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryAdmin {
    state: Mutex<State>,
}

impl MemoryAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a pre-populated status record.
    pub fn with_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = (String, bool)>,
    {
        let admin = Self::new();
        admin.state.lock().expect("state lock").statuses = statuses.into_iter().collect();
        admin
    }

    /// Snapshot of the status record, for assertions.
    pub fn statuses(&self) -> HashMap<String, bool> {
        self.state.lock().expect("state lock").statuses.clone()
    }

    /// Every accepted call so far, in order.
    pub fn events(&self) -> Vec<AdminEvent> {
        self.state.lock().expect("state lock").events.clone()
    }

    /// Accepted statement batches, in application order.
    pub fn applied_batches(&self) -> Vec<Vec<String>> {
        self.state
            .lock()
            .expect("state lock")
            .events
            .iter()
            .filter_map(|event| match event {
                AdminEvent::Ddl(statements) => Some(statements.clone()),
                AdminEvent::Status { .. } => None,
            })
            .collect()
    }

    pub fn health_checks(&self) -> usize {
        self.state.lock().expect("state lock").health_checks
    }

    /// Refuse the next `count` health checks with an unavailable rejection.
    pub fn fail_health_checks(&self, count: usize) {
        self.state.lock().expect("state lock").health_failures_remaining = count;
    }

    pub fn status_fetches(&self) -> usize {
        self.state.lock().expect("state lock").status_fetches
    }
}

#[async_trait]
impl StatusStore for MemoryAdmin {
    async fn migration_statuses(&self) -> Result<HashMap<String, bool>, ClientError> {
        let mut state = self.state.lock().expect("state lock");
        state.status_fetches += 1;
        Ok(state.statuses.clone())
    }

    async fn record_status(&self, id: &str, applied: bool) -> Result<(), ClientError> {
        let mut state = self.state.lock().expect("state lock");
        state.statuses.insert(id.to_string(), applied);
        state.events.push(AdminEvent::Status { id: id.to_string(), applied });
        Ok(())
    }
}

#[async_trait]
impl SchemaAdmin for MemoryAdmin {
    async fn apply_ddl(&self, statements: &[String]) -> Result<(), ClientError> {
        if let Some(poisoned) = statements.iter().find(|s| s.starts_with(FAIL_MARKER)) {
            return Err(ClientError::StatementRefused(poisoned.clone()));
        }
        self.state.lock().expect("state lock").events.push(AdminEvent::Ddl(statements.to_vec()));
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ClientError> {
        let mut state = self.state.lock().expect("state lock");
        state.health_checks += 1;
        if state.health_failures_remaining > 0 {
            state.health_failures_remaining -= 1;
            return Err(ClientError::Rejected {
                operation: "health check",
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "schema admin unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn records_and_reports_statuses() {
        let admin = MemoryAdmin::new();
        admin.record_status("a", true).await.unwrap();
        admin.record_status("b", false).await.unwrap();
        admin.record_status("a", false).await.unwrap();

        let statuses = admin.migration_statuses().await.unwrap();
        assert_eq!(statuses, HashMap::from([("a".to_string(), false), ("b".to_string(), false)]));
        assert_eq!(admin.status_fetches(), 1);
    }

    #[tokio::test]
    async fn logs_calls_in_arrival_order_and_refuses_marked_batches() {
        let admin = MemoryAdmin::new();
        admin.apply_ddl(&["CREATE TABLE a (x INT64)".to_string()]).await.unwrap();
        admin.record_status("a", true).await.unwrap();

        let err = admin.apply_ddl(&[format!("{FAIL_MARKER} boom")]).await.unwrap_err();
        assert_matches!(err, ClientError::StatementRefused(_));

        // The refused batch must not reach the log.
        assert_eq!(
            admin.events(),
            vec![
                AdminEvent::Ddl(vec!["CREATE TABLE a (x INT64)".to_string()]),
                AdminEvent::Status { id: "a".to_string(), applied: true },
            ],
        );
        assert_eq!(admin.applied_batches(), vec![vec!["CREATE TABLE a (x INT64)".to_string()]]);
    }

    #[tokio::test]
    async fn staged_health_check_failures_are_consumed_in_order() {
        let admin = MemoryAdmin::new();
        admin.fail_health_checks(1);

        let err = admin.health_check().await.unwrap_err();
        assert_matches!(err, ClientError::Rejected { operation: "health check", .. });

        admin.health_check().await.unwrap();
        assert_eq!(admin.health_checks(), 2);
    }
}

//! Shared test fixtures: a scripted in-memory client and a sample entity.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rowkit::{
    Client, DbResult, EntityData, EntityKey, Error, Mutation, Row, RowCursor, ScanTarget,
    Scannable, Statement, Value,
};

/// Install the log subscriber once; honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scripted client that records every call instead of touching a database.
pub struct FakeClient {
    results: Mutex<VecDeque<DbResult<Vec<Row>>>>,
    pub queries: Mutex<Vec<Statement>>,
    pub applied: Mutex<Vec<Vec<Mutation>>>,
    pub apply_error: Mutex<Option<Error>>,
    pub released: Arc<AtomicUsize>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
            queries: Mutex::new(Vec::new()),
            applied: Mutex::new(Vec::new()),
            apply_error: Mutex::new(None),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script the result of the next query, in call order.
    pub fn push_result(&self, result: DbResult<Vec<Row>>) {
        self.results.lock().unwrap().push_back(result);
    }

    /// Make the next apply fail with the given error.
    pub fn fail_next_apply(&self, error: Error) {
        *self.apply_error.lock().unwrap() = Some(error);
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn apply_count(&self) -> usize {
        self.applied.lock().unwrap().len()
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn next_cursor(&self, stmt: &Statement) -> DbResult<RowCursor> {
        self.queries.lock().unwrap().push(stmt.clone());
        let rows = self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))?;
        let released = Arc::clone(&self.released);
        Ok(RowCursor::with_release(rows, move || {
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

#[async_trait]
impl Client for FakeClient {
    type Session = ();

    async fn query(&self, stmt: &Statement) -> DbResult<RowCursor> {
        self.next_cursor(stmt)
    }

    async fn query_in(&self, _session: &(), stmt: &Statement) -> DbResult<RowCursor> {
        self.next_cursor(stmt)
    }

    async fn apply(&self, mutations: &[Mutation]) -> DbResult<DateTime<Utc>> {
        if let Some(error) = self.apply_error.lock().unwrap().take() {
            return Err(error);
        }
        self.applied.lock().unwrap().push(mutations.to_vec());
        Ok(Utc::now())
    }
}

/// Sample entity mapped over (id, name).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
}

impl Scannable for User {
    fn scan_targets(&mut self) -> Vec<&mut dyn ScanTarget> {
        vec![&mut self.id, &mut self.name]
    }
}

impl EntityData for User {
    fn data(&self) -> Vec<(String, Value)> {
        vec![
            ("id".to_string(), Value::Int(self.id)),
            ("name".to_string(), Value::String(self.name.clone())),
        ]
    }
}

impl EntityKey for User {
    fn primary_key(&self) -> Vec<Value> {
        vec![Value::Int(self.id)]
    }
}

/// Build a (id, name) result row.
pub fn user_row(id: i64, name: &str) -> Row {
    Row::new(
        vec!["id".to_string(), "name".to_string()],
        vec![Value::Int(id), Value::String(name.to_string())],
    )
}

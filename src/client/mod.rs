//! Database client seam.
//!
//! The executor and transaction layers talk to the database through the
//! [`Client`] trait: an isolated read, a read inside an active database
//! transaction, and an atomic apply of buffered mutations. `client::sqlite`
//! provides the sqlx-backed implementation; tests substitute scripted
//! clients.

pub mod sqlite;

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DbResult;
use crate::mutation::Mutation;
use crate::statement::Statement;
use crate::value::Row;

pub use sqlite::{SqliteClient, SqliteSession};

/// A database connection handle.
#[async_trait]
pub trait Client: Send + Sync {
    /// An active read-write database transaction. Queries run inside it
    /// observe its uncommitted writes.
    type Session: Send + Sync;

    /// Run a statement as an isolated read.
    async fn query(&self, stmt: &Statement) -> DbResult<RowCursor>;

    /// Run a statement inside an active session.
    async fn query_in(&self, session: &Self::Session, stmt: &Statement) -> DbResult<RowCursor>;

    /// Atomically commit a batch of mutations, returning the commit
    /// timestamp.
    async fn apply(&self, mutations: &[Mutation]) -> DbResult<DateTime<Utc>>;
}

/// Iteration handle over a query's result rows.
///
/// The cursor owns whatever server-side resources the query holds; callers
/// must [`stop`](RowCursor::stop) it on every exit path. `Drop` releases as a
/// safety net, and release runs at most once.
pub struct RowCursor {
    rows: VecDeque<Row>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl RowCursor {
    /// Cursor over prefetched rows with nothing to release.
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into(),
            release: None,
        }
    }

    /// Cursor with a release hook, run once on stop or drop.
    pub fn with_release(rows: Vec<Row>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rows: rows.into(),
            release: Some(Box::new(release)),
        }
    }

    /// Next row, or `None` when the cursor is exhausted.
    pub fn next_row(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    /// Release the cursor's resources and discard any remaining rows.
    pub fn stop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        self.rows.clear();
    }
}

impl Drop for RowCursor {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Generic query execution and row-to-entity mapping.
//!
//! An [`Executor`] is parameterized by the entity type it produces and the
//! client it runs against. Each result row is decoded into a fresh
//! `E::default()` through the entity's scan targets, so nothing is shared
//! between rows, calls, or tasks holding the same executor.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::client::Client;
use crate::entity::{Scannable, scan_row};
use crate::error::{DbResult, Error};
use crate::statement::{Statement, ToSql};
use crate::value::Value;

/// Executes statements and maps result rows into entities of type `E`.
pub struct Executor<E, C> {
    client: Arc<C>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Scannable, C: Client> Executor<E, C> {
    /// Create an executor bound to a client.
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            _entity: PhantomData,
        }
    }

    /// Run a statement and decode every result row.
    ///
    /// With a session the query runs inside it and observes the session's
    /// uncommitted writes; without one it runs as an isolated read. The row
    /// cursor is released on every exit path. A decode failure on any row
    /// aborts the whole call; prior rows are discarded.
    pub async fn rows_for_stmt(
        &self,
        stmt: Statement,
        session: Option<&C::Session>,
    ) -> DbResult<Vec<E>> {
        let mut cursor = match session {
            Some(session) => self.client.query_in(session, &stmt).await?,
            None => self.client.query(&stmt).await?,
        };

        let mut entities = Vec::new();
        while let Some(row) = cursor.next_row() {
            let mut entity = E::default();
            if let Err(e) = scan_row(row, entity.scan_targets()) {
                cursor.stop();
                return Err(e);
            }
            entities.push(entity);
        }
        cursor.stop();

        debug!(rows = entities.len(), "query decoded");
        Ok(entities)
    }

    /// Build a statement from a SQL builder plus extra named arguments, then
    /// decode every result row outside any session.
    pub async fn rows(&self, builder: &dyn ToSql, extra_args: &[Value]) -> DbResult<Vec<E>> {
        let stmt = Statement::compose(builder, extra_args)?;
        self.rows_for_stmt(stmt, None).await
    }

    /// Build and run a statement expected to produce at most one row, and
    /// decode that row into a single entity.
    ///
    /// On zero rows this returns `E::default()` with no error; callers that
    /// need to tell "no row" from "zero-value row" should use
    /// [`row`](Executor::row) instead.
    pub async fn scalar(&self, builder: &dyn ToSql, extra_args: &[Value]) -> DbResult<E> {
        let stmt = Statement::compose(builder, extra_args)?;
        let mut cursor = self.client.query(&stmt).await?;

        let mut entity = E::default();
        if let Some(row) = cursor.next_row() {
            if let Err(e) = scan_row(row, entity.scan_targets()) {
                cursor.stop();
                return Err(e);
            }
        }
        cursor.stop();
        Ok(entity)
    }

    /// Build and run a statement, returning its single row as an entity.
    pub async fn row(&self, builder: &dyn ToSql) -> DbResult<E> {
        let stmt = Statement::compose(builder, &[])?;
        self.row_for_stmt(stmt, None).await
    }

    /// Run a statement, returning its single row as an entity.
    ///
    /// Zero rows is [`Error::RowNotFound`]; more than one row returns the
    /// first.
    pub async fn row_for_stmt(
        &self,
        stmt: Statement,
        session: Option<&C::Session>,
    ) -> DbResult<E> {
        let mut entities = self.rows_for_stmt(stmt, session).await?;
        if entities.is_empty() {
            return Err(Error::RowNotFound);
        }
        Ok(entities.swap_remove(0))
    }
}

impl<E, C> Clone for Executor<E, C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            _entity: PhantomData,
        }
    }
}

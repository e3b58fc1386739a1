//! Buffered write operations.
//!
//! A [`Mutation`] is one pending write against a table: insert, update,
//! insert-or-update, or delete. Mutations are created from entity
//! capabilities, accumulated on a [`Transaction`](crate::Transaction), and
//! only inspected again by the client that renders them at commit time.

use crate::entity::{EntityData, EntityKey};
use crate::value::Value;

/// One buffered write operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert a new row; fails at commit if the row already exists.
    Insert {
        table: String,
        data: Vec<(String, Value)>,
    },
    /// Update an existing row; the data must include its key columns.
    Update {
        table: String,
        data: Vec<(String, Value)>,
    },
    /// Insert the row, or update it if it already exists.
    InsertOrUpdate {
        table: String,
        data: Vec<(String, Value)>,
    },
    /// Delete the row with the given primary key.
    Delete { table: String, key: Vec<Value> },
}

impl Mutation {
    /// Build an insert mutation from an entity's data.
    pub fn insert(table: impl Into<String>, entity: &impl EntityData) -> Self {
        Self::Insert {
            table: table.into(),
            data: entity.data(),
        }
    }

    /// Build an update mutation from an entity's data.
    pub fn update(table: impl Into<String>, entity: &impl EntityData) -> Self {
        Self::Update {
            table: table.into(),
            data: entity.data(),
        }
    }

    /// Build an insert-or-update mutation from an entity's data.
    pub fn insert_or_update(table: impl Into<String>, entity: &impl EntityData) -> Self {
        Self::InsertOrUpdate {
            table: table.into(),
            data: entity.data(),
        }
    }

    /// Build a delete mutation from an entity's primary key.
    pub fn delete(table: impl Into<String>, entity: &impl EntityKey) -> Self {
        Self::Delete {
            table: table.into(),
            key: entity.primary_key(),
        }
    }

    /// The table this mutation targets.
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. }
            | Self::Update { table, .. }
            | Self::InsertOrUpdate { table, .. }
            | Self::Delete { table, .. } => table,
        }
    }

    /// Short operation name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::InsertOrUpdate { .. } => "insert_or_update",
            Self::Delete { .. } => "delete",
        }
    }
}

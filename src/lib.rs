//! rowkit — typed row mapping and buffered-mutation transactions.
//!
//! This library is a thin data-access layer over a SQL database client. It
//! does two things:
//!
//! - Executes parameterized statements and maps result rows into typed
//!   entities through the [`Executor`], driven by the entity's
//!   [`Scannable`] capability.
//! - Accumulates insert/update/upsert/delete mutations on a [`Transaction`]
//!   and commits them atomically, with mock nesting so inner logical units
//!   can share an outer commit.
//!
//! SQL text comes from an external builder through the [`ToSql`] boundary;
//! the database itself is reached through the [`Client`] trait, implemented
//! for SQLite by [`SqliteClient`].

pub mod client;
pub mod entity;
pub mod error;
pub mod executor;
pub mod mutation;
pub mod statement;
pub mod transaction;
pub mod value;

pub use client::{Client, RowCursor, SqliteClient, SqliteSession};
pub use entity::{EntityData, EntityKey, ScanTarget, Scannable, scan_row};
pub use error::{DbResult, Error, ok_if_not_found};
pub use executor::Executor;
pub use mutation::Mutation;
pub use statement::{Sql, Statement, ToSql};
pub use transaction::{Transaction, TransactionFactory};
pub use value::{Row, Value};

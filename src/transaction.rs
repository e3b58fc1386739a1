//! Mutation buffering transactions.
//!
//! A [`Transaction`] collects mutations and commits them atomically through
//! its client. Nesting is emulated rather than real: an inner logical unit
//! that believes it owns the transaction calls [`mock_write`] and later
//! balances it with a [`write`] that is absorbed instead of committing, so
//! the outer owner performs the one real commit.
//!
//! State lives behind a single async mutex held for the duration of every
//! mutating and committing call; clones share it, which is what makes the
//! handed-back mock "the same transaction".
//!
//! [`mock_write`]: Transaction::mock_write
//! [`write`]: Transaction::write

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::entity::{EntityData, EntityKey};
use crate::error::DbResult;
use crate::mutation::Mutation;

struct TxState {
    mutations: Vec<Mutation>,
    deepness: u32,
}

/// A set of buffered mutations committed in one atomic write.
pub struct Transaction<C: Client> {
    client: Arc<C>,
    state: Arc<Mutex<TxState>>,
}

impl<C: Client> Clone for Transaction<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            state: Arc::clone(&self.state),
        }
    }
}

impl<C: Client> Transaction<C> {
    fn new(client: Arc<C>) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(TxState {
                mutations: Vec::new(),
                deepness: 0,
            })),
        }
    }

    /// Buffer an insert mutation.
    pub async fn insert(&self, table: &str, entity: &impl EntityData) {
        self.push(Mutation::insert(table, entity)).await;
    }

    /// Buffer an update mutation.
    pub async fn update(&self, table: &str, entity: &impl EntityData) {
        self.push(Mutation::update(table, entity)).await;
    }

    /// Buffer an insert-or-update mutation.
    pub async fn insert_or_update(&self, table: &str, entity: &impl EntityData) {
        self.push(Mutation::insert_or_update(table, entity)).await;
    }

    /// Buffer a delete mutation.
    pub async fn delete(&self, table: &str, entity: &impl EntityKey) {
        self.push(Mutation::delete(table, entity)).await;
    }

    async fn push(&self, mutation: Mutation) {
        let mut state = self.state.lock().await;
        debug!(
            table = mutation.table(),
            kind = mutation.kind(),
            buffered = state.mutations.len() + 1,
            "mutation buffered"
        );
        state.mutations.push(mutation);
    }

    /// Snapshot of the currently buffered mutations.
    pub async fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().await.mutations.clone()
    }

    /// Mark this transaction as nested one level deeper and hand it back.
    ///
    /// Used when an inner operation owns the commit call but must not
    /// actually commit because an outer caller already does. Every
    /// `mock_write` must be balanced by exactly one later
    /// [`write`](Transaction::write); an unbalanced call leaves the
    /// transaction absorbing real commits forever.
    pub async fn mock_write(&self) -> Transaction<C> {
        let mut state = self.state.lock().await;
        state.deepness += 1;
        debug!(deepness = state.deepness, "transaction nested");
        self.clone()
    }

    /// Commit the buffered mutations.
    ///
    /// Three cases, checked under the lock:
    ///
    /// 1. Nested (`deepness > 0`): the call is absorbed — deepness is
    ///    decremented and `Ok(None)` is returned without touching the
    ///    database.
    /// 2. Empty buffer: nothing to commit; returns the current wall-clock
    ///    time so callers expecting a witness timestamp still get one.
    /// 3. Otherwise: one atomic commit of the whole buffer. The buffer is
    ///    cleared before the outcome is known, so the transaction is
    ///    reusable for a new batch whether or not the commit succeeded.
    pub async fn write(&self) -> DbResult<Option<DateTime<Utc>>> {
        let mut state = self.state.lock().await;

        if state.deepness > 0 {
            state.deepness -= 1;
            debug!(deepness = state.deepness, "nested commit absorbed");
            return Ok(None);
        }

        if state.mutations.is_empty() {
            return Ok(Some(Utc::now()));
        }

        let mutations = std::mem::take(&mut state.mutations);
        match self.client.apply(&mutations).await {
            Ok(commit_timestamp) => {
                info!(
                    mutation_count = mutations.len(),
                    commit_timestamp = %commit_timestamp,
                    "transaction committed"
                );
                Ok(Some(commit_timestamp))
            }
            Err(e) => {
                warn!(mutation_count = mutations.len(), error = %e, "commit failed");
                Err(e)
            }
        }
    }
}

/// Produces transactions bound to one client.
pub struct TransactionFactory<C: Client> {
    client: Arc<C>,
}

impl<C: Client> TransactionFactory<C> {
    /// Create a factory bound to a client.
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// A fresh transaction: empty buffer, deepness zero.
    pub fn new_transaction(&self) -> Transaction<C> {
        Transaction::new(Arc::clone(&self.client))
    }

    /// Nest into an existing transaction, or start a fresh one.
    ///
    /// This is the composition point that lets a function run either as a
    /// transaction root or as a participant in its caller's transaction with
    /// identical call code in both cases.
    pub async fn new_transaction_or_mock(
        &self,
        existing: Option<&Transaction<C>>,
    ) -> Transaction<C> {
        match existing {
            Some(tx) => tx.mock_write().await,
            None => self.new_transaction(),
        }
    }
}

impl<C: Client> Clone for TransactionFactory<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

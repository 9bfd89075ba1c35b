//! The offline sync queue.
//!
//! Every user-initiated mutation is captured here as a durable, ordered
//! operation and later applied to the remote ledger in strict FIFO order.
//! The queue is the durability guarantee for offline work: it is persisted
//! to the [LocalStore] before control returns to the caller and survives a
//! process restart.
//!
//! Each drained operation resolves to exactly one of:
//! - success: the operation is removed,
//! - retry: a transient failure; the operation stays at the head with its
//!   attempts counter incremented and the pass stops (head-of-line
//!   blocking, so an account creation is never overtaken by a transaction
//!   that references it),
//! - drop: a permanent rejection; the operation is removed without success.

use std::{cell::Cell, collections::VecDeque, sync::Arc};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    Error,
    account::{Account, AccountId},
    cache::LocalStore,
    remote::RemoteLedger,
    transaction::TransactionPayload,
};

/// The namespace key the queue is persisted under.
pub const SYNC_QUEUE_KEY: &str = "saldo.sync.queue.v1";

/// A not-yet-confirmed user mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SyncOperation {
    /// Create an account with a client-assigned ID.
    CreateAccount {
        /// The account as it existed when the user created it.
        account: Account,
    },
    /// Delete an account and its history.
    DeleteAccount {
        /// The account to delete.
        account_id: AccountId,
    },
    /// Post an income, expense, or transfer.
    AddTransaction {
        /// The account the operation targets (the source, for transfers).
        account_id: AccountId,
        /// The transaction and, for transfers, its destination and rate.
        payload: TransactionPayload,
    },
}

/// A [SyncOperation] with its queue bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation {
    /// An opaque unique ID for this queue entry.
    pub id: String,
    /// The captured mutation.
    #[serde(flatten)]
    pub operation: SyncOperation,
    /// When the operation was enqueued.
    pub created_at: OffsetDateTime,
    /// How many times the operation has failed transiently.
    pub attempts: u32,
}

/// What a drain pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Operations confirmed by the remote and removed.
    pub completed: usize,
    /// Operations permanently rejected and removed.
    pub dropped: usize,
    /// Whether the pass stopped early on a transient failure.
    pub blocked: bool,
}

impl DrainOutcome {
    /// Whether any operation was removed from the queue, successfully or
    /// not. The owner re-fetches authoritative state when this is true.
    pub fn removed_any(&self) -> bool {
        self.completed + self.dropped > 0
    }
}

/// An ordered, durable queue of not-yet-confirmed mutations.
#[derive(Debug)]
pub struct SyncQueue<S> {
    operations: VecDeque<QueuedOperation>,
    store: Arc<S>,
    draining: Cell<bool>,
}

impl<S: LocalStore> SyncQueue<S> {
    /// Reload any persisted queue from `store`.
    ///
    /// A missing or unreadable queue starts empty; queued work is only ever
    /// discarded explicitly, but a corrupt payload cannot be replayed.
    pub fn load(store: Arc<S>) -> Self {
        let operations = match store.get(SYNC_QUEUE_KEY) {
            Ok(Some(value)) => match serde_json::from_str(&value) {
                Ok(operations) => operations,
                Err(error) => {
                    tracing::warn!("discarding corrupt sync queue: {error}");
                    VecDeque::new()
                }
            },
            Ok(None) => VecDeque::new(),
            Err(error) => {
                tracing::warn!("could not read persisted sync queue: {error}");
                VecDeque::new()
            }
        };

        Self {
            operations,
            store,
            draining: Cell::new(false),
        }
    }

    /// The number of queued operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Whether a drain pass is currently in flight.
    pub fn is_draining(&self) -> bool {
        self.draining.get()
    }

    /// The queued operations in order, oldest first.
    pub fn operations(&self) -> &VecDeque<QueuedOperation> {
        &self.operations
    }

    /// Append a mutation to the tail of the queue and persist it.
    ///
    /// The operation is durable once this returns; enqueueing is the
    /// synchronous half of an optimistic mutation.
    ///
    /// # Errors
    /// Returns [Error::StorageError] or [Error::JSONSerializationError] if
    /// the queue cannot be persisted.
    pub fn enqueue(&mut self, operation: SyncOperation) -> Result<(), Error> {
        self.operations.push_back(QueuedOperation {
            id: Uuid::new_v4().to_string(),
            operation,
            created_at: OffsetDateTime::now_utc(),
            attempts: 0,
        });

        self.persist()
    }

    /// Apply queued operations to `remote`, head to tail.
    ///
    /// At most one drain runs at a time; a reentrant call returns
    /// immediately with an empty outcome. The pass stops at the first
    /// transient failure, leaving the failed operation at the head.
    ///
    /// # Errors
    /// Returns [Error::StorageError] or [Error::JSONSerializationError] if
    /// the queue cannot be re-persisted after a change.
    pub async fn drain<R: RemoteLedger>(&mut self, remote: &R) -> Result<DrainOutcome, Error> {
        if self.draining.replace(true) {
            return Ok(DrainOutcome::default());
        }

        let result = self.drain_pass(remote).await;
        self.draining.set(false);

        result
    }

    async fn drain_pass<R: RemoteLedger>(&mut self, remote: &R) -> Result<DrainOutcome, Error> {
        let mut outcome = DrainOutcome::default();

        while let Some(head) = self.operations.front() {
            match run_operation(remote, &head.operation).await {
                Ok(()) => {
                    tracing::debug!("sync operation {} confirmed", head.id);
                    self.operations.pop_front();
                    self.persist()?;
                    outcome.completed += 1;
                }
                Err(error) if error.is_transient() => {
                    tracing::debug!(
                        "sync operation {} failed transiently (attempt {}): {error}",
                        head.id,
                        head.attempts + 1,
                    );
                    if let Some(head) = self.operations.front_mut() {
                        head.attempts += 1;
                    }
                    self.persist()?;
                    outcome.blocked = true;
                    break;
                }
                Err(error) => {
                    tracing::warn!(
                        "dropping sync operation {} after permanent rejection: {error}",
                        head.id,
                    );
                    self.operations.pop_front();
                    self.persist()?;
                    outcome.dropped += 1;
                }
            }
        }

        Ok(outcome)
    }

    fn persist(&self) -> Result<(), Error> {
        let json = serde_json::to_string(&self.operations)?;
        self.store.set(SYNC_QUEUE_KEY, &json)
    }
}

async fn run_operation<R: RemoteLedger>(
    remote: &R,
    operation: &SyncOperation,
) -> Result<(), crate::remote::RemoteError> {
    match operation {
        SyncOperation::CreateAccount { account } => remote.create_account(account).await,
        SyncOperation::DeleteAccount { account_id } => remote.delete_account(*account_id).await,
        SyncOperation::AddTransaction {
            account_id,
            payload,
        } => remote.post_transaction(*account_id, payload).await,
    }
}

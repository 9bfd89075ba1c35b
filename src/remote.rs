//! The remote ledger boundary.
//!
//! The sync queue drains against this seam. The transport is deliberately
//! abstract: the contract is the operation set and the error classification,
//! not HTTP. [InProcessRemote] adapts a [LedgerStore] directly, playing the
//! role the API layer plays in a deployed system, including the mapping of
//! store errors onto client-visible rejections.

use async_trait::async_trait;

use crate::{
    Error,
    account::{Account, AccountId, NewAccount},
    ledger::LedgerStore,
    transaction::{TransactionId, TransactionPayload, TransactionUpdate},
};

/// An error reported by the remote ledger.
///
/// The split between transient and permanent variants is what drives the
/// sync queue's retry-versus-drop classification.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    /// The server could not be reached. Retryable.
    #[error("could not reach the ledger server: {0}")]
    Network(String),

    /// The server failed while applying the operation (a 5xx equivalent).
    /// Retryable.
    #[error("the ledger server failed to apply the operation: {0}")]
    Server(String),

    /// An account with the same ID already exists (a 409 equivalent).
    #[error("an account with this id already exists")]
    Conflict,

    /// The referenced account or transaction does not exist (a 404
    /// equivalent).
    #[error("the requested resource could not be found")]
    NotFound,

    /// The operation would overdraw an account (a 400 equivalent).
    #[error("insufficient funds")]
    InsufficientFunds,

    /// The server rejected the request as malformed (a 400 equivalent).
    #[error("the server rejected the request: {0}")]
    BadRequest(String),
}

impl RemoteError {
    /// Whether retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Server(_))
    }
}

/// The operations the client can invoke against the authoritative ledger.
#[async_trait]
pub trait RemoteLedger {
    /// Fetch all accounts with their transaction histories.
    async fn fetch_accounts(&self) -> Result<Vec<Account>, RemoteError>;

    /// Create an account, keeping the client-assigned ID.
    async fn create_account(&self, account: &Account) -> Result<(), RemoteError>;

    /// Delete an account and its transaction history.
    async fn delete_account(&self, account_id: AccountId) -> Result<(), RemoteError>;

    /// Post an income, expense, or transfer to an account.
    async fn post_transaction(
        &self,
        account_id: AccountId,
        payload: &TransactionPayload,
    ) -> Result<(), RemoteError>;

    /// Edit a transaction (both sides of a transfer).
    async fn update_transaction(
        &self,
        account_id: AccountId,
        transaction_id: TransactionId,
        updates: &TransactionUpdate,
    ) -> Result<(), RemoteError>;

    /// Soft-delete a transaction (and its transfer pair).
    async fn soft_delete_transaction(
        &self,
        account_id: AccountId,
        transaction_id: TransactionId,
    ) -> Result<(), RemoteError>;
}

/// A [RemoteLedger] that calls the ledger store directly, scoped to one
/// user.
#[derive(Debug, Clone)]
pub struct InProcessRemote {
    store: LedgerStore,
    user_id: String,
}

impl InProcessRemote {
    /// Create a remote over `store` acting as `user_id`.
    pub fn new(store: LedgerStore, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl RemoteLedger for InProcessRemote {
    async fn fetch_accounts(&self) -> Result<Vec<Account>, RemoteError> {
        self.store.get_accounts(&self.user_id).map_err(map_error)
    }

    async fn create_account(&self, account: &Account) -> Result<(), RemoteError> {
        let new_account = NewAccount {
            id: Some(account.id),
            name: account.name.clone(),
            initial_balance: account.initial_balance,
            is_foreign_currency: account.is_foreign_currency,
        };

        self.store
            .create_account(&self.user_id, &new_account)
            .map(|_| ())
            .map_err(map_error)
    }

    async fn delete_account(&self, account_id: AccountId) -> Result<(), RemoteError> {
        self.store
            .delete_account(&self.user_id, account_id)
            .map_err(map_error)
    }

    async fn post_transaction(
        &self,
        account_id: AccountId,
        payload: &TransactionPayload,
    ) -> Result<(), RemoteError> {
        if let Some(to_account_id) = payload.to_account_id {
            return self
                .store
                .transfer_between_accounts(
                    &self.user_id,
                    account_id,
                    to_account_id,
                    payload.transaction.amount.abs(),
                    payload.exchange_rate,
                )
                .map(|_| ())
                .map_err(map_error);
        }

        if payload.exchange_rate.is_some() {
            return Err(RemoteError::BadRequest(
                "only transfers may include an exchange rate".to_owned(),
            ));
        }

        self.store
            .append_transaction(&self.user_id, account_id, &payload.transaction)
            .map(|_| ())
            .map_err(map_error)
    }

    async fn update_transaction(
        &self,
        account_id: AccountId,
        transaction_id: TransactionId,
        updates: &TransactionUpdate,
    ) -> Result<(), RemoteError> {
        self.store
            .update_transaction(&self.user_id, account_id, transaction_id, updates)
            .map_err(map_error)
    }

    async fn soft_delete_transaction(
        &self,
        account_id: AccountId,
        transaction_id: TransactionId,
    ) -> Result<(), RemoteError> {
        self.store
            .soft_delete_transaction(&self.user_id, account_id, transaction_id)
            .map_err(map_error)
    }
}

/// Map store errors onto the client-visible rejection taxonomy.
///
/// Business-rule violations become permanent rejections; anything
/// infrastructural becomes a retryable server failure.
fn map_error(error: Error) -> RemoteError {
    match error {
        Error::DuplicateAccount | Error::DuplicateTransaction => RemoteError::Conflict,
        Error::AccountNotFound | Error::TransactionNotFound => RemoteError::NotFound,
        Error::InsufficientFunds => RemoteError::InsufficientFunds,
        error @ (Error::InvalidAmount
        | Error::InvalidExchangeRate
        | Error::SameAccountTransfer
        | Error::UnpairedTransfer) => RemoteError::BadRequest(error.to_string()),
        error => {
            tracing::error!("ledger store failed: {error}");
            RemoteError::Server(error.to_string())
        }
    }
}

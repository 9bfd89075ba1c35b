//! Saldo is an offline-first personal ledger engine.
//!
//! Users create accounts (cash buckets, possibly in a foreign currency) and
//! record income, expense, and transfer movements against them. Mutations
//! apply optimistically to local state, are durably queued, and reconcile
//! with the authoritative ledger store once connectivity allows, while the
//! store enforces money-conservation invariants: balances derived from
//! history, insufficient-funds checks, and all-or-nothing transfer pairs.
//!
//! The main entry points are [LedgerClient] (the client side),
//! [LedgerStore] (the authoritative side), and [InProcessRemote] (the
//! boundary wiring the two together in a single process).

#![warn(missing_docs)]

pub mod account;
pub mod cache;
pub mod client;
pub mod db;
pub mod ledger;
pub mod remote;
pub mod sync;
pub mod transaction;
pub mod transfer;

pub use account::{Account, AccountId, AccountUpdate, NewAccount};
pub use cache::{AccountCache, FileStore, LocalStore, MemoryStore, merge_accounts_by_id};
pub use client::LedgerClient;
pub use db::initialize as initialize_db;
pub use ledger::LedgerStore;
pub use remote::{InProcessRemote, RemoteError, RemoteLedger};
pub use sync::{DrainOutcome, QueuedOperation, SyncOperation, SyncQueue};
pub use transaction::{
    Transaction, TransactionId, TransactionKind, TransactionPayload, TransactionUpdate,
};
pub use transfer::{TransferTerms, build_transfer_pair, transfer_in_amount};

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The account ID does not refer to one of the user's accounts.
    #[error("the account could not be found")]
    AccountNotFound,

    /// The transaction ID does not refer to an active entry on the account.
    #[error("the transaction could not be found")]
    TransactionNotFound,

    /// The explicit account ID used to create an account already exists.
    #[error("an account with this id already exists")]
    DuplicateAccount,

    /// The logical transaction ID already exists on the target account.
    #[error("a transaction with this id already exists on the account")]
    DuplicateTransaction,

    /// An expense or transfer would overdraw the source account.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// A zero amount was used for a transaction or transfer.
    #[error("transaction amounts must be non-zero")]
    InvalidAmount,

    /// A cross-currency transfer was requested without a positive exchange
    /// rate.
    ///
    /// The rate is never defaulted: silently assuming a 1:1 rate would
    /// corrupt both balances.
    #[error("a positive exchange rate is required for cross-currency transfers")]
    InvalidExchangeRate,

    /// A transfer named the same account as source and destination.
    #[error("transfer source and destination must be different accounts")]
    SameAccountTransfer,

    /// A lone transfer entry was submitted outside a matched pair.
    #[error("transfer entries are created as a pair, not appended individually")]
    UnpairedTransfer,

    /// Could not acquire the database lock.
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// The client's durable local storage failed.
    #[error("local storage failed: {0}")]
    StorageError(String),

    /// An error occurred while serializing a struct as JSON.
    #[error("could not serialize as JSON: {0}")]
    JSONSerializationError(String),

    /// The remote ledger rejected or failed an online operation.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Codes 1555 and 2067 occur when a PRIMARY KEY or UNIQUE
            // constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if (sql_error.extended_code == 1555 || sql_error.extended_code == 2067)
                    && desc.contains("account.") =>
            {
                Error::DuplicateAccount
            }
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if (sql_error.extended_code == 1555 || sql_error.extended_code == 2067)
                    && desc.contains("transaction.") =>
            {
                Error::DuplicateTransaction
            }
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::JSONSerializationError(value.to_string())
    }
}

//! The authoritative ledger store.
//!
//! This module contains the server-side mutation logic the sync queue
//! drives:
//! - Per-user account and transaction persistence
//! - Balance recomputation from transaction history
//! - Atomic transfer application and paired soft-delete semantics
//!
//! Balance arithmetic is always derived here, never trusted from a client:
//! after every mutation the affected balances are recomputed from scratch as
//! `initial_balance + Σ(amount of non-deleted transactions)`.

use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::{
    Error,
    account::{Account, AccountId, AccountUpdate, NewAccount, decimal_column, map_row_to_account},
    db::initialize,
    transaction::{
        TRANSACTION_COLUMNS, Transaction, TransactionId, TransactionKind, TransactionUpdate,
        canonical_amount, map_row_to_transaction,
    },
    transfer::{TransferTerms, build_transfer_pair, is_transfer_out, transfer_in_amount},
};

// ============================================================================
// QUERIES
// ============================================================================

/// Get all of a user's accounts with their full transaction histories,
/// sorted by account ID.
///
/// Soft-deleted transactions are included; filtering them out is a display
/// concern.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_accounts(user_id: &str, connection: &Connection) -> Result<Vec<Account>, Error> {
    let mut accounts: Vec<Account> = connection
        .prepare(
            "SELECT id, name, initial_balance, current_balance, is_foreign_currency
             FROM account WHERE user_id = ?1 ORDER BY id",
        )?
        .query_map((user_id,), map_row_to_account)?
        .map(|account_result| account_result.map_err(Error::SqlError))
        .collect::<Result<_, _>>()?;

    for account in &mut accounts {
        account.transactions = account_transactions(user_id, account.id, connection)?;
    }

    Ok(accounts)
}

/// Get a single account with its full transaction history.
///
/// # Errors
/// This function will return a:
/// - [Error::AccountNotFound] if `account_id` does not refer to one of the
///   user's accounts,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_account(
    user_id: &str,
    account_id: AccountId,
    connection: &Connection,
) -> Result<Account, Error> {
    let mut account =
        get_account_row(user_id, account_id, connection)?.ok_or(Error::AccountNotFound)?;
    account.transactions = account_transactions(user_id, account_id, connection)?;

    Ok(account)
}

fn get_account_row(
    user_id: &str,
    account_id: AccountId,
    connection: &Connection,
) -> Result<Option<Account>, Error> {
    connection
        .prepare(
            "SELECT id, name, initial_balance, current_balance, is_foreign_currency
             FROM account WHERE user_id = ?1 AND id = ?2",
        )?
        .query_row((user_id, account_id), map_row_to_account)
        .optional()
        .map_err(Error::SqlError)
}

/// The account's entries in insertion order, including soft-deleted ones.
fn account_transactions(
    user_id: &str,
    account_id: AccountId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
             WHERE user_id = ?1 AND account_id = ?2 ORDER BY rowid"
        ))?
        .query_map((user_id, account_id), map_row_to_transaction)?
        .map(|transaction_result| transaction_result.map_err(Error::SqlError))
        .collect()
}

// ============================================================================
// ACCOUNT MUTATIONS
// ============================================================================

/// Create an account for a user.
///
/// When the input carries no explicit ID the store assigns the next free
/// one. The current balance starts equal to the initial balance.
///
/// # Errors
/// This function will return a:
/// - [Error::DuplicateAccount] if an explicit ID collides with an existing
///   account,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_account(
    user_id: &str,
    new_account: &NewAccount,
    connection: &Connection,
) -> Result<Account, Error> {
    let id = match new_account.id {
        Some(id) => id,
        None => next_account_id(user_id, connection)?,
    };

    connection.execute(
        "INSERT INTO account (user_id, id, name, initial_balance, current_balance, is_foreign_currency)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (
            user_id,
            id,
            &new_account.name,
            new_account.initial_balance.to_string(),
            new_account.initial_balance.to_string(),
            new_account.is_foreign_currency,
        ),
    )?;

    Ok(Account {
        id,
        name: new_account.name.clone(),
        initial_balance: new_account.initial_balance,
        current_balance: new_account.initial_balance,
        is_foreign_currency: new_account.is_foreign_currency,
        transactions: Vec::new(),
    })
}

fn next_account_id(user_id: &str, connection: &Connection) -> Result<AccountId, Error> {
    let max_id: AccountId = connection.query_row(
        "SELECT COALESCE(MAX(id), 0) FROM account WHERE user_id = ?1",
        (user_id,),
        |row| row.get(0),
    )?;

    Ok(max_id + 1)
}

/// Update an account's metadata.
///
/// Restating the initial balance triggers a balance recomputation.
///
/// # Errors
/// This function will return a:
/// - [Error::AccountNotFound] if `account_id` does not refer to one of the
///   user's accounts,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_account(
    user_id: &str,
    account_id: AccountId,
    update: &AccountUpdate,
    connection: &Connection,
) -> Result<Account, Error> {
    let account =
        get_account_row(user_id, account_id, connection)?.ok_or(Error::AccountNotFound)?;

    let name = update.name.clone().unwrap_or(account.name);
    let initial_balance = update.initial_balance.unwrap_or(account.initial_balance);
    let is_foreign_currency = update
        .is_foreign_currency
        .unwrap_or(account.is_foreign_currency);

    let tx = connection.unchecked_transaction()?;
    tx.execute(
        "UPDATE account SET name = ?3, initial_balance = ?4, is_foreign_currency = ?5
         WHERE user_id = ?1 AND id = ?2",
        (
            user_id,
            account_id,
            &name,
            initial_balance.to_string(),
            is_foreign_currency,
        ),
    )?;
    recompute_balance(user_id, account_id, &tx)?;
    tx.commit()?;

    get_account(user_id, account_id, connection)
}

/// Delete an account and its entire transaction history.
///
/// Incoming transfer entries on *other* accounts are left in place; they
/// keep those accounts' histories reproducible.
///
/// # Errors
/// This function will return a:
/// - [Error::AccountNotFound] if `account_id` does not refer to one of the
///   user's accounts,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn delete_account(
    user_id: &str,
    account_id: AccountId,
    connection: &Connection,
) -> Result<(), Error> {
    let tx = connection.unchecked_transaction()?;

    tx.execute(
        "DELETE FROM \"transaction\" WHERE user_id = ?1 AND account_id = ?2",
        (user_id, account_id),
    )?;
    let deleted = tx.execute(
        "DELETE FROM account WHERE user_id = ?1 AND id = ?2",
        (user_id, account_id),
    )?;

    if deleted == 0 {
        return Err(Error::AccountNotFound);
    }

    tx.commit()?;
    Ok(())
}

// ============================================================================
// TRANSACTION MUTATIONS
// ============================================================================

/// Append an income or expense entry to an account.
///
/// The amount is canonicalized (income positive, expense negative) and the
/// account balance is recomputed from scratch in the same database
/// transaction. An expense whose magnitude exceeds the current balance is
/// rejected. The client-supplied logical ID is kept when present; a
/// non-positive ID asks the store to assign one.
///
/// # Errors
/// This function will return a:
/// - [Error::AccountNotFound] if `account_id` does not refer to one of the
///   user's accounts,
/// - [Error::UnpairedTransfer] if the entry is a transfer (use
///   [transfer_between_accounts]),
/// - [Error::InvalidAmount] if the amount is zero,
/// - [Error::InsufficientFunds] if an expense overdraws the account,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn append_transaction(
    user_id: &str,
    account_id: AccountId,
    transaction: &Transaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let account =
        get_account_row(user_id, account_id, connection)?.ok_or(Error::AccountNotFound)?;

    if transaction.kind == TransactionKind::Transfer {
        return Err(Error::UnpairedTransfer);
    }

    let amount = canonical_amount(transaction.kind, transaction.amount);
    if amount.is_zero() {
        return Err(Error::InvalidAmount);
    }

    if transaction.kind == TransactionKind::Expense && amount.abs() > account.current_balance {
        return Err(Error::InsufficientFunds);
    }

    let id = if transaction.id > 0 {
        transaction.id
    } else {
        next_transaction_id(user_id, connection)?
    };
    let stored = Transaction {
        id,
        amount,
        from_account: account_id,
        ..transaction.clone()
    };

    let tx = connection.unchecked_transaction()?;
    insert_transaction(user_id, account_id, &stored, &tx)?;
    recompute_balance(user_id, account_id, &tx)?;
    tx.commit()?;

    Ok(stored)
}

/// Move money between two of a user's accounts.
///
/// Produces the matched entry pair from the transfer calculator and applies
/// both sides in a single database transaction; a transfer is never applied
/// to only one account. Returns the stored `(outgoing, incoming)` pair.
///
/// # Errors
/// This function will return a:
/// - [Error::SameAccountTransfer] if source and destination are the same,
/// - [Error::InvalidAmount] if the amount is zero,
/// - [Error::AccountNotFound] if either account is missing,
/// - [Error::InsufficientFunds] if the source balance is below the amount,
/// - [Error::InvalidExchangeRate] if the transfer is cross-currency and the
///   rate is missing or not positive,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn transfer_between_accounts(
    user_id: &str,
    from_id: AccountId,
    to_id: AccountId,
    amount: Decimal,
    exchange_rate: Option<Decimal>,
    connection: &Connection,
) -> Result<(Transaction, Transaction), Error> {
    if from_id == to_id {
        return Err(Error::SameAccountTransfer);
    }

    let amount = amount.abs();
    if amount.is_zero() {
        return Err(Error::InvalidAmount);
    }

    let from = get_account_row(user_id, from_id, connection)?.ok_or(Error::AccountNotFound)?;
    let to = get_account_row(user_id, to_id, connection)?.ok_or(Error::AccountNotFound)?;

    if from.current_balance < amount {
        return Err(Error::InsufficientFunds);
    }

    let id = next_transaction_id(user_id, connection)?;
    let (outgoing, incoming) = build_transfer_pair(
        id,
        OffsetDateTime::now_utc(),
        &from,
        &to,
        amount,
        exchange_rate,
    )?;

    let tx = connection.unchecked_transaction()?;
    insert_transaction(user_id, from_id, &outgoing, &tx)?;
    insert_transaction(user_id, to_id, &incoming, &tx)?;
    recompute_balance(user_id, from_id, &tx)?;
    recompute_balance(user_id, to_id, &tx)?;
    tx.commit()?;

    Ok((outgoing, incoming))
}

/// Edit a transaction.
///
/// For a transfer both linked entries are updated together: the incoming
/// amount is re-derived from the (possibly new) source amount and exchange
/// rate. Insufficient-funds checks run against the balance with the old
/// entry removed, so shrinking an expense is always allowed.
///
/// # Errors
/// This function will return a:
/// - [Error::TransactionNotFound] if the entry is missing or already
///   soft-deleted,
/// - [Error::InvalidAmount], [Error::InsufficientFunds], or
///   [Error::InvalidExchangeRate] under the same rules as creation,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_transaction(
    user_id: &str,
    account_id: AccountId,
    transaction_id: TransactionId,
    updates: &TransactionUpdate,
    connection: &Connection,
) -> Result<(), Error> {
    let stored = load_entry(user_id, account_id, transaction_id, connection)?
        .ok_or(Error::TransactionNotFound)?;

    if stored.entry.is_deleted {
        return Err(Error::TransactionNotFound);
    }

    if stored.entry.kind == TransactionKind::Transfer {
        return update_transfer_entries(user_id, transaction_id, updates, connection);
    }

    let account =
        get_account_row(user_id, account_id, connection)?.ok_or(Error::AccountNotFound)?;

    let amount = canonical_amount(
        stored.entry.kind,
        updates.amount.unwrap_or(stored.entry.amount),
    );
    if amount.is_zero() {
        return Err(Error::InvalidAmount);
    }

    // The old entry no longer counts against the balance once replaced.
    let balance_without_old = account.current_balance - stored.entry.amount;
    if stored.entry.kind == TransactionKind::Expense && amount.abs() > balance_without_old {
        return Err(Error::InsufficientFunds);
    }

    let date = updates.date.unwrap_or(stored.entry.date);
    let description = updates
        .description
        .clone()
        .unwrap_or(stored.entry.description);

    let tx = connection.unchecked_transaction()?;
    tx.execute(
        "UPDATE \"transaction\" SET date = ?2, description = ?3, amount = ?4, updated_at = ?5
         WHERE rowid = ?1",
        (
            stored.rowid,
            date,
            &description,
            amount.to_string(),
            OffsetDateTime::now_utc(),
        ),
    )?;
    recompute_balance(user_id, account_id, &tx)?;
    tx.commit()?;

    Ok(())
}

fn update_transfer_entries(
    user_id: &str,
    transaction_id: TransactionId,
    updates: &TransactionUpdate,
    connection: &Connection,
) -> Result<(), Error> {
    let (outgoing, incoming) = load_transfer_pair(user_id, transaction_id, connection)?;

    let from = get_account_row(user_id, outgoing.account_id, connection)?
        .ok_or(Error::AccountNotFound)?;
    let to = get_account_row(user_id, incoming.account_id, connection)?
        .ok_or(Error::AccountNotFound)?;

    let source_amount = updates
        .amount
        .unwrap_or(outgoing.entry.amount)
        .abs();
    if source_amount.is_zero() {
        return Err(Error::InvalidAmount);
    }

    let exchange_rate = updates.exchange_rate.or(outgoing.entry.exchange_rate);
    let terms = TransferTerms {
        source_amount,
        from_is_foreign: from.is_foreign_currency,
        to_is_foreign: to.is_foreign_currency,
        exchange_rate,
    };
    let incoming_amount = transfer_in_amount(&terms)?;
    let stored_rate = if terms.is_cross_currency() {
        exchange_rate.map(|rate| rate.to_string())
    } else {
        None
    };

    let balance_without_old = from.current_balance - outgoing.entry.amount;
    if source_amount > balance_without_old {
        return Err(Error::InsufficientFunds);
    }

    let now = OffsetDateTime::now_utc();
    let tx = connection.unchecked_transaction()?;

    for (stored, amount) in [(&outgoing, -source_amount), (&incoming, incoming_amount)] {
        let date = updates.date.unwrap_or(stored.entry.date);
        let description = updates
            .description
            .clone()
            .unwrap_or_else(|| stored.entry.description.clone());

        tx.execute(
            "UPDATE \"transaction\"
             SET date = ?2, description = ?3, amount = ?4, exchange_rate = ?5, updated_at = ?6
             WHERE rowid = ?1",
            (
                stored.rowid,
                date,
                &description,
                amount.to_string(),
                &stored_rate,
                now,
            ),
        )?;
    }

    recompute_balance(user_id, outgoing.account_id, &tx)?;
    recompute_balance(user_id, incoming.account_id, &tx)?;
    tx.commit()?;

    Ok(())
}

/// Soft-delete a transaction.
///
/// The entry is marked deleted rather than removed, preserving the history
/// for audit and keeping running-balance computations reproducible. Both
/// sides of a transfer are always marked together, and every affected
/// account balance is recomputed.
///
/// # Errors
/// This function will return a:
/// - [Error::TransactionNotFound] if the entry is missing or already
///   soft-deleted,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn soft_delete_transaction(
    user_id: &str,
    account_id: AccountId,
    transaction_id: TransactionId,
    connection: &Connection,
) -> Result<(), Error> {
    let stored = load_entry(user_id, account_id, transaction_id, connection)?
        .ok_or(Error::TransactionNotFound)?;

    if stored.entry.is_deleted {
        return Err(Error::TransactionNotFound);
    }

    let entries = if stored.entry.kind == TransactionKind::Transfer {
        let (outgoing, incoming) = load_transfer_pair(user_id, transaction_id, connection)?;
        vec![outgoing, incoming]
    } else {
        vec![stored]
    };

    let now = OffsetDateTime::now_utc();
    let tx = connection.unchecked_transaction()?;

    for entry in &entries {
        tx.execute(
            "UPDATE \"transaction\" SET is_deleted = 1, deleted_at = ?2 WHERE rowid = ?1",
            (entry.rowid, now),
        )?;
    }
    for entry in &entries {
        recompute_balance(user_id, entry.account_id, &tx)?;
    }

    tx.commit()?;
    Ok(())
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Recompute an account's balance from scratch.
///
/// `current_balance = initial_balance + Σ(amount of non-deleted entries)`.
/// Deriving the balance from history after every mutation, instead of
/// adjusting it incrementally, means consistency cannot be lost to a missed
/// update path.
///
/// # Errors
/// This function will return a:
/// - [Error::AccountNotFound] if `account_id` does not refer to one of the
///   user's accounts,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn recompute_balance(
    user_id: &str,
    account_id: AccountId,
    connection: &Connection,
) -> Result<Decimal, Error> {
    let initial_balance = connection
        .prepare("SELECT initial_balance FROM account WHERE user_id = ?1 AND id = ?2")?
        .query_row((user_id, account_id), |row| decimal_column(row, 0))
        .optional()?
        .ok_or(Error::AccountNotFound)?;

    let active_total = connection
        .prepare(
            "SELECT amount FROM \"transaction\"
             WHERE user_id = ?1 AND account_id = ?2 AND is_deleted = 0",
        )?
        .query_map((user_id, account_id), |row| decimal_column(row, 0))?
        .try_fold(Decimal::ZERO, |total, amount_result| {
            amount_result.map(|amount| total + amount)
        })?;

    let balance = initial_balance + active_total;
    connection.execute(
        "UPDATE account SET current_balance = ?3 WHERE user_id = ?1 AND id = ?2",
        (user_id, account_id, balance.to_string()),
    )?;

    Ok(balance)
}

fn insert_transaction(
    user_id: &str,
    account_id: AccountId,
    transaction: &Transaction,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "INSERT INTO \"transaction\" (user_id, account_id, id, date, description, amount, kind,
                from_account, to_account, exchange_rate, is_deleted, deleted_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        (
            user_id,
            account_id,
            transaction.id,
            transaction.date,
            &transaction.description,
            transaction.amount.to_string(),
            transaction.kind.as_str(),
            transaction.from_account,
            transaction.to_account,
            transaction.exchange_rate.map(|rate| rate.to_string()),
            transaction.is_deleted,
            transaction.deleted_at,
            transaction.updated_at,
        ),
    )?;

    Ok(())
}

/// Logical transaction IDs are wall-clock milliseconds on the clients, so
/// new server-assigned IDs start there and fall back to max + 1 once the
/// user's history has caught up past the clock.
fn next_transaction_id(
    user_id: &str,
    connection: &Connection,
) -> Result<TransactionId, Error> {
    let max_id: TransactionId = connection.query_row(
        "SELECT COALESCE(MAX(id), 0) FROM \"transaction\" WHERE user_id = ?1",
        (user_id,),
        |row| row.get(0),
    )?;
    let wall_clock = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;

    Ok(std::cmp::max(max_id + 1, wall_clock))
}

/// A transaction row together with the bookkeeping needed to address it.
struct StoredEntry {
    rowid: i64,
    account_id: AccountId,
    entry: Transaction,
}

fn load_entry(
    user_id: &str,
    account_id: AccountId,
    transaction_id: TransactionId,
    connection: &Connection,
) -> Result<Option<StoredEntry>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS}, rowid, account_id FROM \"transaction\"
             WHERE user_id = ?1 AND account_id = ?2 AND id = ?3"
        ))?
        .query_row((user_id, account_id, transaction_id), |row| {
            Ok(StoredEntry {
                rowid: row.get(11)?,
                account_id: row.get(12)?,
                entry: map_row_to_transaction(row)?,
            })
        })
        .optional()
        .map_err(Error::SqlError)
}

/// Resolve both linked entries of a transfer.
///
/// This is the single place pairing is resolved; update and soft-delete go
/// through here so the two entries can never be mutated in isolation.
fn load_transfer_pair(
    user_id: &str,
    transaction_id: TransactionId,
    connection: &Connection,
) -> Result<(StoredEntry, StoredEntry), Error> {
    let entries: Vec<StoredEntry> = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS}, rowid, account_id FROM \"transaction\"
             WHERE user_id = ?1 AND id = ?2 AND kind = 'transfer' AND is_deleted = 0"
        ))?
        .query_map((user_id, transaction_id), |row| {
            Ok(StoredEntry {
                rowid: row.get(11)?,
                account_id: row.get(12)?,
                entry: map_row_to_transaction(row)?,
            })
        })?
        .map(|entry_result| entry_result.map_err(Error::SqlError))
        .collect::<Result<_, _>>()?;

    if entries.len() != 2 {
        tracing::error!(
            "transfer {transaction_id} has {} active entries, expected a pair",
            entries.len()
        );
        return Err(Error::TransactionNotFound);
    }

    let mut outgoing = None;
    let mut incoming = None;
    for entry in entries {
        if is_transfer_out(&entry.entry) {
            outgoing = Some(entry);
        } else {
            incoming = Some(entry);
        }
    }

    match (outgoing, incoming) {
        (Some(outgoing), Some(incoming)) => Ok((outgoing, incoming)),
        _ => {
            tracing::error!("transfer {transaction_id} entries do not have opposite signs");
            Err(Error::TransactionNotFound)
        }
    }
}

// ============================================================================
// STORE HANDLE
// ============================================================================

/// A cloneable handle to the authoritative ledger database.
///
/// Wraps the connection behind a mutex so the remote boundary and tests can
/// share one store.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    connection: Arc<Mutex<Connection>>,
}

impl LedgerStore {
    /// Create a new [LedgerStore], initialising the schema.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(connection: Connection) -> Result<Self, Error> {
        initialize(&connection)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, Error> {
        self.connection.lock().map_err(|_| Error::DatabaseLockError)
    }

    /// See [get_accounts].
    ///
    /// # Errors
    /// As [get_accounts], plus [Error::DatabaseLockError].
    pub fn get_accounts(&self, user_id: &str) -> Result<Vec<Account>, Error> {
        get_accounts(user_id, &*self.lock()?)
    }

    /// See [get_account].
    ///
    /// # Errors
    /// As [get_account], plus [Error::DatabaseLockError].
    pub fn get_account(&self, user_id: &str, account_id: AccountId) -> Result<Account, Error> {
        get_account(user_id, account_id, &*self.lock()?)
    }

    /// See [create_account].
    ///
    /// # Errors
    /// As [create_account], plus [Error::DatabaseLockError].
    pub fn create_account(
        &self,
        user_id: &str,
        new_account: &NewAccount,
    ) -> Result<Account, Error> {
        create_account(user_id, new_account, &*self.lock()?)
    }

    /// See [update_account].
    ///
    /// # Errors
    /// As [update_account], plus [Error::DatabaseLockError].
    pub fn update_account(
        &self,
        user_id: &str,
        account_id: AccountId,
        update: &AccountUpdate,
    ) -> Result<Account, Error> {
        update_account(user_id, account_id, update, &*self.lock()?)
    }

    /// See [delete_account].
    ///
    /// # Errors
    /// As [delete_account], plus [Error::DatabaseLockError].
    pub fn delete_account(&self, user_id: &str, account_id: AccountId) -> Result<(), Error> {
        delete_account(user_id, account_id, &*self.lock()?)
    }

    /// See [append_transaction].
    ///
    /// # Errors
    /// As [append_transaction], plus [Error::DatabaseLockError].
    pub fn append_transaction(
        &self,
        user_id: &str,
        account_id: AccountId,
        transaction: &Transaction,
    ) -> Result<Transaction, Error> {
        append_transaction(user_id, account_id, transaction, &*self.lock()?)
    }

    /// See [transfer_between_accounts].
    ///
    /// # Errors
    /// As [transfer_between_accounts], plus [Error::DatabaseLockError].
    pub fn transfer_between_accounts(
        &self,
        user_id: &str,
        from_id: AccountId,
        to_id: AccountId,
        amount: Decimal,
        exchange_rate: Option<Decimal>,
    ) -> Result<(Transaction, Transaction), Error> {
        transfer_between_accounts(user_id, from_id, to_id, amount, exchange_rate, &*self.lock()?)
    }

    /// See [update_transaction].
    ///
    /// # Errors
    /// As [update_transaction], plus [Error::DatabaseLockError].
    pub fn update_transaction(
        &self,
        user_id: &str,
        account_id: AccountId,
        transaction_id: TransactionId,
        updates: &TransactionUpdate,
    ) -> Result<(), Error> {
        update_transaction(user_id, account_id, transaction_id, updates, &*self.lock()?)
    }

    /// See [soft_delete_transaction].
    ///
    /// # Errors
    /// As [soft_delete_transaction], plus [Error::DatabaseLockError].
    pub fn soft_delete_transaction(
        &self,
        user_id: &str,
        account_id: AccountId,
        transaction_id: TransactionId,
    ) -> Result<(), Error> {
        soft_delete_transaction(user_id, account_id, transaction_id, &*self.lock()?)
    }
}

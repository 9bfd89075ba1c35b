//! Transaction management for the ledger.
//!
//! This module contains everything related to individual ledger entries:
//! - The `Transaction` model and `TransactionBuilder` for creating entries
//! - The canonical sign rule for stored amounts
//! - Database functions for the transaction table

use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::account::{AccountId, decimal_column, optional_decimal_column};

/// Alias for the integer type used for logical transaction IDs.
///
/// A transfer produces two entries sharing one logical ID, so this is not a
/// primary key on its own.
pub type TransactionId = i64;

// ============================================================================
// MODELS
// ============================================================================

/// The kind of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money entering an account. Stored amounts are always positive.
    Income,
    /// Money leaving an account. Stored amounts are always negative.
    Expense,
    /// One side of a matched pair moving money between two accounts.
    Transfer,
}

impl TransactionKind {
    /// The lowercase name used in the database and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
            TransactionKind::Transfer => "transfer",
        }
    }
}

/// A single ledger entry: an income, an expense, or one side of a transfer.
///
/// To create a new `Transaction`, use [Transaction::build].
///
/// Entries are soft-deleted rather than physically removed: `is_deleted`
/// excludes them from balance computations while keeping the history
/// reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// The logical ID of the entry. Shared by both sides of a transfer.
    pub id: TransactionId,
    /// When the transaction happened.
    pub date: OffsetDateTime,
    /// A text description of what the transaction was for.
    pub description: String,
    /// The signed, canonical amount (see [canonical_amount]).
    pub amount: Decimal,
    /// The kind of entry.
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// The account the money came from (for transfers) or the owning
    /// account (for income and expenses).
    pub from_account: AccountId,
    /// The destination account. Only present on transfer entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_account: Option<AccountId>,
    /// The exchange rate applied to a cross-currency transfer. Only stored
    /// when at least one side of the transfer is foreign-currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_rate: Option<Decimal>,
    /// Whether the entry has been soft-deleted.
    #[serde(default)]
    pub is_deleted: bool,
    /// When the entry was soft-deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<OffsetDateTime>,
    /// When the entry was last edited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(
        amount: Decimal,
        kind: TransactionKind,
        from_account: AccountId,
    ) -> TransactionBuilder {
        TransactionBuilder {
            amount,
            kind,
            from_account,
            date: OffsetDateTime::now_utc(),
            description: None,
            to_account: None,
            exchange_rate: None,
        }
    }
}

/// A builder for creating [Transaction] instances.
///
/// The amount passed to [Transaction::build] may carry either sign; it is
/// canonicalized by kind when the builder is finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionBuilder {
    amount: Decimal,
    kind: TransactionKind,
    from_account: AccountId,
    date: OffsetDateTime,
    description: Option<String>,
    to_account: Option<AccountId>,
    exchange_rate: Option<Decimal>,
}

impl TransactionBuilder {
    /// Set the date of the transaction. Defaults to now.
    pub fn date(mut self, date: OffsetDateTime) -> Self {
        self.date = date;
        self
    }

    /// Set the description. Defaults to the kind name.
    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    /// Set the destination account for a transfer entry.
    pub fn to_account(mut self, to_account: AccountId) -> Self {
        self.to_account = Some(to_account);
        self
    }

    /// Set the exchange rate for a cross-currency transfer entry.
    pub fn exchange_rate(mut self, exchange_rate: Decimal) -> Self {
        self.exchange_rate = Some(exchange_rate);
        self
    }

    /// Build the final [Transaction] with the canonical sign for its kind.
    pub fn finalize(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            date: self.date,
            description: self
                .description
                .unwrap_or_else(|| self.kind.as_str().to_owned()),
            amount: canonical_amount(self.kind, self.amount),
            kind: self.kind,
            from_account: self.from_account,
            to_account: self.to_account,
            exchange_rate: self.exchange_rate,
            is_deleted: false,
            deleted_at: None,
            updated_at: None,
        }
    }
}

/// The sign-normalized stored value for a transaction amount.
///
/// Income amounts are stored positive, expense amounts negative. Transfer
/// amounts keep their sign: the sign is what distinguishes the outgoing
/// entry from the incoming entry of a pair.
pub fn canonical_amount(kind: TransactionKind, amount: Decimal) -> Decimal {
    match kind {
        TransactionKind::Income => amount.abs(),
        TransactionKind::Expense => -amount.abs(),
        TransactionKind::Transfer => amount,
    }
}

/// The wire payload of a queued `add_transaction` operation.
///
/// For transfers, `transaction` holds the canonical outgoing entry and the
/// destination and rate travel alongside it; the server rebuilds the matched
/// pair itself rather than trusting the client's incoming entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    /// The transaction to apply.
    pub transaction: Transaction,
    /// The destination account of a transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_account_id: Option<AccountId>,
    /// The exchange rate of a cross-currency transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_rate: Option<Decimal>,
}

/// A partial update to a transaction.
///
/// Fields left as `None` keep their stored value. On a transfer, the amount
/// is the new source-side magnitude and the paired incoming entry is
/// recomputed from the (possibly updated) exchange rate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionUpdate {
    /// Change when the transaction happened.
    pub date: Option<OffsetDateTime>,
    /// Change the description.
    pub description: Option<String>,
    /// Change the amount. Canonicalized by the entry's kind.
    pub amount: Option<Decimal>,
    /// Change the exchange rate of a cross-currency transfer.
    pub exchange_rate: Option<Decimal>,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the transaction table in the database.
///
/// The logical `id` is deliberately not the primary key: both sides of a
/// transfer share one logical ID and live on different accounts.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                user_id TEXT NOT NULL,
                account_id INTEGER NOT NULL,
                id INTEGER NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                amount TEXT NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('income', 'expense', 'transfer')),
                from_account INTEGER NOT NULL,
                to_account INTEGER,
                exchange_rate TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                deleted_at TEXT,
                updated_at TEXT,
                UNIQUE (user_id, account_id, id),
                FOREIGN KEY (user_id, account_id)
                    REFERENCES account (user_id, id) ON DELETE CASCADE
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_account
             ON \"transaction\" (user_id, account_id)",
        (),
    )?;

    Ok(())
}

/// The column list matching [map_row_to_transaction], for reuse in queries.
pub(crate) const TRANSACTION_COLUMNS: &str = "id, date, description, amount, kind, from_account, \
     to_account, exchange_rate, is_deleted, deleted_at, updated_at";

/// Map a database row to a [Transaction].
///
/// Expects the columns of [TRANSACTION_COLUMNS] in order.
pub fn map_row_to_transaction(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let id = row.get(0)?;
    let date = row.get(1)?;
    let description = row.get(2)?;
    let amount = decimal_column(row, 3)?;
    let kind = kind_column(row, 4)?;
    let from_account = row.get(5)?;
    let to_account = row.get(6)?;
    let exchange_rate = optional_decimal_column(row, 7)?;
    let is_deleted = row.get(8)?;
    let deleted_at = row.get(9)?;
    let updated_at = row.get(10)?;

    Ok(Transaction {
        id,
        date,
        description,
        amount,
        kind,
        from_account,
        to_account,
        exchange_rate,
        is_deleted,
        deleted_at,
        updated_at,
    })
}

fn kind_column(row: &Row, index: usize) -> Result<TransactionKind, rusqlite::Error> {
    let text: String = row.get(index)?;

    match text.as_str() {
        "income" => Ok(TransactionKind::Income),
        "expense" => Ok(TransactionKind::Expense),
        "transfer" => Ok(TransactionKind::Transfer),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            format!("unknown transaction kind {other:?}").into(),
        )),
    }
}

//! Account management for the ledger.
//!
//! This module contains the `Account` model, the inputs used to create and
//! update accounts, and the database functions for the account table.

use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;

/// Alias for the integer type used for account IDs.
pub type AccountId = i64;

/// A cash bucket that transactions are recorded against.
///
/// `current_balance` is derived state: it must always equal
/// `initial_balance` plus the sum of the amounts of the account's non-deleted
/// transactions. The ledger store recomputes it after every mutation, it is
/// never trusted from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// The ID of the account, unique per user.
    pub id: AccountId,
    /// The display name of the account.
    pub name: String,
    /// The balance the account was opened with.
    pub initial_balance: Decimal,
    /// The derived balance, see the struct docs.
    pub current_balance: Decimal,
    /// Whether the account is denominated in the foreign currency.
    pub is_foreign_currency: bool,
    /// The account's transaction history, including soft-deleted entries.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// The data needed to create an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    /// An explicit ID for the account. Clients that create accounts offline
    /// pick their own IDs; `None` lets the store assign a fresh one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AccountId>,
    /// The display name of the account.
    pub name: String,
    /// The opening balance.
    pub initial_balance: Decimal,
    /// Whether the account is denominated in the foreign currency.
    pub is_foreign_currency: bool,
}

impl NewAccount {
    /// Shortcut for a new local-currency account without an explicit ID.
    pub fn new(name: &str, initial_balance: Decimal) -> Self {
        Self {
            id: None,
            name: name.to_owned(),
            initial_balance,
            is_foreign_currency: false,
        }
    }

    /// Set an explicit account ID.
    pub fn id(mut self, id: AccountId) -> Self {
        self.id = Some(id);
        self
    }

    /// Mark the account as denominated in the foreign currency.
    pub fn foreign_currency(mut self) -> Self {
        self.is_foreign_currency = true;
        self
    }
}

/// A partial update to an account's metadata.
///
/// Fields left as `None` keep their stored value. Changing
/// `initial_balance` triggers a balance recomputation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountUpdate {
    /// Rename the account.
    pub name: Option<String>,
    /// Restate the opening balance.
    pub initial_balance: Option<Decimal>,
    /// Change the account's currency.
    pub is_foreign_currency: Option<bool>,
}

/// Create the account table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS account (
                user_id TEXT NOT NULL,
                id INTEGER NOT NULL,
                name TEXT NOT NULL,
                initial_balance TEXT NOT NULL,
                current_balance TEXT NOT NULL,
                is_foreign_currency INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, id)
                )",
        (),
    )?;

    Ok(())
}

/// Map a database row to an [Account] with an empty transaction list.
///
/// Expects the columns `id, name, initial_balance, current_balance,
/// is_foreign_currency` in that order. The caller is responsible for
/// attaching the transaction history.
pub fn map_row_to_account(row: &Row) -> Result<Account, rusqlite::Error> {
    let id = row.get(0)?;
    let name = row.get(1)?;
    let initial_balance = decimal_column(row, 2)?;
    let current_balance = decimal_column(row, 3)?;
    let is_foreign_currency = row.get(4)?;

    Ok(Account {
        id,
        name,
        initial_balance,
        current_balance,
        is_foreign_currency,
        transactions: Vec::new(),
    })
}

/// Read a TEXT column holding a decimal value.
pub(crate) fn decimal_column(row: &Row, index: usize) -> Result<Decimal, rusqlite::Error> {
    let text: String = row.get(index)?;

    text.parse().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(error),
        )
    })
}

/// Read a nullable TEXT column holding a decimal value.
pub(crate) fn optional_decimal_column(
    row: &Row,
    index: usize,
) -> Result<Option<Decimal>, rusqlite::Error> {
    let text: Option<String> = row.get(index)?;

    match text {
        None => Ok(None),
        Some(text) => text.parse().map(Some).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        }),
    }
}

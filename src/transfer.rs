//! The transfer calculator.
//!
//! Pure functions that turn a requested transfer amount plus an optional
//! exchange rate into the matched pair of ledger entries: a debit on the
//! source account and a credit on the destination account, sharing one
//! logical transaction ID.

use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::{
    Error,
    account::Account,
    transaction::{Transaction, TransactionId, TransactionKind},
};

/// The currency-conversion terms of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferTerms {
    /// The requested amount, in the source account's currency. The sign is
    /// ignored.
    pub source_amount: Decimal,
    /// Whether the source account is denominated in the foreign currency.
    pub from_is_foreign: bool,
    /// Whether the destination account is denominated in the foreign currency.
    pub to_is_foreign: bool,
    /// The exchange rate. Required when either side is foreign-currency,
    /// ignored otherwise.
    pub exchange_rate: Option<Decimal>,
}

impl TransferTerms {
    /// Whether the transfer crosses a currency boundary.
    pub fn is_cross_currency(&self) -> bool {
        self.from_is_foreign || self.to_is_foreign
    }
}

/// Compute the amount credited to the destination account.
///
/// If neither side is foreign-currency the amount passes through unchanged.
/// Otherwise a positive exchange rate is required: the amount is multiplied
/// by the rate when the source account is the foreign one, and divided by it
/// when the destination is.
///
/// # Errors
/// Returns [Error::InvalidExchangeRate] if the transfer is cross-currency
/// and the rate is missing or not positive.
pub fn transfer_in_amount(terms: &TransferTerms) -> Result<Decimal, Error> {
    let source_amount = terms.source_amount.abs();

    if !terms.is_cross_currency() {
        return Ok(source_amount);
    }

    match terms.exchange_rate {
        Some(rate) if rate > Decimal::ZERO => {
            if terms.from_is_foreign {
                Ok(source_amount * rate)
            } else {
                Ok(source_amount / rate)
            }
        }
        _ => Err(Error::InvalidExchangeRate),
    }
}

/// Build the matched pair of entries for a transfer between two accounts.
///
/// Returns `(outgoing, incoming)`: a negative entry on the source account
/// described as "Transfer to {destination}", and a positive entry on the
/// destination account described as "Transfer from {source}". Both share the
/// logical `id`, and the exchange rate is stored only when a side is
/// foreign-currency.
///
/// No validation of balances happens here; this function fails only on
/// invalid conversion terms, before the caller mutates anything.
///
/// # Errors
/// Returns [Error::InvalidExchangeRate] as described for
/// [transfer_in_amount].
pub fn build_transfer_pair(
    id: TransactionId,
    date: OffsetDateTime,
    from: &Account,
    to: &Account,
    source_amount: Decimal,
    exchange_rate: Option<Decimal>,
) -> Result<(Transaction, Transaction), Error> {
    let terms = TransferTerms {
        source_amount,
        from_is_foreign: from.is_foreign_currency,
        to_is_foreign: to.is_foreign_currency,
        exchange_rate,
    };
    let incoming_amount = transfer_in_amount(&terms)?;
    let stored_rate = if terms.is_cross_currency() {
        exchange_rate
    } else {
        None
    };

    let outgoing = Transaction {
        id,
        date,
        description: format!("Transfer to {}", to.name),
        amount: -source_amount.abs(),
        kind: TransactionKind::Transfer,
        from_account: from.id,
        to_account: Some(to.id),
        exchange_rate: stored_rate,
        is_deleted: false,
        deleted_at: None,
        updated_at: None,
    };

    let incoming = Transaction {
        id,
        date,
        description: format!("Transfer from {}", from.name),
        amount: incoming_amount,
        kind: TransactionKind::Transfer,
        from_account: from.id,
        to_account: Some(to.id),
        exchange_rate: stored_rate,
        is_deleted: false,
        deleted_at: None,
        updated_at: None,
    };

    Ok((outgoing, incoming))
}

/// Whether a transaction is the outgoing (source-side) entry of a transfer.
pub fn is_transfer_out(transaction: &Transaction) -> bool {
    transaction.kind == TransactionKind::Transfer && transaction.amount < Decimal::ZERO
}

#[cfg(test)]
mod transfer_in_amount_tests {
    use rust_decimal::Decimal;

    use super::{TransferTerms, transfer_in_amount};
    use crate::Error;

    fn terms(
        source_amount: i64,
        from_is_foreign: bool,
        to_is_foreign: bool,
        exchange_rate: Option<Decimal>,
    ) -> TransferTerms {
        TransferTerms {
            source_amount: Decimal::from(source_amount),
            from_is_foreign,
            to_is_foreign,
            exchange_rate,
        }
    }

    #[test]
    fn same_currency_passes_amount_through() {
        let got = transfer_in_amount(&terms(100, false, false, None)).unwrap();

        assert_eq!(got, Decimal::from(100));
    }

    #[test]
    fn same_currency_ignores_a_supplied_rate() {
        let got = transfer_in_amount(&terms(100, false, false, Some(Decimal::from(350)))).unwrap();

        assert_eq!(got, Decimal::from(100));
    }

    #[test]
    fn negative_source_amount_is_treated_as_magnitude() {
        let got = transfer_in_amount(&terms(-100, false, false, None)).unwrap();

        assert_eq!(got, Decimal::from(100));
    }

    #[test]
    fn foreign_source_multiplies_by_rate() {
        let got = transfer_in_amount(&terms(100, true, false, Some(Decimal::from(350)))).unwrap();

        assert_eq!(got, Decimal::from(35_000));
    }

    #[test]
    fn foreign_destination_divides_by_rate() {
        let got = transfer_in_amount(&terms(35_000, false, true, Some(Decimal::from(350)))).unwrap();

        assert_eq!(got, Decimal::from(100));
    }

    #[test]
    fn missing_rate_is_rejected_for_cross_currency() {
        let got = transfer_in_amount(&terms(100, false, true, None));

        assert_eq!(got, Err(Error::InvalidExchangeRate));
    }

    #[test]
    fn non_positive_rate_is_rejected_for_cross_currency() {
        assert_eq!(
            transfer_in_amount(&terms(100, true, false, Some(Decimal::ZERO))),
            Err(Error::InvalidExchangeRate)
        );
        assert_eq!(
            transfer_in_amount(&terms(100, true, false, Some(Decimal::from(-2)))),
            Err(Error::InvalidExchangeRate)
        );
    }
}

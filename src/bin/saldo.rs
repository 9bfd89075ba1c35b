//! The saldo command line interface.
//!
//! Wires the ledger engine together end to end: the authoritative store in
//! a SQLite file, the client's cache and sync queue in a data directory,
//! and an in-process remote between them. With `--offline`, mutations queue
//! up durably and `saldo sync` applies them later.

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use rusqlite::Connection;
use rust_decimal::Decimal;

use saldo::{
    Error, FileStore, InProcessRemote, LedgerClient, LedgerStore, RemoteLedger, TransactionKind,
};

/// An offline-first personal ledger.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory holding the ledger database and the client's local state.
    #[arg(long, default_value = ".saldo")]
    data_dir: PathBuf,

    /// The user the ledger belongs to.
    #[arg(long, default_value = "local")]
    user: String,

    /// Work offline: mutations queue up until the next `sync`.
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List accounts and their balances.
    Accounts,
    /// Create an account.
    CreateAccount {
        /// The display name of the account.
        name: String,
        /// The opening balance.
        #[arg(default_value = "0")]
        initial_balance: Decimal,
        /// Denominate the account in the foreign currency.
        #[arg(long)]
        foreign: bool,
    },
    /// Delete an account and its entire history.
    DeleteAccount {
        /// The ID of the account to delete.
        account_id: i64,
    },
    /// Record money coming into an account.
    Income {
        /// The ID of the receiving account.
        account_id: i64,
        /// The amount received.
        amount: Decimal,
        /// What the income was for.
        #[arg(long)]
        description: Option<String>,
    },
    /// Record money leaving an account.
    Expense {
        /// The ID of the paying account.
        account_id: i64,
        /// The amount spent.
        amount: Decimal,
        /// What the expense was for.
        #[arg(long)]
        description: Option<String>,
    },
    /// Move money between two accounts.
    Transfer {
        /// The ID of the source account.
        from: i64,
        /// The ID of the destination account.
        to: i64,
        /// The amount to move, in the source account's currency.
        amount: Decimal,
        /// The exchange rate, required when either side is foreign-currency.
        #[arg(long)]
        rate: Option<Decimal>,
    },
    /// Show an account's transaction history.
    History {
        /// The ID of the account.
        account_id: i64,
    },
    /// Apply any queued offline work to the ledger.
    Sync,
}

#[tokio::main]
async fn main() {
    setup_logging();

    let args = Args::parse();

    if let Err(error) = run(args).await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let store = Arc::new(FileStore::new(&args.data_dir)?);
    let connection = Connection::open(args.data_dir.join("saldo.sqlite3"))?;
    let ledger = LedgerStore::new(connection)?;
    let remote = InProcessRemote::new(ledger, args.user.clone());

    let initial_accounts = if args.offline {
        Vec::new()
    } else {
        remote.fetch_accounts().await?
    };

    let mut client = LedgerClient::new(remote, store, initial_accounts);
    client.set_online(!args.offline).await?;

    // Work queued by an earlier offline session drains as soon as a
    // connected invocation starts.
    if client.is_online() && client.pending_sync_count() > 0 {
        client.sync_now().await?;
    }

    match args.command {
        Command::Accounts => {
            for account in client.accounts() {
                println!(
                    "{:>16}  {:<20} {:>14} {}",
                    account.id,
                    account.name,
                    account.current_balance,
                    currency_code(account.is_foreign_currency),
                );
            }
        }
        Command::CreateAccount {
            name,
            initial_balance,
            foreign,
        } => {
            let id = client.create_account(&name, initial_balance, foreign).await?;
            println!("Created account '{name}' ({id})");
        }
        Command::DeleteAccount { account_id } => {
            client.delete_account(account_id).await?;
            println!("Deleted account {account_id}");
        }
        Command::Income {
            account_id,
            amount,
            description,
        } => {
            client
                .add_transaction(
                    account_id,
                    amount,
                    TransactionKind::Income,
                    description.as_deref(),
                )
                .await?;
            println!("Recorded income of {amount}");
        }
        Command::Expense {
            account_id,
            amount,
            description,
        } => {
            client
                .add_transaction(
                    account_id,
                    amount,
                    TransactionKind::Expense,
                    description.as_deref(),
                )
                .await?;
            println!("Recorded expense of {amount}");
        }
        Command::Transfer {
            from,
            to,
            amount,
            rate,
        } => {
            client.add_transfer(from, to, amount, rate).await?;
            println!("Transferred {amount} from {from} to {to}");
        }
        Command::History { account_id } => {
            let account = client
                .accounts()
                .iter()
                .find(|account| account.id == account_id)
                .ok_or(Error::AccountNotFound)?;

            for transaction in &account.transactions {
                let marker = if transaction.is_deleted { " (deleted)" } else { "" };
                println!(
                    "{}  {:<28} {:>14}{marker}",
                    transaction.date.date(),
                    transaction.description,
                    transaction.amount,
                );
            }
        }
        Command::Sync => {
            client.sync_now().await?;
            println!("Sync complete");
        }
    }

    if client.pending_sync_count() > 0 {
        println!(
            "{} operation(s) queued, run `saldo sync` when back online",
            client.pending_sync_count()
        );
    }

    Ok(())
}

fn currency_code(is_foreign_currency: bool) -> &'static str {
    if is_foreign_currency { "USD" } else { "ARS" }
}

fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("saldo=warn")),
        )
        .init();
}

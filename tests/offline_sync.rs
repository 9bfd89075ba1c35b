//! End-to-end offline capture, restart, and reconciliation.

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use rusqlite::Connection;
use rust_decimal::Decimal;

use saldo::{
    Account, AccountId, FileStore, InProcessRemote, LedgerClient, LedgerStore, RemoteError,
    RemoteLedger, TransactionId, TransactionKind, TransactionPayload, TransactionUpdate,
};

const USER: &str = "auth0|user-1";

fn dec(text: &str) -> Decimal {
    text.parse().unwrap()
}

fn open_server(path: &std::path::Path) -> LedgerStore {
    LedgerStore::new(Connection::open(path.join("ledger.sqlite3")).unwrap()).unwrap()
}

/// Forwards to an [InProcessRemote], failing with a network error after a
/// set number of successful mutations.
struct DroppingRemote {
    inner: InProcessRemote,
    successes_left: AtomicU32,
}

impl DroppingRemote {
    fn new(inner: InProcessRemote, successes: u32) -> Self {
        Self {
            inner,
            successes_left: AtomicU32::new(successes),
        }
    }

    fn check(&self) -> Result<(), RemoteError> {
        let left = self.successes_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(RemoteError::Network("connection dropped".to_owned()));
        }
        self.successes_left.store(left - 1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl RemoteLedger for DroppingRemote {
    async fn fetch_accounts(&self) -> Result<Vec<Account>, RemoteError> {
        self.inner.fetch_accounts().await
    }

    async fn create_account(&self, account: &Account) -> Result<(), RemoteError> {
        self.check()?;
        self.inner.create_account(account).await
    }

    async fn delete_account(&self, account_id: AccountId) -> Result<(), RemoteError> {
        self.check()?;
        self.inner.delete_account(account_id).await
    }

    async fn post_transaction(
        &self,
        account_id: AccountId,
        payload: &TransactionPayload,
    ) -> Result<(), RemoteError> {
        self.check()?;
        self.inner.post_transaction(account_id, payload).await
    }

    async fn update_transaction(
        &self,
        account_id: AccountId,
        transaction_id: TransactionId,
        updates: &TransactionUpdate,
    ) -> Result<(), RemoteError> {
        self.check()?;
        self.inner
            .update_transaction(account_id, transaction_id, updates)
            .await
    }

    async fn soft_delete_transaction(
        &self,
        account_id: AccountId,
        transaction_id: TransactionId,
    ) -> Result<(), RemoteError> {
        self.check()?;
        self.inner
            .soft_delete_transaction(account_id, transaction_id)
            .await
    }
}

#[tokio::test]
async fn offline_session_survives_restart_and_syncs() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("client");

    // First session: capture work while offline, then exit without syncing.
    {
        let server = open_server(dir.path());
        let store = Arc::new(FileStore::new(&data_dir).unwrap());
        let remote = InProcessRemote::new(server, USER);
        let mut client = LedgerClient::new(remote, store, Vec::new());
        client.set_online(false).await.unwrap();

        let cash = client.create_account("Cash", dec("1000"), false).await.unwrap();
        let dollars = client.create_account("Dollars", dec("0"), true).await.unwrap();
        client
            .add_transaction(cash, dec("300"), TransactionKind::Expense, Some("groceries"))
            .await
            .unwrap();
        client
            .add_transfer(cash, dollars, dec("50"), None)
            .await
            .expect_err("cross-currency transfer without a rate should be rejected locally");
        client
            .add_transfer(cash, dollars, dec("350"), Some(dec("350")))
            .await
            .unwrap();

        assert_eq!(client.pending_sync_count(), 4);
    }

    // Second session: the queue and cache were reloaded from disk, the
    // server still knows nothing.
    let server = open_server(dir.path());
    assert!(server.get_accounts(USER).unwrap().is_empty());

    let store = Arc::new(FileStore::new(&data_dir).unwrap());
    let remote = InProcessRemote::new(server.clone(), USER);
    let mut client = LedgerClient::new(remote, store, Vec::new());

    assert_eq!(client.pending_sync_count(), 4);
    assert_eq!(client.accounts().len(), 2, "cache should restore accounts");

    client.sync_now().await.unwrap();

    assert_eq!(client.pending_sync_count(), 0);
    let accounts = server.get_accounts(USER).unwrap();
    assert_eq!(accounts.len(), 2);

    let cash = accounts.iter().find(|a| a.name == "Cash").unwrap();
    let dollars = accounts.iter().find(|a| a.name == "Dollars").unwrap();

    // 1000 - 300 groceries - 350 transferred out.
    assert_eq!(cash.current_balance, dec("350"));
    // The destination is the foreign account: 350 / 350.
    assert_eq!(dollars.current_balance, dec("1"));

    // Both transfer entries share one logical ID with opposite signs.
    let outgoing = cash
        .transactions
        .iter()
        .find(|t| t.kind == TransactionKind::Transfer)
        .unwrap();
    let incoming = dollars
        .transactions
        .iter()
        .find(|t| t.kind == TransactionKind::Transfer)
        .unwrap();
    assert_eq!(outgoing.id, incoming.id);
    assert_eq!(outgoing.amount, dec("-350"));
    assert_eq!(incoming.amount, dec("1"));

    // The client converged on the authoritative snapshot.
    assert_eq!(client.accounts(), &accounts[..]);

    // Every account satisfies the balance invariant.
    for account in &accounts {
        let active: Decimal = account
            .transactions
            .iter()
            .filter(|t| !t.is_deleted)
            .map(|t| t.amount)
            .sum();
        assert_eq!(account.current_balance, account.initial_balance + active);
    }
}

#[tokio::test]
async fn interrupted_drain_replays_to_the_same_final_state() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("client");
    let server = open_server(dir.path());

    // Queue three operations offline.
    {
        let store = Arc::new(FileStore::new(&data_dir).unwrap());
        let remote = InProcessRemote::new(server.clone(), USER);
        let mut client = LedgerClient::new(remote, store, Vec::new());
        client.set_online(false).await.unwrap();

        let cash = client.create_account("Cash", dec("100"), false).await.unwrap();
        client
            .add_transaction(cash, dec("40"), TransactionKind::Income, None)
            .await
            .unwrap();
        client
            .add_transaction(cash, dec("90"), TransactionKind::Expense, None)
            .await
            .unwrap();
    }

    // The connection drops after the first operation applies: the creation
    // reached the server, the two transactions are still queued.
    {
        let store = Arc::new(FileStore::new(&data_dir).unwrap());
        let remote = DroppingRemote::new(InProcessRemote::new(server.clone(), USER), 1);
        let mut client = LedgerClient::new(remote, store, Vec::new());
        client.sync_now().await.unwrap();

        assert_eq!(client.pending_sync_count(), 2);
        assert_eq!(server.get_accounts(USER).unwrap().len(), 1);
    }

    // A later session reloads the persisted remainder and finishes the
    // drain; the result matches what an uninterrupted drain produces.
    let store = Arc::new(FileStore::new(&data_dir).unwrap());
    let remote = InProcessRemote::new(server.clone(), USER);
    let mut client = LedgerClient::new(remote, store, Vec::new());
    client.sync_now().await.unwrap();

    assert_eq!(client.pending_sync_count(), 0);
    let accounts = server.get_accounts(USER).unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].current_balance, dec("50"));
    assert_eq!(accounts[0].transactions.len(), 2);
}

//! The offline-first client coordinator.
//!
//! [LedgerClient] is the component user actions go through. Every mutation
//! happens in two clearly separated layers:
//!
//! 1. **Apply locally, synchronously**: the in-memory account list and the
//!    persisted cache are updated and the operation is durably enqueued
//!    before anything awaits.
//! 2. **Confirm remotely, asynchronously**: the sync queue drains against
//!    the remote ledger when connectivity allows, and the authoritative
//!    state is silently re-fetched and merged back after progress.
//!
//! The client also owns the connectivity glue: a drain is attempted when
//! the queue gains work, when the client transitions from offline to
//! online, and on an explicit sync request.

use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::{
    Error,
    account::{Account, AccountId},
    cache::{AccountCache, LocalStore, merge_accounts_by_id},
    remote::RemoteLedger,
    sync::{SyncOperation, SyncQueue},
    transaction::{
        Transaction, TransactionId, TransactionKind, TransactionPayload, TransactionUpdate,
    },
    transfer::build_transfer_pair,
};

/// The client-side coordinator for one user's ledger.
#[derive(Debug)]
pub struct LedgerClient<R, S> {
    accounts: Vec<Account>,
    cache: AccountCache<S>,
    queue: SyncQueue<S>,
    remote: R,
    online: bool,
    last_sync_at: Option<OffsetDateTime>,
}

impl<R: RemoteLedger, S: LocalStore> LedgerClient<R, S> {
    /// Create a client from a server-provided initial account list.
    ///
    /// The cached snapshot from a previous session is merged in (the
    /// passed-in list wins on shared IDs, cache-only accounts survive) and
    /// any persisted sync queue is reloaded. The client starts online; call
    /// [LedgerClient::set_online] to reflect real connectivity.
    pub fn new(remote: R, store: Arc<S>, initial_accounts: Vec<Account>) -> Self {
        let cache = AccountCache::new(store.clone());
        let cached = cache.load();
        let accounts = if cached.is_empty() {
            initial_accounts
        } else {
            merge_accounts_by_id(&initial_accounts, &cached)
        };

        Self {
            accounts,
            cache,
            queue: SyncQueue::load(store),
            remote,
            online: true,
            last_sync_at: None,
        }
    }

    /// The current (optimistic) account list.
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// The number of mutations not yet confirmed by the server.
    pub fn pending_sync_count(&self) -> usize {
        self.queue.len()
    }

    /// Whether the client believes it is online.
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// When authoritative state was last fetched, if ever.
    pub fn last_sync_at(&self) -> Option<OffsetDateTime> {
        self.last_sync_at
    }

    /// Record a connectivity transition. Coming back online triggers a
    /// drain of any queued work.
    ///
    /// # Errors
    /// Returns an error if the queue cannot be re-persisted during the
    /// drain.
    pub async fn set_online(&mut self, online: bool) -> Result<(), Error> {
        let was_online = self.online;
        self.online = online;

        if online && !was_online {
            self.drain().await?;
        }

        Ok(())
    }

    /// Explicitly drain the sync queue now.
    ///
    /// A no-op when offline or when a drain is already in flight.
    ///
    /// # Errors
    /// Returns an error if the queue cannot be re-persisted during the
    /// drain.
    pub async fn sync_now(&mut self) -> Result<(), Error> {
        self.drain().await
    }

    /// Create an account locally and queue it for the server.
    ///
    /// Returns the client-assigned account ID immediately; confirmation
    /// happens in the background drain.
    ///
    /// # Errors
    /// Returns an error if the local state cannot be persisted.
    pub async fn create_account(
        &mut self,
        name: &str,
        initial_balance: Decimal,
        is_foreign_currency: bool,
    ) -> Result<AccountId, Error> {
        let account = Account {
            id: generate_account_id(),
            name: name.to_owned(),
            initial_balance,
            current_balance: initial_balance,
            is_foreign_currency,
            transactions: Vec::new(),
        };
        let id = account.id;

        self.accounts.push(account.clone());
        self.accounts.sort_by_key(|account| account.id);
        self.cache.save(&self.accounts)?;
        self.queue.enqueue(SyncOperation::CreateAccount { account })?;

        self.drain().await?;
        Ok(id)
    }

    /// Remove an account locally and queue the deletion for the server.
    ///
    /// # Errors
    /// Returns [Error::AccountNotFound] if the account is not in local
    /// state, or an error if the local state cannot be persisted.
    pub async fn delete_account(&mut self, account_id: AccountId) -> Result<(), Error> {
        if !self.accounts.iter().any(|account| account.id == account_id) {
            return Err(Error::AccountNotFound);
        }

        self.accounts.retain(|account| account.id != account_id);
        self.cache.save(&self.accounts)?;
        self.queue
            .enqueue(SyncOperation::DeleteAccount { account_id })?;

        self.drain().await
    }

    /// Record an income or expense locally and queue it for the server.
    ///
    /// The amount is canonicalized by kind; the optimistic balance moves
    /// immediately and the server re-derives it on confirmation.
    ///
    /// # Errors
    /// Returns [Error::AccountNotFound] if the account is not in local
    /// state, [Error::UnpairedTransfer] for the transfer kind (use
    /// [LedgerClient::add_transfer]), [Error::InvalidAmount] for a zero
    /// amount, or an error if the local state cannot be persisted.
    pub async fn add_transaction(
        &mut self,
        account_id: AccountId,
        amount: Decimal,
        kind: TransactionKind,
        description: Option<&str>,
    ) -> Result<TransactionId, Error> {
        if kind == TransactionKind::Transfer {
            return Err(Error::UnpairedTransfer);
        }
        if amount.is_zero() {
            return Err(Error::InvalidAmount);
        }

        let mut builder = Transaction::build(amount, kind, account_id);
        if let Some(description) = description {
            builder = builder.description(description);
        }
        let transaction = builder.finalize(generate_transaction_id());
        let id = transaction.id;

        let account = self
            .accounts
            .iter_mut()
            .find(|account| account.id == account_id)
            .ok_or(Error::AccountNotFound)?;
        account.current_balance += transaction.amount;
        account.transactions.push(transaction.clone());

        self.cache.save(&self.accounts)?;
        self.queue.enqueue(SyncOperation::AddTransaction {
            account_id,
            payload: TransactionPayload {
                transaction,
                to_account_id: None,
                exchange_rate: None,
            },
        })?;

        self.drain().await?;
        Ok(id)
    }

    /// Record a transfer locally and queue it for the server.
    ///
    /// Builds the matched entry pair up front, so an invalid exchange rate
    /// is rejected before any local state moves.
    ///
    /// # Errors
    /// Returns [Error::AccountNotFound] if either account is missing
    /// locally, [Error::SameAccountTransfer], [Error::InvalidAmount], or
    /// [Error::InvalidExchangeRate] for invalid terms, or an error if the
    /// local state cannot be persisted.
    pub async fn add_transfer(
        &mut self,
        from_id: AccountId,
        to_id: AccountId,
        amount: Decimal,
        exchange_rate: Option<Decimal>,
    ) -> Result<TransactionId, Error> {
        if from_id == to_id {
            return Err(Error::SameAccountTransfer);
        }
        if amount.is_zero() {
            return Err(Error::InvalidAmount);
        }

        let from = self
            .accounts
            .iter()
            .find(|account| account.id == from_id)
            .ok_or(Error::AccountNotFound)?;
        let to = self
            .accounts
            .iter()
            .find(|account| account.id == to_id)
            .ok_or(Error::AccountNotFound)?;

        let (outgoing, incoming) = build_transfer_pair(
            generate_transaction_id(),
            OffsetDateTime::now_utc(),
            from,
            to,
            amount,
            exchange_rate,
        )?;
        let id = outgoing.id;
        let stored_rate = outgoing.exchange_rate;

        for account in &mut self.accounts {
            if account.id == from_id {
                account.current_balance += outgoing.amount;
                account.transactions.push(outgoing.clone());
            } else if account.id == to_id {
                account.current_balance += incoming.amount;
                account.transactions.push(incoming.clone());
            }
        }

        self.cache.save(&self.accounts)?;
        self.queue.enqueue(SyncOperation::AddTransaction {
            account_id: from_id,
            payload: TransactionPayload {
                transaction: outgoing,
                to_account_id: Some(to_id),
                exchange_rate: stored_rate,
            },
        })?;

        self.drain().await?;
        Ok(id)
    }

    /// Edit a transaction on the server, then refresh local state.
    ///
    /// Unlike the queued mutations this is an online operation; editing
    /// history is not a queue kind.
    ///
    /// # Errors
    /// Returns [Error::Remote] with the server's rejection, or an error if
    /// the refreshed state cannot be persisted.
    pub async fn update_transaction(
        &mut self,
        account_id: AccountId,
        transaction_id: TransactionId,
        updates: &TransactionUpdate,
    ) -> Result<(), Error> {
        self.remote
            .update_transaction(account_id, transaction_id, updates)
            .await?;

        self.refresh().await
    }

    /// Soft-delete a transaction (and its transfer pair) on the server,
    /// then refresh local state.
    ///
    /// # Errors
    /// Returns [Error::Remote] with the server's rejection, or an error if
    /// the refreshed state cannot be persisted.
    pub async fn soft_delete_transaction(
        &mut self,
        account_id: AccountId,
        transaction_id: TransactionId,
    ) -> Result<(), Error> {
        self.remote
            .soft_delete_transaction(account_id, transaction_id)
            .await?;

        self.refresh().await
    }

    /// Replace local state with the authoritative account list.
    ///
    /// # Errors
    /// Returns [Error::Remote] if the fetch fails (the cached state stays in
    /// place), or an error if the snapshot cannot be persisted.
    pub async fn refresh(&mut self) -> Result<(), Error> {
        let fresh = self.remote.fetch_accounts().await?;

        self.accounts = fresh;
        self.cache.save(&self.accounts)?;
        self.last_sync_at = Some(OffsetDateTime::now_utc());

        Ok(())
    }

    /// Drain the queue if online, then silently reconcile with the server
    /// when anything was removed from it.
    async fn drain(&mut self) -> Result<(), Error> {
        if !self.online || self.queue.is_empty() {
            return Ok(());
        }

        let outcome = self.queue.drain(&self.remote).await?;

        if outcome.removed_any() {
            match self.refresh().await {
                Ok(()) => {}
                Err(Error::Remote(error)) if error.is_transient() => {
                    tracing::debug!("post-drain refresh failed, keeping local state: {error}");
                }
                Err(error) => return Err(error),
            }
        }

        Ok(())
    }
}

static LAST_ACCOUNT_ID: AtomicI64 = AtomicI64::new(0);
static LAST_TRANSACTION_ID: AtomicI64 = AtomicI64::new(0);

/// Client-assigned account IDs: the wall-clock millisecond scaled up with a
/// sub-millisecond disambiguator, floored to stay strictly increasing
/// within the process.
fn generate_account_id() -> AccountId {
    let now = OffsetDateTime::now_utc();
    let millis = (now.unix_timestamp_nanos() / 1_000_000) as i64;
    let candidate = millis * 1_000 + (now.nanosecond() % 1_000) as i64;

    next_monotonic(&LAST_ACCOUNT_ID, candidate)
}

/// Client-assigned logical transaction IDs: the wall-clock millisecond,
/// floored to stay strictly increasing within the process so two quick
/// mutations never share an ID.
fn generate_transaction_id() -> TransactionId {
    let millis = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;

    next_monotonic(&LAST_TRANSACTION_ID, millis)
}

fn next_monotonic(counter: &AtomicI64, candidate: i64) -> i64 {
    loop {
        let last = counter.load(Ordering::SeqCst);
        let id = candidate.max(last + 1);
        if counter
            .compare_exchange(last, id, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return id;
        }
    }
}

#[cfg(test)]
mod client_tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use async_trait::async_trait;
    use rusqlite::Connection;
    use rust_decimal::Decimal;

    use super::LedgerClient;
    use crate::{
        Error,
        account::{Account, AccountId},
        cache::MemoryStore,
        ledger::LedgerStore,
        remote::{InProcessRemote, RemoteError, RemoteLedger},
        transaction::{TransactionId, TransactionKind, TransactionPayload, TransactionUpdate},
    };

    const USER: &str = "auth0|user-1";

    fn dec(text: &str) -> Decimal {
        text.parse().unwrap()
    }

    fn get_test_store() -> LedgerStore {
        LedgerStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    /// Wraps [InProcessRemote] and fails the next N mutating calls with a
    /// network error, like a flaky connection would.
    struct FlakyRemote {
        inner: InProcessRemote,
        failures_left: AtomicU32,
    }

    impl FlakyRemote {
        fn new(inner: InProcessRemote, failures: u32) -> Self {
            Self {
                inner,
                failures_left: AtomicU32::new(failures),
            }
        }

        fn check(&self) -> Result<(), RemoteError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(RemoteError::Network("connection reset".to_owned()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteLedger for FlakyRemote {
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
    async fn offline_mutations_queue_and_apply_in_order_when_back_online() {
        let server = get_test_store();
        let remote = InProcessRemote::new(server.clone(), USER);
        let mut client = LedgerClient::new(remote, Arc::new(MemoryStore::new()), Vec::new());
        client.set_online(false).await.unwrap();

        // Create an account and give it income while offline.
        let account_id = client.create_account("X", dec("0"), false).await.unwrap();
        client
            .add_transaction(account_id, dec("150"), TransactionKind::Income, None)
            .await
            .unwrap();

        assert_eq!(client.pending_sync_count(), 2);
        assert!(server.get_accounts(USER).unwrap().is_empty());

        client.set_online(true).await.unwrap();

        // The creation applied before the transaction that references it.
        let accounts = server.get_accounts(USER).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id, account_id);
        assert_eq!(accounts[0].current_balance, dec("150"));
        assert_eq!(accounts[0].transactions.len(), 1);
        assert_eq!(client.pending_sync_count(), 0);
        assert!(client.last_sync_at().is_some());
    }

    #[tokio::test]
    async fn optimistic_state_is_visible_immediately_while_offline() {
        let server = get_test_store();
        let remote = InProcessRemote::new(server, USER);
        let mut client = LedgerClient::new(remote, Arc::new(MemoryStore::new()), Vec::new());
        client.set_online(false).await.unwrap();

        let account_id = client
            .create_account("Cash", dec("1000"), false)
            .await
            .unwrap();
        client
            .add_transaction(account_id, dec("300"), TransactionKind::Expense, None)
            .await
            .unwrap();

        let account = &client.accounts()[0];
        assert_eq!(account.current_balance, dec("700"));
        assert_eq!(account.transactions.len(), 1);
    }

    #[tokio::test]
    async fn transfer_updates_both_local_balances() {
        let server = get_test_store();
        let remote = InProcessRemote::new(server.clone(), USER);
        let mut client = LedgerClient::new(remote, Arc::new(MemoryStore::new()), Vec::new());
        client.set_online(false).await.unwrap();

        let from = client.create_account("A", dec("500"), false).await.unwrap();
        let to = client.create_account("B", dec("0"), true).await.unwrap();
        let transfer_id = client
            .add_transfer(from, to, dec("100"), Some(dec("350")))
            .await
            .unwrap();

        let accounts = client.accounts();
        let from_account = accounts.iter().find(|a| a.id == from).unwrap();
        let to_account = accounts.iter().find(|a| a.id == to).unwrap();
        assert_eq!(from_account.current_balance, dec("400"));
        assert_eq!(to_account.current_balance, dec("100") / dec("350"));
        assert_eq!(from_account.transactions[0].id, transfer_id);
        assert_eq!(to_account.transactions[0].id, transfer_id);

        // Once online, the server reaches the same balances.
        client.set_online(true).await.unwrap();
        let server_from = server.get_account(USER, from).unwrap();
        assert_eq!(server_from.current_balance, dec("400"));
    }

    #[tokio::test]
    async fn invalid_transfer_terms_leave_local_state_untouched() {
        let server = get_test_store();
        let remote = InProcessRemote::new(server, USER);
        let mut client = LedgerClient::new(remote, Arc::new(MemoryStore::new()), Vec::new());
        client.set_online(false).await.unwrap();

        let from = client.create_account("A", dec("500"), false).await.unwrap();
        let to = client.create_account("B", dec("0"), true).await.unwrap();
        let pending_before = client.pending_sync_count();

        let result = client.add_transfer(from, to, dec("100"), None).await;

        assert_eq!(result, Err(Error::InvalidExchangeRate));
        assert_eq!(client.pending_sync_count(), pending_before);
        let from_account = client.accounts().iter().find(|a| a.id == from).unwrap();
        assert_eq!(from_account.current_balance, dec("500"));
        assert!(from_account.transactions.is_empty());
    }

    #[tokio::test]
    async fn transient_failures_leave_the_queue_intact_for_a_later_sync() {
        let server = get_test_store();
        let remote = FlakyRemote::new(InProcessRemote::new(server.clone(), USER), 1);
        let mut client = LedgerClient::new(remote, Arc::new(MemoryStore::new()), Vec::new());

        // The drain triggered by the mutation hits the network failure.
        client.create_account("Cash", dec("50"), false).await.unwrap();
        assert_eq!(client.pending_sync_count(), 1);
        assert!(server.get_accounts(USER).unwrap().is_empty());

        // Manual sync succeeds once the connection recovers.
        client.sync_now().await.unwrap();
        assert_eq!(client.pending_sync_count(), 0);
        assert_eq!(server.get_accounts(USER).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replaying_a_persisted_queue_reaches_the_same_server_state() {
        let server = get_test_store();
        let store = Arc::new(MemoryStore::new());

        // Session one queues offline work, then "crashes" before syncing.
        let account_id = {
            let remote = InProcessRemote::new(server.clone(), USER);
            let mut client = LedgerClient::new(remote, store.clone(), Vec::new());
            client.set_online(false).await.unwrap();
            let account_id = client.create_account("X", dec("0"), false).await.unwrap();
            client
                .add_transaction(account_id, dec("25"), TransactionKind::Income, None)
                .await
                .unwrap();
            account_id
        };

        // Session two reloads the queue from the shared store and drains it.
        let remote = InProcessRemote::new(server.clone(), USER);
        let mut client = LedgerClient::new(remote, store, Vec::new());
        assert_eq!(client.pending_sync_count(), 2);
        client.sync_now().await.unwrap();

        let accounts = server.get_accounts(USER).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id, account_id);
        assert_eq!(accounts[0].current_balance, dec("25"));
        assert_eq!(client.pending_sync_count(), 0);
    }

    #[tokio::test]
    async fn permanent_rejection_reconciles_to_server_truth() {
        let server = get_test_store();
        // The server already has the account the client will try to create.
        let existing = server
            .create_account(USER, &crate::account::NewAccount::new("Cash", dec("999")).id(42))
            .unwrap();

        let remote = InProcessRemote::new(server.clone(), USER);
        let mut client = LedgerClient::new(remote, Arc::new(MemoryStore::new()), Vec::new());
        client.set_online(false).await.unwrap();

        // Colliding optimistic creation: the drain drops it and the refresh
        // reconciles local state to the server's version.
        client.accounts.push(Account {
            id: 42,
            name: "Cash (local)".to_owned(),
            initial_balance: dec("0"),
            current_balance: dec("0"),
            is_foreign_currency: false,
            transactions: Vec::new(),
        });
        client
            .queue
            .enqueue(crate::sync::SyncOperation::CreateAccount {
                account: client.accounts.last().unwrap().clone(),
            })
            .unwrap();

        client.set_online(true).await.unwrap();

        assert_eq!(client.pending_sync_count(), 0);
        assert_eq!(client.accounts().len(), 1);
        assert_eq!(client.accounts()[0].name, "Cash");
        assert_eq!(client.accounts()[0].current_balance, existing.current_balance);
    }

    #[tokio::test]
    async fn startup_merge_preserves_unconfirmed_offline_accounts() {
        let store = Arc::new(MemoryStore::new());
        let server = get_test_store();

        // A previous offline session cached an account the server has never
        // seen.
        {
            let remote = InProcessRemote::new(server.clone(), USER);
            let mut client = LedgerClient::new(remote, store.clone(), Vec::new());
            client.set_online(false).await.unwrap();
            client.create_account("Offline only", dec("5"), false).await.unwrap();
        }

        // The server knows about a different account.
        let server_account = server
            .create_account(USER, &crate::account::NewAccount::new("Server side", dec("1")))
            .unwrap();

        let remote = InProcessRemote::new(server.clone(), USER);
        let client = LedgerClient::new(remote, store, vec![server_account]);

        assert_eq!(client.accounts().len(), 2);
        let names: Vec<&str> = client
            .accounts()
            .iter()
            .map(|account| account.name.as_str())
            .collect();
        assert!(names.contains(&"Offline only"));
        assert!(names.contains(&"Server side"));
    }

    #[tokio::test]
    async fn soft_delete_round_trips_through_the_server() {
        let server = get_test_store();
        let remote = InProcessRemote::new(server.clone(), USER);
        let mut client = LedgerClient::new(remote, Arc::new(MemoryStore::new()), Vec::new());

        let account_id = client
            .create_account("Cash", dec("500"), false)
            .await
            .unwrap();
        let transaction_id = client
            .add_transaction(account_id, dec("50"), TransactionKind::Expense, None)
            .await
            .unwrap();
        assert_eq!(client.accounts()[0].current_balance, dec("450"));

        client
            .soft_delete_transaction(account_id, transaction_id)
            .await
            .unwrap();

        let account = &client.accounts()[0];
        assert_eq!(account.current_balance, dec("500"));
        assert_eq!(account.transactions.len(), 1);
        assert!(account.transactions[0].is_deleted);
    }
}

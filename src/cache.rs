//! Client-side durable storage and the startup merge rule.
//!
//! The [LocalStore] trait is a `localStorage`-style key/value seam with an
//! in-memory implementation for tests and a file-per-key implementation for
//! real use. [AccountCache]
//! mirrors the last known account state so the client is instantly usable
//! offline, and [merge_accounts_by_id] reconciles that mirror with a fresh
//! server snapshot without losing accounts created while offline.

use std::{
    collections::{BTreeMap, HashMap},
    fs, io,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use crate::{
    Error,
    account::{Account, AccountId},
};

/// The namespace key the account snapshot is cached under.
pub const ACCOUNTS_CACHE_KEY: &str = "saldo.accounts.cache.v1";

/// Durable client-side key/value storage.
///
/// Values are opaque strings; callers serialize to JSON themselves.
pub trait LocalStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    /// Returns [Error::StorageError] if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Durably write `value` under `key`.
    ///
    /// # Errors
    /// Returns [Error::StorageError] if the value cannot be persisted.
    fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    /// Remove the value stored under `key`, if any.
    ///
    /// # Errors
    /// Returns [Error::StorageError] if the store cannot be written.
    fn remove(&self, key: &str) -> Result<(), Error>;
}

/// An in-memory [LocalStore] for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, Error> {
        self.entries
            .lock()
            .map_err(|_| Error::StorageError("local store lock poisoned".to_owned()))
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let entries = self.lock()?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut entries = self.lock()?;
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        let mut entries = self.lock()?;
        entries.remove(key);
        Ok(())
    }
}

/// A [LocalStore] that keeps one file per key in a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    /// Returns [Error::StorageError] if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|error| Error::StorageError(format!("could not create {root:?}: {error}")))?;

        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(Error::StorageError(format!(
                "could not read {key}: {error}"
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        fs::write(self.path_for(key), value)
            .map_err(|error| Error::StorageError(format!("could not write {key}: {error}")))
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(Error::StorageError(format!(
                "could not remove {key}: {error}"
            ))),
        }
    }
}

/// The client's persisted mirror of the last known account state.
#[derive(Debug)]
pub struct AccountCache<S> {
    store: Arc<S>,
}

impl<S: LocalStore> AccountCache<S> {
    /// Create a cache backed by `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Read the cached snapshot.
    ///
    /// A missing or unreadable cache degrades to an empty list; the cache is
    /// an optimisation, not a source of truth.
    pub fn load(&self) -> Vec<Account> {
        let value = match self.store.get(ACCOUNTS_CACHE_KEY) {
            Ok(Some(value)) => value,
            Ok(None) => return Vec::new(),
            Err(error) => {
                tracing::debug!("could not read account cache: {error}");
                return Vec::new();
            }
        };

        match serde_json::from_str(&value) {
            Ok(accounts) => accounts,
            Err(error) => {
                tracing::debug!("discarding corrupt account cache: {error}");
                Vec::new()
            }
        }
    }

    /// Overwrite the cached snapshot.
    ///
    /// # Errors
    /// Returns [Error::JSONSerializationError] or [Error::StorageError] if
    /// the snapshot cannot be persisted.
    pub fn save(&self, accounts: &[Account]) -> Result<(), Error> {
        let json = serde_json::to_string(accounts)?;
        self.store.set(ACCOUNTS_CACHE_KEY, &json)
    }
}

/// Merge two account lists by ID, sorted by ID.
///
/// Entries from `primary` (the fresher source) win over `secondary`, but
/// accounts present only in `secondary` are preserved. This is what keeps an
/// account created offline alive across a reload that races its
/// still-unconfirmed sync.
pub fn merge_accounts_by_id(primary: &[Account], secondary: &[Account]) -> Vec<Account> {
    let mut merged: BTreeMap<AccountId, Account> = BTreeMap::new();

    for account in secondary {
        merged.insert(account.id, account.clone());
    }
    for account in primary {
        merged.insert(account.id, account.clone());
    }

    merged.into_values().collect()
}

#[cfg(test)]
mod merge_tests {
    use rust_decimal::Decimal;

    use super::merge_accounts_by_id;
    use crate::account::Account;

    fn account(id: i64, name: &str) -> Account {
        Account {
            id,
            name: name.to_owned(),
            initial_balance: Decimal::ZERO,
            current_balance: Decimal::ZERO,
            is_foreign_currency: false,
            transactions: Vec::new(),
        }
    }

    #[test]
    fn primary_wins_on_shared_ids() {
        let primary = vec![account(1, "Cash (fresh)")];
        let secondary = vec![account(1, "Cash (stale)")];

        let merged = merge_accounts_by_id(&primary, &secondary);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "Cash (fresh)");
    }

    #[test]
    fn cache_only_accounts_are_preserved() {
        let primary = vec![account(1, "Cash")];
        let secondary = vec![account(2, "Created offline")];

        let merged = merge_accounts_by_id(&primary, &secondary);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].name, "Created offline");
    }

    #[test]
    fn result_is_sorted_by_id() {
        let primary = vec![account(9, "Nine"), account(3, "Three")];
        let secondary = vec![account(7, "Seven")];

        let merged = merge_accounts_by_id(&primary, &secondary);

        let ids: Vec<i64> = merged.iter().map(|account| account.id).collect();
        assert_eq!(ids, vec![3, 7, 9]);
    }

    #[test]
    fn empty_inputs_merge_to_empty() {
        assert!(merge_accounts_by_id(&[], &[]).is_empty());
    }
}

#[cfg(test)]
mod store_tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use super::{AccountCache, FileStore, LocalStore, MemoryStore};
    use crate::account::Account;

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStore::new();

        store.set("key", "value").unwrap();

        assert_eq!(store.get("key").unwrap(), Some("value".to_owned()));
        store.remove("key").unwrap();
        assert_eq!(store.get("key").unwrap(), None);
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.set("saldo.test.v1", "{\"hello\":1}").unwrap();

        assert_eq!(
            store.get("saldo.test.v1").unwrap(),
            Some("{\"hello\":1}".to_owned())
        );
        assert_eq!(store.get("saldo.missing.v1").unwrap(), None);
    }

    #[test]
    fn file_store_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.remove("saldo.missing.v1").unwrap();
    }

    #[test]
    fn cache_survives_a_new_store_handle() {
        let dir = tempfile::tempdir().unwrap();
        let account = Account {
            id: 1,
            name: "Cash".to_owned(),
            initial_balance: Decimal::from(100),
            current_balance: Decimal::from(100),
            is_foreign_currency: false,
            transactions: Vec::new(),
        };

        let cache = AccountCache::new(Arc::new(FileStore::new(dir.path()).unwrap()));
        cache.save(std::slice::from_ref(&account)).unwrap();

        // A fresh handle over the same directory sees the snapshot, like a
        // page reload would.
        let reloaded = AccountCache::new(Arc::new(FileStore::new(dir.path()).unwrap()));
        assert_eq!(reloaded.load(), vec![account]);
    }

    #[test]
    fn corrupt_cache_degrades_to_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(super::ACCOUNTS_CACHE_KEY, "not json").unwrap();

        let cache = AccountCache::new(store);

        assert!(cache.load().is_empty());
    }
}

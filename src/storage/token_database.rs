// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded refresh-token database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `refresh_tokens`: token → serialized RefreshCredential
//! - `refresh_tokens_by_user`: composite key (user_id|token) → ()
//! - `refresh_tokens_by_expiry`: composite key (expires_at_be|token) → ()
//!
//! Every mutation touches all three tables inside one write transaction.
//! "Now" is read inside the transaction for validation and sweeping.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{
    Database, ReadableDatabase, ReadableTable, Table, TableDefinition, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: token value → serialized RefreshCredential (JSON bytes).
const REFRESH_TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("refresh_tokens");

/// Index: `user_id (16 bytes) | token` for logout-everywhere.
const TOKENS_BY_USER: TableDefinition<&[u8], ()> = TableDefinition::new("refresh_tokens_by_user");

/// Index: `expires_at micros (u64 BE) | token` for range sweeps.
const TOKENS_BY_EXPIRY: TableDefinition<&[u8], ()> =
    TableDefinition::new("refresh_tokens_by_expiry");

/// Width of the expiry prefix in `TOKENS_BY_EXPIRY` keys.
const EXPIRY_PREFIX_LEN: usize = 8;

/// Width of the user prefix in `TOKENS_BY_USER` keys.
const USER_PREFIX_LEN: usize = 16;

// =============================================================================
// Record
// =============================================================================

/// One outstanding refresh grant.
///
/// Never updated in place: rotation removes the old record and inserts a
/// new one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshCredential {
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl RefreshCredential {
    pub fn new(user_id: Uuid, token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            token: token.into(),
            expires_at,
        }
    }

    /// A record is logically invalid once `expires_at <= now`, even if the
    /// sweeper has not removed it yet.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TokenDbError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("refresh token already exists")]
    Duplicate,

    #[error("corrupt index entry: {0}")]
    Corrupt(String),

    #[error("storage task failed: {0}")]
    Task(String),

    #[error("storage engine unavailable: {0}")]
    Unavailable(String),
}

pub type TokenDbResult<T> = Result<T, TokenDbError>;

// =============================================================================
// Backend Trait
// =============================================================================

/// Blocking storage engine interface for refresh credentials.
///
/// Implementations are called from `spawn_blocking`; each method is one
/// storage interaction. Not-found is `Ok(None)` / `Ok(false)`, never an error.
pub trait RefreshTokenBackend: Send + Sync {
    /// Insert a new record. Fails with [`TokenDbError::Duplicate`] if the token exists.
    fn insert(&self, credential: &RefreshCredential) -> TokenDbResult<()>;

    /// Look up a record whose token matches and whose expiry is still in the future.
    fn find_active(&self, token: &str) -> TokenDbResult<Option<RefreshCredential>>;

    /// Delete one record. Returns whether anything was removed.
    fn remove(&self, token: &str) -> TokenDbResult<bool>;

    /// Delete every record owned by `user_id`. Returns the number removed.
    fn remove_all_for_user(&self, user_id: Uuid) -> TokenDbResult<usize>;

    /// Delete every record with `expires_at <= now`. Returns the number removed.
    fn remove_expired(&self) -> TokenDbResult<usize>;

    /// Atomically replace an active `old_token` with `replacement`.
    ///
    /// Returns `false` without changing anything when `old_token` is absent,
    /// expired, or owned by a different user than `replacement`.
    fn replace(&self, old_token: &str, replacement: &RefreshCredential) -> TokenDbResult<bool>;

    /// Cheap connectivity check.
    fn ping(&self) -> TokenDbResult<()>;
}

// =============================================================================
// Index Key Helpers
// =============================================================================

fn user_key(user_id: Uuid, token: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(USER_PREFIX_LEN + token.len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(token.as_bytes());
    key
}

/// Upper bound for a user prefix scan. UTF-8 never contains 0xFF.
fn user_prefix_end(user_id: Uuid) -> Vec<u8> {
    let mut end = Vec::with_capacity(USER_PREFIX_LEN + 1);
    end.extend_from_slice(user_id.as_bytes());
    end.push(0xFF);
    end
}

/// Timestamps before the epoch clamp to zero; they sort first and are swept first.
fn expiry_micros(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp_micros()).unwrap_or(0)
}

fn expiry_key(expires_at: DateTime<Utc>, token: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(EXPIRY_PREFIX_LEN + token.len());
    key.extend_from_slice(&expiry_micros(expires_at).to_be_bytes());
    key.extend_from_slice(token.as_bytes());
    key
}

fn token_from_key(key: &[u8], prefix_len: usize) -> TokenDbResult<String> {
    key.get(prefix_len..)
        .and_then(|rest| std::str::from_utf8(rest).ok())
        .map(str::to_owned)
        .ok_or_else(|| TokenDbError::Corrupt(format!("{} byte key", key.len())))
}

// =============================================================================
// Write-side table bundle
// =============================================================================

/// The three tables opened inside one write transaction.
struct TokenTables<'txn> {
    tokens: Table<'txn, &'static str, &'static [u8]>,
    by_user: Table<'txn, &'static [u8], ()>,
    by_expiry: Table<'txn, &'static [u8], ()>,
}

impl<'txn> TokenTables<'txn> {
    fn open(txn: &'txn WriteTransaction) -> TokenDbResult<Self> {
        Ok(Self {
            tokens: txn.open_table(REFRESH_TOKENS)?,
            by_user: txn.open_table(TOKENS_BY_USER)?,
            by_expiry: txn.open_table(TOKENS_BY_EXPIRY)?,
        })
    }

    fn get(&self, token: &str) -> TokenDbResult<Option<RefreshCredential>> {
        match self.tokens.get(token)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn insert(&mut self, credential: &RefreshCredential) -> TokenDbResult<()> {
        if self.tokens.get(credential.token.as_str())?.is_some() {
            return Err(TokenDbError::Duplicate);
        }
        let json = serde_json::to_vec(credential)?;
        self.tokens
            .insert(credential.token.as_str(), json.as_slice())?;
        let by_user = user_key(credential.user_id, &credential.token);
        self.by_user.insert(by_user.as_slice(), ())?;
        let by_expiry = expiry_key(credential.expires_at, &credential.token);
        self.by_expiry.insert(by_expiry.as_slice(), ())?;
        Ok(())
    }

    /// Remove a record and both of its index entries.
    fn remove(&mut self, token: &str) -> TokenDbResult<Option<RefreshCredential>> {
        let removed: Option<RefreshCredential> = match self.tokens.remove(token)? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        if let Some(credential) = &removed {
            let by_user = user_key(credential.user_id, token);
            self.by_user.remove(by_user.as_slice())?;
            let by_expiry = expiry_key(credential.expires_at, token);
            self.by_expiry.remove(by_expiry.as_slice())?;
        }
        Ok(removed)
    }
}

// =============================================================================
// TokenDatabase
// =============================================================================

/// Embedded ACID refresh-token database.
pub struct TokenDatabase {
    db: Database,
}

impl TokenDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> TokenDbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(REFRESH_TOKENS)?;
            let _ = write_txn.open_table(TOKENS_BY_USER)?;
            let _ = write_txn.open_table(TOKENS_BY_EXPIRY)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Whether a record is physically present, expired or not.
    pub fn contains(&self, token: &str) -> TokenDbResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REFRESH_TOKENS)?;
        Ok(table.get(token)?.is_some())
    }
}

impl RefreshTokenBackend for TokenDatabase {
    fn insert(&self, credential: &RefreshCredential) -> TokenDbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut tables = TokenTables::open(&write_txn)?;
            tables.insert(credential)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn find_active(&self, token: &str) -> TokenDbResult<Option<RefreshCredential>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REFRESH_TOKENS)?;
        let Some(value) = table.get(token)? else {
            return Ok(None);
        };
        let credential: RefreshCredential = serde_json::from_slice(value.value())?;
        if credential.is_expired_at(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(credential))
    }

    fn remove(&self, token: &str) -> TokenDbResult<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut tables = TokenTables::open(&write_txn)?;
            tables.remove(token)?.is_some()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn remove_all_for_user(&self, user_id: Uuid) -> TokenDbResult<usize> {
        let start = user_id.as_bytes().to_vec();
        let end = user_prefix_end(user_id);

        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut tables = TokenTables::open(&write_txn)?;
            let tokens = tables
                .by_user
                .range(start.as_slice()..end.as_slice())?
                .map(|entry| {
                    let (key, _) = entry?;
                    token_from_key(key.value(), USER_PREFIX_LEN)
                })
                .collect::<TokenDbResult<Vec<_>>>()?;

            let mut removed = 0;
            for token in &tokens {
                if tables.remove(token)?.is_some() {
                    removed += 1;
                }
            }
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn remove_expired(&self) -> TokenDbResult<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut tables = TokenTables::open(&write_txn)?;
            // Keys at or before `now` sort strictly below the next microsecond.
            let bound = (expiry_micros(Utc::now()) + 1).to_be_bytes();
            let tokens = tables
                .by_expiry
                .range(..bound.as_slice())?
                .map(|entry| {
                    let (key, _) = entry?;
                    token_from_key(key.value(), EXPIRY_PREFIX_LEN)
                })
                .collect::<TokenDbResult<Vec<_>>>()?;

            let mut removed = 0;
            for token in &tokens {
                if tables.remove(token)?.is_some() {
                    removed += 1;
                }
            }
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn replace(&self, old_token: &str, replacement: &RefreshCredential) -> TokenDbResult<bool> {
        let write_txn = self.db.begin_write()?;
        {
            let mut tables = TokenTables::open(&write_txn)?;
            let current = match tables.get(old_token)? {
                Some(current) if !current.is_expired_at(Utc::now()) => current,
                _ => return Ok(false),
            };
            if current.user_id != replacement.user_id {
                return Ok(false);
            }
            tables.remove(old_token)?;
            tables.insert(replacement)?;
        }
        write_txn.commit()?;
        Ok(true)
    }

    fn ping(&self) -> TokenDbResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(REFRESH_TOKENS)?;
        Ok(())
    }
}

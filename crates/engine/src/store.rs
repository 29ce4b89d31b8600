//! The persistence boundary of the ledger.
//!
//! [`LedgerStore`] is the only interface the engine talks to. It offers
//! snapshot reads (each row tagged with a version) and a single atomic
//! commit primitive: either the whole write set plus one transaction record
//! is applied, or nothing is. Concurrency control is optimistic — a commit
//! carries the versions the engine read, and the store reports
//! [`CommitOutcome::Stale`] without side effects when any of them no longer
//! match.
//!
//! Two implementations ship with the crate: [`MemoryStore`] and
//! [`SeaOrmStore`]. The engine is agnostic to which one it runs on.
//!
//! [`MemoryStore`]: memory::MemoryStore
//! [`SeaOrmStore`]: sea_orm::SeaOrmStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Account, Card, Money, ResultEngine, Transaction};

pub mod memory;
pub mod sea_orm;

/// A stored row together with its optimistic-concurrency version.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    pub row: T,
    pub version: i64,
}

/// New balance for one account row, guarded by the version the engine read.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountWrite {
    pub account_id: Uuid,
    pub new_balance: Money,
    pub expected_version: i64,
}

/// New balance for one card row, guarded by the version the engine read.
#[derive(Clone, Debug, PartialEq)]
pub struct CardWrite {
    pub card_id: Uuid,
    pub new_balance: Money,
    pub expected_version: i64,
}

/// The full write set of one operation: every mutated row plus exactly one
/// transaction record, applied atomically.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerCommit {
    pub accounts: Vec<AccountWrite>,
    pub cards: Vec<CardWrite>,
    pub transaction: Transaction,
}

/// Result of a commit attempt. `Stale` means at least one expected version
/// no longer matched and nothing was written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    Stale,
}

/// Keyset cursor for the transaction feed: strictly older than
/// `(created_at, id)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeedCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts a new account. Fails with `ExistingKey` when the normalized
    /// email is already taken.
    async fn insert_account(&self, account: &Account) -> ResultEngine<()>;

    async fn insert_card(&self, card: &Card) -> ResultEngine<()>;

    async fn account(&self, id: Uuid) -> ResultEngine<Option<Versioned<Account>>>;

    /// Looks an account up by **normalized** email.
    async fn account_by_email(&self, email: &str) -> ResultEngine<Option<Versioned<Account>>>;

    async fn card(&self, id: Uuid) -> ResultEngine<Option<Versioned<Card>>>;

    async fn cards_for_account(&self, account_id: Uuid) -> ResultEngine<Vec<Card>>;

    /// Applies `commit` atomically, or not at all.
    ///
    /// Implementations clamp the transaction's `created_at` so the ledger's
    /// timeline is non-decreasing, and must never partially apply the write
    /// set — including when reporting `Stale`.
    async fn commit(&self, commit: LedgerCommit) -> ResultEngine<CommitOutcome>;

    /// Transactions whose source or destination leg is the given account or
    /// one of the given cards, newest first, strictly older than `before`
    /// when present.
    async fn transactions_for(
        &self,
        account_id: Uuid,
        card_ids: &[Uuid],
        limit: u64,
        before: Option<FeedCursor>,
    ) -> ResultEngine<Vec<Transaction>>;
}

//! In-process [`LedgerStore`] backed by `RwLock`-guarded maps.
//!
//! Commit atomicity falls out of the single write lock: the version checks
//! and the row writes happen under one critical section, so a concurrent
//! committer either sees the whole write set or none of it. Used by the
//! engine tests and by ephemeral (in-memory database) deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    Account, Card, EngineError, ResultEngine, Transaction,
    store::{CommitOutcome, FeedCursor, LedgerCommit, LedgerStore, Versioned},
};

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, Versioned<Account>>,
    email_index: HashMap<String, Uuid>,
    cards: HashMap<Uuid, Versioned<Card>>,
    transactions: Vec<Transaction>,
    last_created_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> ResultEngine<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| EngineError::Conflict("store lock poisoned".to_string()))
    }

    fn write(&self) -> ResultEngine<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| EngineError::Conflict("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_account(&self, account: &Account) -> ResultEngine<()> {
        let mut inner = self.write()?;
        if inner.email_index.contains_key(&account.email) {
            return Err(EngineError::ExistingKey(account.email.clone()));
        }
        inner.email_index.insert(account.email.clone(), account.id);
        inner.accounts.insert(
            account.id,
            Versioned {
                row: account.clone(),
                version: 0,
            },
        );
        Ok(())
    }

    async fn insert_card(&self, card: &Card) -> ResultEngine<()> {
        let mut inner = self.write()?;
        if !inner.accounts.contains_key(&card.account_id) {
            return Err(EngineError::KeyNotFound("account not exists".to_string()));
        }
        inner.cards.insert(
            card.id,
            Versioned {
                row: card.clone(),
                version: 0,
            },
        );
        Ok(())
    }

    async fn account(&self, id: Uuid) -> ResultEngine<Option<Versioned<Account>>> {
        Ok(self.read()?.accounts.get(&id).cloned())
    }

    async fn account_by_email(&self, email: &str) -> ResultEngine<Option<Versioned<Account>>> {
        let inner = self.read()?;
        Ok(inner
            .email_index
            .get(email)
            .and_then(|id| inner.accounts.get(id))
            .cloned())
    }

    async fn card(&self, id: Uuid) -> ResultEngine<Option<Versioned<Card>>> {
        Ok(self.read()?.cards.get(&id).cloned())
    }

    async fn cards_for_account(&self, account_id: Uuid) -> ResultEngine<Vec<Card>> {
        let inner = self.read()?;
        let mut cards: Vec<Card> = inner
            .cards
            .values()
            .filter(|card| card.row.account_id == account_id)
            .map(|card| card.row.clone())
            .collect();
        cards.sort_by_key(|card| (card.created_at, card.id));
        Ok(cards)
    }

    async fn commit(&self, commit: LedgerCommit) -> ResultEngine<CommitOutcome> {
        let mut inner = self.write()?;

        // Validate the whole write set before touching anything, so a stale
        // commit leaves no partial state behind.
        for write in &commit.accounts {
            match inner.accounts.get(&write.account_id) {
                Some(current) if current.version == write.expected_version => {}
                Some(_) => return Ok(CommitOutcome::Stale),
                None => {
                    return Err(EngineError::KeyNotFound("account not exists".to_string()));
                }
            }
        }
        for write in &commit.cards {
            match inner.cards.get(&write.card_id) {
                Some(current) if current.version == write.expected_version => {}
                Some(_) => return Ok(CommitOutcome::Stale),
                None => return Err(EngineError::KeyNotFound("card not exists".to_string())),
            }
        }

        for write in &commit.accounts {
            if let Some(current) = inner.accounts.get_mut(&write.account_id) {
                current.row.balance = write.new_balance;
                current.version += 1;
            }
        }
        for write in &commit.cards {
            if let Some(current) = inner.cards.get_mut(&write.card_id) {
                current.row.balance = write.new_balance;
                current.version += 1;
            }
        }

        // Keep the ledger timeline non-decreasing even if the wall clock
        // stepped backwards between operations.
        let mut transaction = commit.transaction;
        if let Some(last) = inner.last_created_at
            && transaction.created_at < last
        {
            transaction.created_at = last;
        }
        inner.last_created_at = Some(transaction.created_at);
        inner.transactions.push(transaction);

        Ok(CommitOutcome::Committed)
    }

    async fn transactions_for(
        &self,
        account_id: Uuid,
        card_ids: &[Uuid],
        limit: u64,
        before: Option<FeedCursor>,
    ) -> ResultEngine<Vec<Transaction>> {
        let inner = self.read()?;
        let mut matching: Vec<Transaction> = inner
            .transactions
            .iter()
            .filter(|tx| tx.touches(account_id, card_ids))
            .filter(|tx| match before {
                Some(cursor) => {
                    (tx.created_at, tx.id) < (cursor.created_at, cursor.id)
                }
                None => true,
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        matching.truncate(limit as usize);
        Ok(matching)
    }
}

//! sea-orm (SQLite) implementation of [`LedgerStore`].
//!
//! The commit primitive runs inside a database transaction. Each balance
//! write is a guarded `UPDATE ... WHERE id = ? AND version = ?`; when any of
//! them affects zero rows the transaction is rolled back and the commit is
//! reported as stale, so concurrent writers serialize through the version
//! columns rather than through locks held across validation.

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Statement,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    Account, Card, EngineError, ResultEngine, Transaction, accounts, cards, transactions,
    store::{CommitOutcome, FeedCursor, LedgerCommit, LedgerStore, Versioned},
};

pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Applies one guarded balance update; `Ok(false)` means the version no
    /// longer matched.
    async fn cas_update(
        db_tx: &DatabaseTransaction,
        table: &str,
        id: Uuid,
        new_balance_minor: i64,
        expected_version: i64,
    ) -> ResultEngine<bool> {
        let backend = db_tx.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            format!(
                "UPDATE {table} SET balance_minor = ?, version = version + 1 \
                 WHERE id = ? AND version = ?"
            ),
            [
                new_balance_minor.into(),
                id.to_string().into(),
                expected_version.into(),
            ],
        );
        let result = db_tx.execute(stmt).await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl LedgerStore for SeaOrmStore {
    async fn insert_account(&self, account: &Account) -> ResultEngine<()> {
        let existing = accounts::Entity::find()
            .filter(accounts::Column::Email.eq(account.email.as_str()))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Err(EngineError::ExistingKey(account.email.clone()));
        }
        accounts::ActiveModel::from(account).insert(&self.db).await?;
        Ok(())
    }

    async fn insert_card(&self, card: &Card) -> ResultEngine<()> {
        cards::ActiveModel::from(card).insert(&self.db).await?;
        Ok(())
    }

    async fn account(&self, id: Uuid) -> ResultEngine<Option<Versioned<Account>>> {
        let model = accounts::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;
        model
            .map(|model| {
                Ok(Versioned {
                    row: Account::try_from(&model)?,
                    version: model.version,
                })
            })
            .transpose()
    }

    async fn account_by_email(&self, email: &str) -> ResultEngine<Option<Versioned<Account>>> {
        let model = accounts::Entity::find()
            .filter(accounts::Column::Email.eq(email))
            .one(&self.db)
            .await?;
        model
            .map(|model| {
                Ok(Versioned {
                    row: Account::try_from(&model)?,
                    version: model.version,
                })
            })
            .transpose()
    }

    async fn card(&self, id: Uuid) -> ResultEngine<Option<Versioned<Card>>> {
        let model = cards::Entity::find_by_id(id.to_string()).one(&self.db).await?;
        model
            .map(|model| {
                Ok(Versioned {
                    row: Card::try_from(&model)?,
                    version: model.version,
                })
            })
            .transpose()
    }

    async fn cards_for_account(&self, account_id: Uuid) -> ResultEngine<Vec<Card>> {
        let models = cards::Entity::find()
            .filter(cards::Column::AccountId.eq(account_id.to_string()))
            .order_by_asc(cards::Column::CreatedAt)
            .order_by_asc(cards::Column::Id)
            .all(&self.db)
            .await?;
        models.iter().map(Card::try_from).collect()
    }

    async fn commit(&self, commit: LedgerCommit) -> ResultEngine<CommitOutcome> {
        let db_tx = self.db.begin().await?;

        for write in &commit.accounts {
            if !Self::cas_update(
                &db_tx,
                "accounts",
                write.account_id,
                write.new_balance.minor(),
                write.expected_version,
            )
            .await?
            {
                db_tx.rollback().await?;
                return Ok(CommitOutcome::Stale);
            }
        }
        for write in &commit.cards {
            if !Self::cas_update(
                &db_tx,
                "cards",
                write.card_id,
                write.new_balance.minor(),
                write.expected_version,
            )
            .await?
            {
                db_tx.rollback().await?;
                return Ok(CommitOutcome::Stale);
            }
        }

        // Non-decreasing ledger timeline: clamp against the newest committed
        // transaction.
        let mut transaction = commit.transaction;
        let newest = transactions::Entity::find()
            .order_by_desc(transactions::Column::CreatedAt)
            .one(&db_tx)
            .await?;
        if let Some(newest) = newest
            && transaction.created_at < newest.created_at
        {
            transaction.created_at = newest.created_at;
        }

        transactions::ActiveModel::from(&transaction)
            .insert(&db_tx)
            .await?;

        db_tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }

    async fn transactions_for(
        &self,
        account_id: Uuid,
        card_ids: &[Uuid],
        limit: u64,
        before: Option<FeedCursor>,
    ) -> ResultEngine<Vec<Transaction>> {
        let mut party_ids: Vec<String> = Vec::with_capacity(card_ids.len() + 1);
        party_ids.push(account_id.to_string());
        party_ids.extend(card_ids.iter().map(Uuid::to_string));

        let mut query = transactions::Entity::find().filter(
            Condition::any()
                .add(transactions::Column::FromId.is_in(party_ids.clone()))
                .add(transactions::Column::ToId.is_in(party_ids)),
        );

        if let Some(cursor) = before {
            query = query.filter(
                Condition::any()
                    .add(transactions::Column::CreatedAt.lt(cursor.created_at))
                    .add(
                        Condition::all()
                            .add(transactions::Column::CreatedAt.eq(cursor.created_at))
                            .add(transactions::Column::Id.lt(cursor.id.to_string())),
                    ),
            );
        }

        let models = query
            .order_by_desc(transactions::Column::CreatedAt)
            .order_by_desc(transactions::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;

        models.iter().map(Transaction::try_from).collect()
    }
}

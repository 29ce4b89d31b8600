use std::sync::Arc;

use chrono::Utc;
use sea_orm::Database;
use uuid::Uuid;

use engine::store::memory::MemoryStore;
use engine::store::sea_orm::SeaOrmStore;
use engine::{
    Account, AccountNewCmd, Card, CardNewCmd, CardTransferCmd, CardType, CommitOutcome,
    ConvertCmd, Currency, DepositCmd, Engine, EngineError, FeedCursor, LedgerCommit, LedgerStore,
    Money, PeerTransferCmd, RateTable, Transaction, Versioned,
};
use migration::MigratorTrait;

fn engine_mem() -> Engine {
    Engine::new(Arc::new(MemoryStore::new()))
}

async fn engine_sqlite() -> Engine {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    Engine::new(Arc::new(SeaOrmStore::new(db)))
}

async fn account(engine: &Engine, email: &str) -> Account {
    engine
        .create_account(AccountNewCmd {
            email: email.to_string(),
        })
        .await
        .unwrap()
}

async fn card(engine: &Engine, account_id: Uuid, number: &str) -> Card {
    engine
        .add_card(CardNewCmd {
            account_id,
            number: number.to_string(),
            holder_name: "ALICE YILMAZ".to_string(),
            card_type: CardType::Visa,
            expiry: "12/28".to_string(),
        })
        .await
        .unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Provisioning
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn new_account_gets_welcome_bonus_in_local_currency() {
    let engine = engine_mem();
    let alice = account(&engine, "alice@example.com").await;

    assert_eq!(alice.balance, Money::from_major(100));
    assert_eq!(alice.currency, Currency::Try);

    let reloaded = engine.account(alice.id).await.unwrap();
    assert_eq!(reloaded.balance, Money::from_major(100));
}

#[tokio::test]
async fn duplicate_email_is_rejected_after_normalization() {
    let engine = engine_mem();
    account(&engine, "alice@example.com").await;

    let err = engine
        .create_account(AccountNewCmd {
            email: "  ALICE@Example.COM ".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::ExistingKey("alice@example.com".to_string()));
}

#[tokio::test]
async fn new_card_gets_opening_balance_and_masked_number() {
    let engine = engine_mem();
    let alice = account(&engine, "alice@example.com").await;
    let card = card(&engine, alice.id, "4111 1111 1111 1234").await;

    assert_eq!(card.balance, Money::from_major(200_000));
    assert_eq!(card.currency, Currency::Usd);
    assert_eq!(card.masked_number, "**** **** **** 1234");

    let cards = engine.cards(alice.id).await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].id, card.id);
}

#[tokio::test]
async fn card_for_unknown_account_fails() {
    let engine = engine_mem();
    let err = engine
        .add_card(CardNewCmd {
            account_id: Uuid::new_v4(),
            number: "4111111111111234".to_string(),
            holder_name: "NOBODY".to_string(),
            card_type: CardType::Troy,
            expiry: "01/27".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Deposit
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn deposit_converts_usd_to_local_and_debits_card() {
    let engine = engine_mem();
    let rates = RateTable::builtin();
    let alice = account(&engine, "alice@example.com").await;
    let card = card(&engine, alice.id, "4111111111111234").await;

    // 50 USD at 34.50 TRY per USD.
    let receipt = engine
        .deposit(
            DepositCmd {
                account_id: alice.id,
                card_id: card.id,
                amount: Money::from_major(50),
            },
            &rates,
        )
        .await
        .unwrap();

    assert_eq!(
        receipt.account_balance(alice.id),
        Some(Money::from_major(100) + Money::from_major(1725))
    );
    assert_eq!(
        receipt.card_balance(card.id),
        Some(Money::from_major(200_000) - Money::from_major(50))
    );

    let reloaded = engine.account(alice.id).await.unwrap();
    assert_eq!(reloaded.balance, Money::from_major(1825));
}

#[tokio::test]
async fn deposit_rejects_non_positive_amounts() {
    let engine = engine_mem();
    let rates = RateTable::builtin();
    let alice = account(&engine, "alice@example.com").await;
    let card = card(&engine, alice.id, "4111111111111234").await;

    for minor in [0, -100] {
        let err = engine
            .deposit(
                DepositCmd {
                    account_id: alice.id,
                    card_id: card.id,
                    amount: Money::new(minor),
                },
                &rates,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
    }
}

#[tokio::test]
async fn deposit_from_foreign_card_is_forbidden() {
    let engine = engine_mem();
    let rates = RateTable::builtin();
    let alice = account(&engine, "alice@example.com").await;
    let bob = account(&engine, "bob@example.com").await;
    let bobs_card = card(&engine, bob.id, "5500000000004321").await;

    let err = engine
        .deposit(
            DepositCmd {
                account_id: alice.id,
                card_id: bobs_card.id,
                amount: Money::from_major(10),
            },
            &rates,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    // Nothing moved.
    let bobs_cards = engine.cards(bob.id).await.unwrap();
    assert_eq!(bobs_cards[0].balance, Money::from_major(200_000));
}

#[tokio::test]
async fn deposit_beyond_card_balance_fails_without_side_effects() {
    let engine = engine_mem();
    let rates = RateTable::builtin();
    let alice = account(&engine, "alice@example.com").await;
    let card = card(&engine, alice.id, "4111111111111234").await;

    let err = engine
        .deposit(
            DepositCmd {
                account_id: alice.id,
                card_id: card.id,
                amount: Money::from_major(200_001),
            },
            &rates,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));

    let reloaded = engine.account(alice.id).await.unwrap();
    assert_eq!(reloaded.balance, Money::from_major(100));
    let (feed, _) = engine.list_transactions(alice.id, 10, None).await.unwrap();
    assert!(feed.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Peer transfer
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn peer_transfer_conserves_total_local_balance() {
    let engine = engine_mem();
    let alice = account(&engine, "alice@example.com").await;
    let bob = account(&engine, "bob@example.com").await;

    let receipt = engine
        .peer_transfer(PeerTransferCmd {
            from_account_id: alice.id,
            to_email: "Bob@Example.com".to_string(),
            amount: Money::from_major(40),
            description: Some("lunch".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(receipt.account_balance(alice.id), Some(Money::from_major(60)));
    assert_eq!(receipt.account_balance(bob.id), Some(Money::from_major(140)));

    let alice_after = engine.account(alice.id).await.unwrap();
    let bob_after = engine.account(bob.id).await.unwrap();
    assert_eq!(
        alice_after.balance + bob_after.balance,
        Money::from_major(200)
    );
}

#[tokio::test]
async fn self_transfer_is_caught_via_email_case_variants() {
    let engine = engine_mem();
    let alice = account(&engine, "alice@example.com").await;

    let err = engine
        .peer_transfer(PeerTransferCmd {
            from_account_id: alice.id,
            to_email: "ALICE@example.com".to_string(),
            amount: Money::from_major(10),
            description: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SelfTransferNotAllowed(_)));
}

#[tokio::test]
async fn transfer_to_unknown_email_reports_recipient() {
    let engine = engine_mem();
    let alice = account(&engine, "alice@example.com").await;

    let err = engine
        .peer_transfer(PeerTransferCmd {
            from_account_id: alice.id,
            to_email: "ghost@example.com".to_string(),
            amount: Money::from_major(10),
            description: None,
        })
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::RecipientNotFound("ghost@example.com".to_string())
    );
}

#[tokio::test]
async fn transfer_beyond_balance_fails() {
    let engine = engine_mem();
    let alice = account(&engine, "alice@example.com").await;
    account(&engine, "bob@example.com").await;

    let err = engine
        .peer_transfer(PeerTransferCmd {
            from_account_id: alice.id,
            to_email: "bob@example.com".to_string(),
            amount: Money::from_major(101),
            description: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Card-to-card transfer
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn card_transfer_moves_usd_between_own_cards() {
    let engine = engine_mem();
    let alice = account(&engine, "alice@example.com").await;
    let visa = card(&engine, alice.id, "4111111111111234").await;
    let troy = card(&engine, alice.id, "9792000000005678").await;

    let receipt = engine
        .card_transfer(CardTransferCmd {
            account_id: alice.id,
            from_card_id: visa.id,
            to_card_id: troy.id,
            amount: Money::from_major(500),
        })
        .await
        .unwrap();

    assert_eq!(
        receipt.card_balance(visa.id),
        Some(Money::from_major(199_500))
    );
    assert_eq!(
        receipt.card_balance(troy.id),
        Some(Money::from_major(200_500))
    );

    // Conservation across the pair.
    let cards = engine.cards(alice.id).await.unwrap();
    let total: Money = cards
        .iter()
        .fold(Money::ZERO, |acc, card| acc + card.balance);
    assert_eq!(total, Money::from_major(400_000));
}

#[tokio::test]
async fn card_transfer_to_same_card_is_rejected() {
    let engine = engine_mem();
    let alice = account(&engine, "alice@example.com").await;
    let visa = card(&engine, alice.id, "4111111111111234").await;

    let err = engine
        .card_transfer(CardTransferCmd {
            account_id: alice.id,
            from_card_id: visa.id,
            to_card_id: visa.id,
            amount: Money::from_major(1),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SameCard(_)));
}

#[tokio::test]
async fn card_transfer_involving_foreign_card_is_forbidden() {
    let engine = engine_mem();
    let alice = account(&engine, "alice@example.com").await;
    let bob = account(&engine, "bob@example.com").await;
    let visa = card(&engine, alice.id, "4111111111111234").await;
    let bobs = card(&engine, bob.id, "5500000000004321").await;

    let err = engine
        .card_transfer(CardTransferCmd {
            account_id: alice.id,
            from_card_id: visa.id,
            to_card_id: bobs.id,
            amount: Money::from_major(1),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Currency conversion
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn conversion_from_card_credits_local_balance() {
    let engine = engine_mem();
    let rates = RateTable::builtin();
    let alice = account(&engine, "alice@example.com").await;
    let card = card(&engine, alice.id, "4111111111111234").await;

    // 10 USD -> 345 TRY.
    let receipt = engine
        .convert_currency(
            ConvertCmd {
                account_id: alice.id,
                card_id: card.id,
                from_currency: Currency::Usd,
                to_currency: Currency::Try,
                amount: Money::from_major(10),
            },
            &rates,
        )
        .await
        .unwrap();

    assert_eq!(
        receipt.account_balance(alice.id),
        Some(Money::from_major(445))
    );
    assert_eq!(
        receipt.card_balance(card.id),
        Some(Money::from_major(199_990))
    );
}

#[tokio::test]
async fn conversion_from_account_credits_card() {
    let engine = engine_mem();
    let rates = RateTable::builtin();
    let alice = account(&engine, "alice@example.com").await;
    let card = card(&engine, alice.id, "4111111111111234").await;

    // 69 TRY -> exactly 2 USD at 34.50.
    let receipt = engine
        .convert_currency(
            ConvertCmd {
                account_id: alice.id,
                card_id: card.id,
                from_currency: Currency::Try,
                to_currency: Currency::Usd,
                amount: Money::from_major(69),
            },
            &rates,
        )
        .await
        .unwrap();

    assert_eq!(receipt.account_balance(alice.id), Some(Money::from_major(31)));
    assert_eq!(
        receipt.card_balance(card.id),
        Some(Money::from_major(200_002))
    );
}

#[tokio::test]
async fn conversion_requires_the_card_account_currency_pair() {
    let engine = engine_mem();
    let rates = RateTable::builtin();
    let alice = account(&engine, "alice@example.com").await;
    let card = card(&engine, alice.id, "4111111111111234").await;

    // EUR is neither the card's USD nor the account's TRY.
    let err = engine
        .convert_currency(
            ConvertCmd {
                account_id: alice.id,
                card_id: card.id,
                from_currency: Currency::Eur,
                to_currency: Currency::Try,
                amount: Money::from_major(10),
            },
            &rates,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CurrencyMismatch(_)));

    let err = engine
        .convert_currency(
            ConvertCmd {
                account_id: alice.id,
                card_id: card.id,
                from_currency: Currency::Usd,
                to_currency: Currency::Usd,
                amount: Money::from_major(10),
            },
            &rates,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CurrencyMismatch(_)));
}

#[tokio::test]
async fn conversion_beyond_source_balance_fails() {
    let engine = engine_mem();
    let rates = RateTable::builtin();
    let alice = account(&engine, "alice@example.com").await;
    let card = card(&engine, alice.id, "4111111111111234").await;

    // Account holds only the 100 TRY bonus.
    let err = engine
        .convert_currency(
            ConvertCmd {
                account_id: alice.id,
                card_id: card.id,
                from_currency: Currency::Try,
                to_currency: Currency::Usd,
                amount: Money::from_major(1000),
            },
            &rates,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Feed
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn feed_is_newest_first_with_direction_per_viewer() {
    let engine = engine_mem();
    let rates = RateTable::builtin();
    let alice = account(&engine, "alice@example.com").await;
    let bob = account(&engine, "bob@example.com").await;
    let card = card(&engine, alice.id, "4111111111111234").await;

    engine
        .deposit(
            DepositCmd {
                account_id: alice.id,
                card_id: card.id,
                amount: Money::from_major(10),
            },
            &rates,
        )
        .await
        .unwrap();
    engine
        .peer_transfer(PeerTransferCmd {
            from_account_id: alice.id,
            to_email: "bob@example.com".to_string(),
            amount: Money::from_major(40),
            description: None,
        })
        .await
        .unwrap();

    let (alice_feed, next) = engine.list_transactions(alice.id, 10, None).await.unwrap();
    assert!(next.is_none());
    assert_eq!(alice_feed.len(), 2);
    // Newest first: the transfer, then the deposit.
    assert_eq!(alice_feed[0].0.kind, engine::TransactionKind::PeerTransfer);
    assert!(!alice_feed[0].1);
    assert_eq!(alice_feed[1].0.kind, engine::TransactionKind::Deposit);
    assert!(alice_feed[1].1);

    let (bob_feed, _) = engine.list_transactions(bob.id, 10, None).await.unwrap();
    assert_eq!(bob_feed.len(), 1);
    assert!(bob_feed[0].1);
}

#[tokio::test]
async fn feed_pages_through_opaque_cursor() {
    let engine = engine_mem();
    let alice = account(&engine, "alice@example.com").await;
    account(&engine, "bob@example.com").await;

    for _ in 0..3 {
        engine
            .peer_transfer(PeerTransferCmd {
                from_account_id: alice.id,
                to_email: "bob@example.com".to_string(),
                amount: Money::from_major(10),
                description: None,
            })
            .await
            .unwrap();
    }

    let (first, cursor) = engine.list_transactions(alice.id, 2, None).await.unwrap();
    assert_eq!(first.len(), 2);
    let cursor = cursor.expect("a third transaction remains");

    let (second, end) = engine
        .list_transactions(alice.id, 2, Some(cursor.as_str()))
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert!(end.is_none());

    // No overlap between pages.
    assert!(!first.iter().any(|(tx, _)| tx.id == second[0].0.id));
}

#[tokio::test]
async fn garbage_cursor_is_rejected() {
    let engine = engine_mem();
    let alice = account(&engine, "alice@example.com").await;

    let err = engine
        .list_transactions(alice.id, 10, Some("not-a-cursor"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidCursor(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Concurrency
// ─────────────────────────────────────────────────────────────────────────────

/// Delegates reads to a real store but reports every commit as stale,
/// simulating a writer that always loses the version race.
struct AlwaysStale {
    inner: MemoryStore,
}

#[async_trait::async_trait]
impl LedgerStore for AlwaysStale {
    async fn insert_account(&self, account: &Account) -> Result<(), EngineError> {
        self.inner.insert_account(account).await
    }

    async fn insert_card(&self, card: &Card) -> Result<(), EngineError> {
        self.inner.insert_card(card).await
    }

    async fn account(&self, id: Uuid) -> Result<Option<Versioned<Account>>, EngineError> {
        self.inner.account(id).await
    }

    async fn account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Versioned<Account>>, EngineError> {
        self.inner.account_by_email(email).await
    }

    async fn card(&self, id: Uuid) -> Result<Option<Versioned<Card>>, EngineError> {
        self.inner.card(id).await
    }

    async fn cards_for_account(&self, account_id: Uuid) -> Result<Vec<Card>, EngineError> {
        self.inner.cards_for_account(account_id).await
    }

    async fn commit(&self, _commit: LedgerCommit) -> Result<CommitOutcome, EngineError> {
        Ok(CommitOutcome::Stale)
    }

    async fn transactions_for(
        &self,
        account_id: Uuid,
        card_ids: &[Uuid],
        limit: u64,
        before: Option<FeedCursor>,
    ) -> Result<Vec<Transaction>, EngineError> {
        self.inner
            .transactions_for(account_id, card_ids, limit, before)
            .await
    }
}

#[tokio::test]
async fn exhausted_retries_surface_as_conflict() {
    let engine = Engine::new(Arc::new(AlwaysStale {
        inner: MemoryStore::new(),
    }));
    let alice = account(&engine, "alice@example.com").await;
    account(&engine, "bob@example.com").await;

    let err = engine
        .peer_transfer(PeerTransferCmd {
            from_account_id: alice.id,
            to_email: "bob@example.com".to_string(),
            amount: Money::from_major(10),
            description: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    // A conflicted operation writes nothing.
    let (feed, _) = engine.list_transactions(alice.id, 10, None).await.unwrap();
    assert!(feed.is_empty());
    assert_eq!(
        engine.account(alice.id).await.unwrap().balance,
        Money::from_major(100)
    );
}

#[tokio::test]
async fn concurrent_spends_never_overdraw() {
    let engine = engine_mem();
    let alice = account(&engine, "alice@example.com").await;
    account(&engine, "bob@example.com").await;

    // Ten racing 20 TRY transfers against a 100 TRY balance: exactly five
    // can succeed, the rest fail with InsufficientFunds or Conflict.
    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        let from = alice.id;
        handles.push(tokio::spawn(async move {
            engine
                .peer_transfer(PeerTransferCmd {
                    from_account_id: from,
                    to_email: "bob@example.com".to_string(),
                    amount: Money::from_major(20),
                    description: None,
                })
                .await
        }));
    }

    let mut succeeded: i64 = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(EngineError::InsufficientFunds(_) | EngineError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let alice_after = engine.account(alice.id).await.unwrap();
    assert!(!alice_after.balance.is_negative());
    assert_eq!(
        alice_after.balance,
        Money::from_major(100) - Money::from_major(20 * succeeded)
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite-backed store
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sqlite_store_runs_the_full_flow() {
    let engine = engine_sqlite().await;
    let rates = RateTable::builtin();
    let alice = account(&engine, "alice@example.com").await;
    let bob = account(&engine, "bob@example.com").await;
    let card = card(&engine, alice.id, "4111111111111234").await;

    engine
        .deposit(
            DepositCmd {
                account_id: alice.id,
                card_id: card.id,
                amount: Money::from_major(50),
            },
            &rates,
        )
        .await
        .unwrap();
    engine
        .peer_transfer(PeerTransferCmd {
            from_account_id: alice.id,
            to_email: "bob@example.com".to_string(),
            amount: Money::from_major(25),
            description: Some("rent".to_string()),
        })
        .await
        .unwrap();

    let alice_after = engine.account(alice.id).await.unwrap();
    assert_eq!(alice_after.balance, Money::from_major(1800));
    let bob_after = engine.account(bob.id).await.unwrap();
    assert_eq!(bob_after.balance, Money::from_major(125));

    let (feed, next) = engine.list_transactions(alice.id, 10, None).await.unwrap();
    assert!(next.is_none());
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].0.kind, engine::TransactionKind::PeerTransfer);
    assert_eq!(feed[0].0.description.as_deref(), Some("rent"));
}

#[tokio::test]
async fn sqlite_store_rejects_stale_commits_without_partial_writes() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let store = SeaOrmStore::new(db);

    let alice = Account::new("alice@example.com", Utc::now()).unwrap();
    let bob = Account::new("bob@example.com", Utc::now()).unwrap();
    store.insert_account(&alice).await.unwrap();
    store.insert_account(&bob).await.unwrap();

    let stale = LedgerCommit {
        accounts: vec![
            engine::AccountWrite {
                account_id: alice.id,
                new_balance: Money::from_major(7),
                expected_version: 0,
            },
            engine::AccountWrite {
                account_id: bob.id,
                new_balance: Money::from_major(7),
                // Wrong version: the whole commit must be discarded.
                expected_version: 5,
            },
        ],
        cards: vec![],
        transaction: Transaction::new(
            engine::TransactionKind::PeerTransfer,
            Some(engine::PartyRef::Account { account_id: alice.id }),
            Some(engine::PartyRef::Account { account_id: bob.id }),
            Money::from_major(7),
            Currency::Try,
            None,
            Utc::now(),
        )
        .unwrap(),
    };

    let outcome = store.commit(stale).await.unwrap();
    assert_eq!(outcome, CommitOutcome::Stale);

    // Alice's write was rolled back along with Bob's.
    let alice_row = store.account(alice.id).await.unwrap().unwrap();
    assert_eq!(alice_row.row.balance, Money::ZERO);
    assert_eq!(alice_row.version, 0);
    let feed = store
        .transactions_for(alice.id, &[], 10, None)
        .await
        .unwrap();
    assert!(feed.is_empty());
}

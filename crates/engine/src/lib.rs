//! The kumbara transfer engine.
//!
//! [`Engine`] validates and atomically applies balance mutations across
//! accounts (local-currency balances) and cards (USD balances), writing one
//! immutable [`Transaction`] record per operation. All state lives behind
//! the [`LedgerStore`] boundary; the engine caches nothing between calls.
//!
//! Every operation follows the same protocol: snapshot-read the touched
//! rows, validate against the snapshot, compute new balances, and submit one
//! atomic commit guarded by per-row versions. A stale commit is retried from
//! scratch a bounded number of times before failing with
//! [`EngineError::Conflict`].

use std::sync::Arc;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use accounts::{Account, normalize_email};
pub use cards::{Card, CardType};
pub use commands::{
    AccountNewCmd, CardNewCmd, CardTransferCmd, ConvertCmd, DepositCmd, LegBalance,
    PeerTransferCmd, Receipt,
};
pub use convert::{convert, effective_rate};
pub use currency::Currency;
pub use error::EngineError;
pub use money::Money;
pub use rates::{RateEntry, RateTable};
pub use store::{
    AccountWrite, CardWrite, CommitOutcome, FeedCursor, LedgerCommit, LedgerStore, Versioned,
};
pub use transactions::{PartyRef, Transaction, TransactionKind};

pub mod accounts;
pub mod cards;
mod commands;
pub mod convert;
mod currency;
mod error;
mod money;
mod rates;
pub mod store;
pub mod transactions;

pub type ResultEngine<T> = Result<T, EngineError>;

/// Bonus credited to a freshly registered account, in the local currency.
pub const WELCOME_BONUS: Money = Money::from_major(100);

/// Simulated opening balance of a newly added card, in USD.
pub const CARD_OPENING_BALANCE: Money = Money::from_major(200_000);

/// Commit attempts before an operation gives up with `Conflict`.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// The transfer engine. Cheap to clone; stateless apart from the store
/// handle.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn LedgerStore>,
}

impl Engine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    // ───────────────────────────────────────────────────────────────────
    // Provisioning
    // ───────────────────────────────────────────────────────────────────

    /// Registers a new account and credits the welcome bonus.
    ///
    /// The bonus is part of the opening balance, not a ledger transaction:
    /// there is no source leg it could conserve against.
    pub async fn create_account(&self, cmd: AccountNewCmd) -> ResultEngine<Account> {
        let mut account = Account::new(&cmd.email, Utc::now())?;
        account.balance = WELCOME_BONUS;
        self.store.insert_account(&account).await?;
        tracing::info!(account_id = %account.id, "account created");
        Ok(account)
    }

    /// Adds a card to an account with the simulated opening balance.
    pub async fn add_card(&self, cmd: CardNewCmd) -> ResultEngine<Card> {
        self.require_account(cmd.account_id).await?;

        let mut card = Card::new(
            cmd.account_id,
            &cmd.number,
            &cmd.holder_name,
            cmd.card_type,
            &cmd.expiry,
            Utc::now(),
        )?;
        card.balance = CARD_OPENING_BALANCE;
        self.store.insert_card(&card).await?;
        tracing::info!(card_id = %card.id, account_id = %card.account_id, "card added");
        Ok(card)
    }

    // ───────────────────────────────────────────────────────────────────
    // Ledger operations
    // ───────────────────────────────────────────────────────────────────

    /// Moves `amount` USD off a card and credits the owning account's local
    /// balance with the converted value.
    pub async fn deposit(&self, cmd: DepositCmd, rates: &RateTable) -> ResultEngine<Receipt> {
        require_positive(cmd.amount)?;

        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let account = self.require_account(cmd.account_id).await?;
            let card = self.require_owned_card(cmd.card_id, cmd.account_id).await?;

            if card.row.balance < cmd.amount {
                return Err(EngineError::InsufficientFunds(format!(
                    "card balance is {} USD",
                    card.row.balance
                )));
            }

            let converted = convert(cmd.amount, card.row.currency, account.row.currency, rates)?;
            let new_account_balance = checked_credit(account.row.balance, converted)?;
            let new_card_balance = card.row.balance - cmd.amount;

            let transaction = Transaction::new(
                TransactionKind::Deposit,
                Some(PartyRef::Card { card_id: card.row.id }),
                Some(PartyRef::Account {
                    account_id: account.row.id,
                }),
                cmd.amount,
                card.row.currency,
                Some(format!(
                    "Deposited {} {} as {} {}",
                    cmd.amount,
                    card.row.currency.code(),
                    converted,
                    account.row.currency.code()
                )),
                Utc::now(),
            )?
            .with_secondary(converted, account.row.currency);
            let transaction_id = transaction.id;

            let commit = LedgerCommit {
                accounts: vec![AccountWrite {
                    account_id: account.row.id,
                    new_balance: new_account_balance,
                    expected_version: account.version,
                }],
                cards: vec![CardWrite {
                    card_id: card.row.id,
                    new_balance: new_card_balance,
                    expected_version: card.version,
                }],
                transaction,
            };

            match self.store.commit(commit).await? {
                CommitOutcome::Committed => {
                    return Ok(Receipt {
                        transaction_id,
                        balances: vec![
                            LegBalance {
                                leg: PartyRef::Account {
                                    account_id: account.row.id,
                                },
                                balance: new_account_balance,
                                currency: account.row.currency,
                            },
                            LegBalance {
                                leg: PartyRef::Card { card_id: card.row.id },
                                balance: new_card_balance,
                                currency: card.row.currency,
                            },
                        ],
                    });
                }
                CommitOutcome::Stale => continue,
            }
        }

        Err(EngineError::Conflict("deposit retries exhausted".to_string()))
    }

    /// Moves local currency from the sender to the account owning
    /// `to_email`. The self-transfer check compares resolved account ids, so
    /// case variants of the sender's own address are caught.
    pub async fn peer_transfer(&self, cmd: PeerTransferCmd) -> ResultEngine<Receipt> {
        require_positive(cmd.amount)?;
        let to_email = normalize_email(&cmd.to_email)?;

        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let sender = self.require_account(cmd.from_account_id).await?;
            let recipient = self
                .store
                .account_by_email(&to_email)
                .await?
                .ok_or_else(|| EngineError::RecipientNotFound(to_email.clone()))?;

            if recipient.row.id == sender.row.id {
                return Err(EngineError::SelfTransferNotAllowed(
                    "sender and recipient are the same account".to_string(),
                ));
            }
            if sender.row.balance < cmd.amount {
                return Err(EngineError::InsufficientFunds(format!(
                    "balance is {} {}",
                    sender.row.balance,
                    sender.row.currency.code()
                )));
            }

            let new_sender_balance = sender.row.balance - cmd.amount;
            let new_recipient_balance = checked_credit(recipient.row.balance, cmd.amount)?;

            let transaction = Transaction::new(
                TransactionKind::PeerTransfer,
                Some(PartyRef::Account {
                    account_id: sender.row.id,
                }),
                Some(PartyRef::Account {
                    account_id: recipient.row.id,
                }),
                cmd.amount,
                sender.row.currency,
                cmd.description.clone(),
                Utc::now(),
            )?;
            let transaction_id = transaction.id;

            let commit = LedgerCommit {
                accounts: vec![
                    AccountWrite {
                        account_id: sender.row.id,
                        new_balance: new_sender_balance,
                        expected_version: sender.version,
                    },
                    AccountWrite {
                        account_id: recipient.row.id,
                        new_balance: new_recipient_balance,
                        expected_version: recipient.version,
                    },
                ],
                cards: vec![],
                transaction,
            };

            match self.store.commit(commit).await? {
                CommitOutcome::Committed => {
                    return Ok(Receipt {
                        transaction_id,
                        balances: vec![
                            LegBalance {
                                leg: PartyRef::Account {
                                    account_id: sender.row.id,
                                },
                                balance: new_sender_balance,
                                currency: sender.row.currency,
                            },
                            LegBalance {
                                leg: PartyRef::Account {
                                    account_id: recipient.row.id,
                                },
                                balance: new_recipient_balance,
                                currency: recipient.row.currency,
                            },
                        ],
                    });
                }
                CommitOutcome::Stale => continue,
            }
        }

        Err(EngineError::Conflict(
            "peer transfer retries exhausted".to_string(),
        ))
    }

    /// Moves USD between two cards of the same account. No conversion.
    pub async fn card_transfer(&self, cmd: CardTransferCmd) -> ResultEngine<Receipt> {
        require_positive(cmd.amount)?;
        if cmd.from_card_id == cmd.to_card_id {
            return Err(EngineError::SameCard(
                "from_card_id and to_card_id must differ".to_string(),
            ));
        }

        for _ in 0..MAX_COMMIT_ATTEMPTS {
            self.require_account(cmd.account_id).await?;
            let from_card = self
                .require_owned_card(cmd.from_card_id, cmd.account_id)
                .await?;
            let to_card = self
                .require_owned_card(cmd.to_card_id, cmd.account_id)
                .await?;

            if from_card.row.balance < cmd.amount {
                return Err(EngineError::InsufficientFunds(format!(
                    "card balance is {} USD",
                    from_card.row.balance
                )));
            }

            let new_from_balance = from_card.row.balance - cmd.amount;
            let new_to_balance = checked_credit(to_card.row.balance, cmd.amount)?;

            let transaction = Transaction::new(
                TransactionKind::CardTransfer,
                Some(PartyRef::Card {
                    card_id: from_card.row.id,
                }),
                Some(PartyRef::Card {
                    card_id: to_card.row.id,
                }),
                cmd.amount,
                from_card.row.currency,
                Some(format!(
                    "{} → {} ({} USD)",
                    from_card.row.card_type.as_str(),
                    to_card.row.card_type.as_str(),
                    cmd.amount
                )),
                Utc::now(),
            )?;
            let transaction_id = transaction.id;

            let commit = LedgerCommit {
                accounts: vec![],
                cards: vec![
                    CardWrite {
                        card_id: from_card.row.id,
                        new_balance: new_from_balance,
                        expected_version: from_card.version,
                    },
                    CardWrite {
                        card_id: to_card.row.id,
                        new_balance: new_to_balance,
                        expected_version: to_card.version,
                    },
                ],
                transaction,
            };

            match self.store.commit(commit).await? {
                CommitOutcome::Committed => {
                    return Ok(Receipt {
                        transaction_id,
                        balances: vec![
                            LegBalance {
                                leg: PartyRef::Card {
                                    card_id: from_card.row.id,
                                },
                                balance: new_from_balance,
                                currency: from_card.row.currency,
                            },
                            LegBalance {
                                leg: PartyRef::Card {
                                    card_id: to_card.row.id,
                                },
                                balance: new_to_balance,
                                currency: to_card.row.currency,
                            },
                        ],
                    });
                }
                CommitOutcome::Stale => continue,
            }
        }

        Err(EngineError::Conflict(
            "card transfer retries exhausted".to_string(),
        ))
    }

    /// Converts between the card's USD balance and the account's local
    /// balance.
    ///
    /// Exactly one of `from_currency`/`to_currency` must be the card's
    /// currency (USD) and the other the account's local currency; the USD
    /// leg always lives on the named card.
    pub async fn convert_currency(
        &self,
        cmd: ConvertCmd,
        rates: &RateTable,
    ) -> ResultEngine<Receipt> {
        require_positive(cmd.amount)?;
        if cmd.from_currency == cmd.to_currency {
            return Err(EngineError::CurrencyMismatch(
                "from_currency and to_currency must differ".to_string(),
            ));
        }
        // Both rates must be present and positive before any row is loaded.
        rates.rate_to_usd(cmd.from_currency)?;
        rates.rate_to_usd(cmd.to_currency)?;

        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let account = self.require_account(cmd.account_id).await?;
            let card = self.require_owned_card(cmd.card_id, cmd.account_id).await?;

            // Which side funds the conversion.
            let card_is_source = if cmd.from_currency == card.row.currency
                && cmd.to_currency == account.row.currency
            {
                true
            } else if cmd.from_currency == account.row.currency
                && cmd.to_currency == card.row.currency
            {
                false
            } else {
                return Err(EngineError::CurrencyMismatch(format!(
                    "conversion must pair the card's {} with the account's {}",
                    card.row.currency.code(),
                    account.row.currency.code()
                )));
            };

            let (source_balance, source_code) = if card_is_source {
                (card.row.balance, card.row.currency.code())
            } else {
                (account.row.balance, account.row.currency.code())
            };
            if source_balance < cmd.amount {
                return Err(EngineError::InsufficientFunds(format!(
                    "{source_code} balance is {source_balance}"
                )));
            }

            let converted = convert(cmd.amount, cmd.from_currency, cmd.to_currency, rates)?;

            let (new_card_balance, new_account_balance) = if card_is_source {
                (
                    card.row.balance - cmd.amount,
                    checked_credit(account.row.balance, converted)?,
                )
            } else {
                (
                    checked_credit(card.row.balance, converted)?,
                    account.row.balance - cmd.amount,
                )
            };

            let (from_ref, to_ref) = if card_is_source {
                (
                    PartyRef::Card { card_id: card.row.id },
                    PartyRef::Account {
                        account_id: account.row.id,
                    },
                )
            } else {
                (
                    PartyRef::Account {
                        account_id: account.row.id,
                    },
                    PartyRef::Card { card_id: card.row.id },
                )
            };

            let rate = effective_rate(cmd.amount, converted);
            let transaction = Transaction::new(
                TransactionKind::Conversion,
                Some(from_ref),
                Some(to_ref),
                cmd.amount,
                cmd.from_currency,
                Some(format!(
                    "{} {} → {} {} (rate {rate:.4})",
                    cmd.amount,
                    cmd.from_currency.code(),
                    converted,
                    cmd.to_currency.code()
                )),
                Utc::now(),
            )?
            .with_secondary(converted, cmd.to_currency);
            let transaction_id = transaction.id;

            let commit = LedgerCommit {
                accounts: vec![AccountWrite {
                    account_id: account.row.id,
                    new_balance: new_account_balance,
                    expected_version: account.version,
                }],
                cards: vec![CardWrite {
                    card_id: card.row.id,
                    new_balance: new_card_balance,
                    expected_version: card.version,
                }],
                transaction,
            };

            match self.store.commit(commit).await? {
                CommitOutcome::Committed => {
                    return Ok(Receipt {
                        transaction_id,
                        balances: vec![
                            LegBalance {
                                leg: PartyRef::Account {
                                    account_id: account.row.id,
                                },
                                balance: new_account_balance,
                                currency: account.row.currency,
                            },
                            LegBalance {
                                leg: PartyRef::Card { card_id: card.row.id },
                                balance: new_card_balance,
                                currency: card.row.currency,
                            },
                        ],
                    });
                }
                CommitOutcome::Stale => continue,
            }
        }

        Err(EngineError::Conflict(
            "conversion retries exhausted".to_string(),
        ))
    }

    // ───────────────────────────────────────────────────────────────────
    // Queries
    // ───────────────────────────────────────────────────────────────────

    pub async fn account(&self, account_id: Uuid) -> ResultEngine<Account> {
        Ok(self.require_account(account_id).await?.row)
    }

    pub async fn account_by_email(&self, email: &str) -> ResultEngine<Account> {
        let email = normalize_email(email)?;
        self.store
            .account_by_email(&email)
            .await?
            .map(|versioned| versioned.row)
            .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))
    }

    pub async fn cards(&self, account_id: Uuid) -> ResultEngine<Vec<Card>> {
        self.require_account(account_id).await?;
        self.store.cards_for_account(account_id).await
    }

    /// Transaction feed for an account: everything touching the account or
    /// one of its cards, newest first, with cursor-based pagination.
    ///
    /// Returns `(transaction, is_incoming)` pairs, where direction is
    /// derived from the viewer's identity at read time.
    pub async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: u64,
        cursor: Option<&str>,
    ) -> ResultEngine<(Vec<(Transaction, bool)>, Option<String>)> {
        self.require_account(account_id).await?;
        let card_ids: Vec<Uuid> = self
            .store
            .cards_for_account(account_id)
            .await?
            .into_iter()
            .map(|card| card.id)
            .collect();

        let before = cursor.map(FeedPageCursor::decode).transpose()?.map(
            |cursor| FeedCursor {
                created_at: cursor.created_at,
                id: cursor.transaction_id,
            },
        );

        // Fetch one extra row to learn whether another page exists.
        let mut transactions = self
            .store
            .transactions_for(account_id, &card_ids, limit.saturating_add(1), before)
            .await?;

        let next_cursor = if transactions.len() as u64 > limit {
            transactions.truncate(limit as usize);
            match transactions.last() {
                Some(last) => Some(
                    FeedPageCursor {
                        created_at: last.created_at,
                        transaction_id: last.id,
                    }
                    .encode()?,
                ),
                None => None,
            }
        } else {
            None
        };

        let entries = transactions
            .into_iter()
            .map(|tx| {
                let incoming = tx.is_incoming_for(account_id, &card_ids);
                (tx, incoming)
            })
            .collect();

        Ok((entries, next_cursor))
    }

    // ───────────────────────────────────────────────────────────────────
    // Row loading helpers
    // ───────────────────────────────────────────────────────────────────

    async fn require_account(&self, account_id: Uuid) -> ResultEngine<Versioned<Account>> {
        self.store
            .account(account_id)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))
    }

    /// Loads a card and checks ownership. A card that exists but belongs to
    /// someone else is `Forbidden`, not `KeyNotFound`.
    async fn require_owned_card(
        &self,
        card_id: Uuid,
        account_id: Uuid,
    ) -> ResultEngine<Versioned<Card>> {
        let card = self
            .store
            .card(card_id)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("card not exists".to_string()))?;
        if card.row.account_id != account_id {
            return Err(EngineError::Forbidden(
                "card belongs to another account".to_string(),
            ));
        }
        Ok(card)
    }
}

fn require_positive(amount: Money) -> ResultEngine<()> {
    if !amount.is_positive() {
        return Err(EngineError::InvalidAmount("amount must be > 0".to_string()));
    }
    Ok(())
}

/// Credit with overflow detection; balances stay representable.
fn checked_credit(balance: Money, amount: Money) -> ResultEngine<Money> {
    balance
        .checked_add(amount)
        .ok_or_else(|| EngineError::InvalidAmount("balance overflow".to_string()))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FeedPageCursor {
    created_at: DateTime<Utc>,
    transaction_id: Uuid,
}

impl FeedPageCursor {
    fn encode(&self) -> ResultEngine<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|_| EngineError::InvalidCursor("invalid transactions cursor".to_string()))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    fn decode(input: &str) -> ResultEngine<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(input.as_bytes())
            .map_err(|_| EngineError::InvalidCursor("invalid transactions cursor".to_string()))?;
        serde_json::from_slice::<Self>(&bytes)
            .map_err(|_| EngineError::InvalidCursor("invalid transactions cursor".to_string()))
    }
}

//! Transaction records: the append-only audit trail of the ledger.
//!
//! A `Transaction` is written in the same atomic commit as the balance
//! mutations it describes and is never updated or deleted afterwards. The
//! `amount` is always in the currency of the *source* leg;
//! `secondary_amount` carries the converted destination amount when a
//! currency boundary was crossed.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, DbErr, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, Money};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    PeerTransfer,
    CardTransfer,
    Conversion,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::PeerTransfer => "peer_transfer",
            Self::CardTransfer => "card_transfer",
            Self::Conversion => "conversion",
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "deposit" => Ok(Self::Deposit),
            "peer_transfer" => Ok(Self::PeerTransfer),
            "card_transfer" => Ok(Self::CardTransfer),
            "conversion" => Ok(Self::Conversion),
            // Only reachable when decoding stored rows.
            other => Err(EngineError::Database(DbErr::Custom(format!(
                "invalid transaction kind: {other}"
            )))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum PartyKind {
    Account,
    Card,
}

impl PartyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Card => "card",
        }
    }
}

impl TryFrom<&str> for PartyKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "account" => Ok(Self::Account),
            "card" => Ok(Self::Card),
            other => Err(EngineError::Database(DbErr::Custom(format!(
                "invalid transaction party kind: {other}"
            )))),
        }
    }
}

/// One side (source or destination) of a money movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "party", rename_all = "snake_case")]
pub enum PartyRef {
    Account { account_id: Uuid },
    Card { card_id: Uuid },
}

impl PartyRef {
    pub(crate) fn kind(self) -> PartyKind {
        match self {
            Self::Account { .. } => PartyKind::Account,
            Self::Card { .. } => PartyKind::Card,
        }
    }

    pub(crate) fn id(self) -> Uuid {
        match self {
            Self::Account { account_id } => account_id,
            Self::Card { card_id } => card_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub from_ref: Option<PartyRef>,
    pub to_ref: Option<PartyRef>,
    /// Amount in the currency of the source leg.
    pub amount: Money,
    pub currency: Currency,
    /// Converted destination amount when a currency boundary was crossed.
    pub secondary_amount: Option<Money>,
    pub secondary_currency: Option<Currency>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: TransactionKind,
        from_ref: Option<PartyRef>,
        to_ref: Option<PartyRef>,
        amount: Money,
        currency: Currency,
        description: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount("amount must be > 0".to_string()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            from_ref,
            to_ref,
            amount,
            currency,
            secondary_amount: None,
            secondary_currency: None,
            description,
            created_at,
        })
    }

    pub fn with_secondary(mut self, amount: Money, currency: Currency) -> Self {
        self.secondary_amount = Some(amount);
        self.secondary_currency = Some(currency);
        self
    }

    /// `true` when the transaction moves money *towards* the viewer.
    ///
    /// Direction is derived from the viewer's account id and card ids at read
    /// time; it is deliberately not stored per row.
    #[must_use]
    pub fn is_incoming_for(&self, account_id: Uuid, card_ids: &[Uuid]) -> bool {
        match self.to_ref {
            Some(PartyRef::Account { account_id: id }) => id == account_id,
            Some(PartyRef::Card { card_id }) => card_ids.contains(&card_id),
            None => false,
        }
    }

    /// `true` when the transaction touches the viewer's account or cards on
    /// either leg.
    #[must_use]
    pub fn touches(&self, account_id: Uuid, card_ids: &[Uuid]) -> bool {
        let leg_touches = |leg: Option<PartyRef>| match leg {
            Some(PartyRef::Account { account_id: id }) => id == account_id,
            Some(PartyRef::Card { card_id }) => card_ids.contains(&card_id),
            None => false,
        };
        leg_touches(self.from_ref) || leg_touches(self.to_ref)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub kind: String,
    pub from_kind: Option<String>,
    pub from_id: Option<String>,
    pub to_kind: Option<String>,
    pub to_id: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub secondary_amount_minor: Option<i64>,
    pub secondary_currency: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id.to_string()),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            from_kind: ActiveValue::Set(tx.from_ref.map(|p| p.kind().as_str().to_string())),
            from_id: ActiveValue::Set(tx.from_ref.map(|p| p.id().to_string())),
            to_kind: ActiveValue::Set(tx.to_ref.map(|p| p.kind().as_str().to_string())),
            to_id: ActiveValue::Set(tx.to_ref.map(|p| p.id().to_string())),
            amount_minor: ActiveValue::Set(tx.amount.minor()),
            currency: ActiveValue::Set(tx.currency.code().to_string()),
            secondary_amount_minor: ActiveValue::Set(tx.secondary_amount.map(Money::minor)),
            secondary_currency: ActiveValue::Set(
                tx.secondary_currency.map(|c| c.code().to_string()),
            ),
            description: ActiveValue::Set(tx.description.clone()),
            created_at: ActiveValue::Set(tx.created_at),
        }
    }
}

fn parse_party(kind: Option<&str>, id: Option<&str>) -> Result<Option<PartyRef>, EngineError> {
    let (Some(kind), Some(id)) = (kind, id) else {
        return Ok(None);
    };
    let id = Uuid::parse_str(id).map_err(|_| {
        EngineError::Database(DbErr::Custom(format!("invalid transaction party id: {id}")))
    })?;
    let party = match PartyKind::try_from(kind)? {
        PartyKind::Account => PartyRef::Account { account_id: id },
        PartyKind::Card => PartyRef::Card { card_id: id },
    };
    Ok(Some(party))
}

impl TryFrom<&Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: &Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::KeyNotFound("transaction not exists".to_string()))?,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            from_ref: parse_party(model.from_kind.as_deref(), model.from_id.as_deref())?,
            to_ref: parse_party(model.to_kind.as_deref(), model.to_id.as_deref())?,
            amount: Money::new(model.amount_minor),
            currency: Currency::try_from(model.currency.as_str()).unwrap_or_default(),
            secondary_amount: model.secondary_amount_minor.map(Money::new),
            secondary_currency: model
                .secondary_currency
                .as_deref()
                .and_then(|s| Currency::try_from(s).ok()),
            description: model.description.clone(),
            created_at: model.created_at,
        })
    }
}

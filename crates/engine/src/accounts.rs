//! Accounts: one per registered user, balance in the local currency.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::{Currency, EngineError, Money, ResultEngine};

/// A user account.
///
/// The balance is always kept in [`Currency::LOCAL`] and must never go
/// negative; the engine validates that before every commit. The email is
/// stored in normalized form (see [`normalize_email`]) so lookups and the
/// unique constraint are case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable identifier, immutable for the lifetime of the account.
    pub id: Uuid,
    /// Normalized email, unique across the ledger.
    pub email: String,
    pub balance: Money,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates an account with a zero balance in the local currency.
    ///
    /// The email is normalized here; a malformed address is rejected at this
    /// boundary instead of deep inside an operation.
    pub fn new(email: &str, created_at: DateTime<Utc>) -> ResultEngine<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            email: normalize_email(email)?,
            balance: Money::ZERO,
            currency: Currency::LOCAL,
            created_at,
        })
    }
}

/// Normalizes an email for storage and comparison: trim, Unicode NFC,
/// ASCII-lowercase.
///
/// Self-transfer checks resolve the recipient through this normalized form
/// and then compare account **ids**, so case-variant aliases of the sender's
/// own address cannot slip through.
pub fn normalize_email(raw: &str) -> ResultEngine<String> {
    let normalized: String = raw.trim().nfc().collect::<String>().to_lowercase();

    let mut parts = normalized.split('@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    if local.is_empty() || domain.is_empty() || parts.next().is_some() {
        return Err(EngineError::InvalidEmail(raw.trim().to_string()));
    }

    Ok(normalized)
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub email: String,
    pub balance_minor: i64,
    pub currency: String,
    pub version: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cards::Entity")]
    Cards,
}

impl Related<super::cards::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cards.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Account> for ActiveModel {
    fn from(account: &Account) -> Self {
        Self {
            id: ActiveValue::Set(account.id.to_string()),
            email: ActiveValue::Set(account.email.clone()),
            balance_minor: ActiveValue::Set(account.balance.minor()),
            currency: ActiveValue::Set(account.currency.code().to_string()),
            version: ActiveValue::Set(0),
            created_at: ActiveValue::Set(account.created_at),
        }
    }
}

impl TryFrom<&Model> for Account {
    type Error = EngineError;

    fn try_from(model: &Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::KeyNotFound("account not exists".to_string()))?,
            email: model.email.clone(),
            balance: Money::new(model.balance_minor),
            currency: Currency::try_from(model.currency.as_str()).unwrap_or_default(),
            created_at: model.created_at,
        })
    }
}

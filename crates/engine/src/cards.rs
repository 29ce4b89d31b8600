//! Cards: USD-denominated funding sources owned by exactly one account.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, Money, ResultEngine};

/// Card brands accepted by the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardType {
    Visa,
    Mastercard,
    Troy,
}

impl CardType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visa => "Visa",
            Self::Mastercard => "Mastercard",
            Self::Troy => "Troy",
        }
    }
}

impl TryFrom<&str> for CardType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Visa" => Ok(Self::Visa),
            "Mastercard" => Ok(Self::Mastercard),
            "Troy" => Ok(Self::Troy),
            other => Err(EngineError::InvalidCard(format!(
                "unknown card type: {other}"
            ))),
        }
    }
}

/// A card.
///
/// The owner never changes after creation and the USD balance must never go
/// negative. Only the masked form of the number survives intake: the PAN and
/// CVV are validated and discarded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    /// Owning account, immutable.
    pub account_id: Uuid,
    pub holder_name: String,
    /// `**** **** **** 1234` form; the full number is never stored.
    pub masked_number: String,
    pub expiry: String,
    pub card_type: CardType,
    pub balance: Money,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

impl Card {
    /// Builds a card from raw intake data.
    ///
    /// The number must be 16 digits once spaces are removed; anything else is
    /// [`EngineError::InvalidCard`]. The stored form keeps only the last four
    /// digits.
    pub fn new(
        account_id: Uuid,
        number: &str,
        holder_name: &str,
        card_type: CardType,
        expiry: &str,
        created_at: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        let digits: String = number.chars().filter(|c| !c.is_whitespace()).collect();
        if digits.len() != 16 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(EngineError::InvalidCard(
                "card number must be 16 digits".to_string(),
            ));
        }
        let holder = holder_name.trim();
        if holder.is_empty() {
            return Err(EngineError::InvalidCard("missing card holder".to_string()));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            account_id,
            holder_name: holder.to_string(),
            masked_number: format!("**** **** **** {}", &digits[12..]),
            expiry: expiry.trim().to_string(),
            card_type,
            balance: Money::ZERO,
            currency: Currency::PIVOT,
            created_at,
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cards")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: String,
    pub holder_name: String,
    pub masked_number: String,
    pub expiry: String,
    pub card_type: String,
    pub balance_minor: i64,
    pub currency: String,
    pub version: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Accounts,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Accounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Card> for ActiveModel {
    fn from(card: &Card) -> Self {
        Self {
            id: ActiveValue::Set(card.id.to_string()),
            account_id: ActiveValue::Set(card.account_id.to_string()),
            holder_name: ActiveValue::Set(card.holder_name.clone()),
            masked_number: ActiveValue::Set(card.masked_number.clone()),
            expiry: ActiveValue::Set(card.expiry.clone()),
            card_type: ActiveValue::Set(card.card_type.as_str().to_string()),
            balance_minor: ActiveValue::Set(card.balance.minor()),
            currency: ActiveValue::Set(card.currency.code().to_string()),
            version: ActiveValue::Set(0),
            created_at: ActiveValue::Set(card.created_at),
        }
    }
}

impl TryFrom<&Model> for Card {
    type Error = EngineError;

    fn try_from(model: &Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::KeyNotFound("card not exists".to_string()))?,
            account_id: Uuid::parse_str(&model.account_id)
                .map_err(|_| EngineError::KeyNotFound("account not exists".to_string()))?,
            holder_name: model.holder_name.clone(),
            masked_number: model.masked_number.clone(),
            expiry: model.expiry.clone(),
            card_type: CardType::try_from(model.card_type.as_str())?,
            balance: Money::new(model.balance_minor),
            currency: Currency::try_from(model.currency.as_str()).unwrap_or(Currency::PIVOT),
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(number: &str) -> ResultEngine<Card> {
        Card::new(
            Uuid::new_v4(),
            number,
            "ALICE YILMAZ",
            CardType::Visa,
            "12/28",
            Utc::now(),
        )
    }

    #[test]
    fn masks_all_but_last_four() {
        let card = card("4111 1111 1111 1234").unwrap();
        assert_eq!(card.masked_number, "**** **** **** 1234");
        assert_eq!(card.currency, Currency::PIVOT);
    }

    #[test]
    fn rejects_short_or_non_numeric_numbers() {
        assert!(card("4111 1111 1111").is_err());
        assert!(card("4111x1111y1111z1234").is_err());
    }

    #[test]
    fn unknown_brand_is_rejected() {
        assert!(CardType::try_from("Amex").is_err());
    }
}

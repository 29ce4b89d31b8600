//! Request and response records for the engine operations.
//!
//! Each operation takes a dedicated command struct instead of a loosely
//! typed payload; the four ledger operations form a closed set and every
//! field is validated before anything is written.

use uuid::Uuid;

use crate::{CardType, Currency, Money, PartyRef};

pub struct AccountNewCmd {
    pub email: String,
}

pub struct CardNewCmd {
    pub account_id: Uuid,
    pub number: String,
    pub holder_name: String,
    pub card_type: CardType,
    pub expiry: String,
}

/// Move USD off a card onto the owning account's local balance.
pub struct DepositCmd {
    pub account_id: Uuid,
    pub card_id: Uuid,
    /// USD amount to take from the card.
    pub amount: Money,
}

/// Move local currency from one account to another, addressed by email.
pub struct PeerTransferCmd {
    pub from_account_id: Uuid,
    pub to_email: String,
    pub amount: Money,
    pub description: Option<String>,
}

/// Move USD between two cards of the same account.
pub struct CardTransferCmd {
    pub account_id: Uuid,
    pub from_card_id: Uuid,
    pub to_card_id: Uuid,
    pub amount: Money,
}

/// Convert between the card's USD balance and the account's local balance.
pub struct ConvertCmd {
    pub account_id: Uuid,
    pub card_id: Uuid,
    pub from_currency: Currency,
    pub to_currency: Currency,
    /// Amount in `from_currency`.
    pub amount: Money,
}

/// Balance of one touched leg after a successful commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LegBalance {
    pub leg: PartyRef,
    pub balance: Money,
    pub currency: Currency,
}

/// Result of a committed operation: the transaction id plus the new balance
/// of every row the operation touched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_id: Uuid,
    pub balances: Vec<LegBalance>,
}

impl Receipt {
    /// New balance of `account_id`, if the operation touched it.
    #[must_use]
    pub fn account_balance(&self, account_id: Uuid) -> Option<Money> {
        self.balances.iter().find_map(|leg| match leg.leg {
            PartyRef::Account { account_id: id } if id == account_id => Some(leg.balance),
            _ => None,
        })
    }

    /// New balance of `card_id`, if the operation touched it.
    #[must_use]
    pub fn card_balance(&self, card_id: Uuid) -> Option<Money> {
        self.balances.iter().find_map(|leg| match leg.leg {
            PartyRef::Card { card_id: id } if id == card_id => Some(leg.balance),
            _ => None,
        })
    }
}

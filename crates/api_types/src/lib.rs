//! Wire types shared between the server and its clients.
//!
//! Monetary amounts travel as **integer minor units** (`*_minor` fields);
//! currencies as their uppercase ISO codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod account {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AccountNew {
        pub email: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AccountView {
        pub id: Uuid,
        pub email: String,
        pub balance_minor: i64,
        pub currency: String,
        pub created_at: DateTime<Utc>,
    }
}

pub mod card {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CardNew {
        /// Full PAN; validated, masked, and discarded server-side.
        pub number: String,
        pub holder_name: String,
        /// `Visa`, `Mastercard` or `Troy`.
        pub card_type: String,
        pub expiry: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CardView {
        pub id: Uuid,
        pub holder_name: String,
        pub masked_number: String,
        pub expiry: String,
        pub card_type: String,
        pub balance_minor: i64,
        pub currency: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CardsResponse {
        pub cards: Vec<CardView>,
    }
}

pub mod transfer {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct DepositNew {
        pub card_id: Uuid,
        /// USD amount to move off the card.
        pub amount_minor: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SendMoneyNew {
        pub to_email: String,
        pub amount_minor: i64,
        pub description: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CardTransferNew {
        pub from_card_id: Uuid,
        pub to_card_id: Uuid,
        pub amount_minor: i64,
    }

    /// New balance of one leg touched by an operation.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct BalanceView {
        /// `account` or `card`.
        pub kind: String,
        pub id: Uuid,
        pub balance_minor: i64,
        pub currency: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransferResponse {
        pub transaction_id: Uuid,
        pub balances: Vec<BalanceView>,
    }
}

pub mod conversion {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ConvertNew {
        pub card_id: Uuid,
        pub from_currency: String,
        pub to_currency: String,
        /// Amount in `from_currency`.
        pub amount_minor: i64,
    }
}

pub mod transaction {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionList {
        pub limit: Option<u64>,
        /// Opaque pagination cursor (base64), from `next_cursor`.
        ///
        /// Newest → older pagination.
        pub cursor: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionView {
        pub id: Uuid,
        /// `deposit`, `peer_transfer`, `card_transfer` or `conversion`.
        pub kind: String,
        /// Amount in the source-leg currency.
        pub amount_minor: i64,
        pub currency: String,
        /// Converted destination amount, when a currency boundary was
        /// crossed.
        pub secondary_amount_minor: Option<i64>,
        pub secondary_currency: Option<String>,
        pub description: Option<String>,
        /// Whether the viewer is on the receiving end.
        pub is_incoming: bool,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionListResponse {
        pub transactions: Vec<TransactionView>,
        /// Opaque cursor for fetching the next page (older items).
        pub next_cursor: Option<String>,
    }
}

pub mod rates {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RateView {
        pub currency: String,
        pub display_name: String,
        pub display_symbol: String,
        /// Units of this currency per 1 USD.
        pub rate_to_usd: f64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RatesResponse {
        pub rates: Vec<RateView>,
    }
}

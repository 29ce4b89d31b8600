//! Ledger operation endpoints: deposit, peer transfer, card-to-card
//! transfer, currency conversion.

use api_types::conversion::ConvertNew;
use api_types::transfer::{
    BalanceView, CardTransferNew, DepositNew, SendMoneyNew, TransferResponse,
};
use axum::{Extension, Json, extract::State};

use crate::{ServerError, server::ServerState};
use engine::{
    Account, CardTransferCmd, ConvertCmd, Currency, DepositCmd, Money, PartyRef, PeerTransferCmd,
    Receipt,
};

fn response(receipt: Receipt) -> TransferResponse {
    let balances = receipt
        .balances
        .into_iter()
        .map(|leg| {
            let (kind, id) = match leg.leg {
                PartyRef::Account { account_id } => ("account", account_id),
                PartyRef::Card { card_id } => ("card", card_id),
            };
            BalanceView {
                kind: kind.to_string(),
                id,
                balance_minor: leg.balance.minor(),
                currency: leg.currency.code().to_string(),
            }
        })
        .collect();

    TransferResponse {
        transaction_id: receipt.transaction_id,
        balances,
    }
}

pub async fn deposit(
    Extension(account): Extension<Account>,
    State(state): State<ServerState>,
    Json(payload): Json<DepositNew>,
) -> Result<Json<TransferResponse>, ServerError> {
    let rates = state.rate_snapshot()?;
    let receipt = state
        .engine
        .deposit(
            DepositCmd {
                account_id: account.id,
                card_id: payload.card_id,
                amount: Money::new(payload.amount_minor),
            },
            &rates,
        )
        .await?;

    Ok(Json(response(receipt)))
}

pub async fn send_money(
    Extension(account): Extension<Account>,
    State(state): State<ServerState>,
    Json(payload): Json<SendMoneyNew>,
) -> Result<Json<TransferResponse>, ServerError> {
    let receipt = state
        .engine
        .peer_transfer(PeerTransferCmd {
            from_account_id: account.id,
            to_email: payload.to_email,
            amount: Money::new(payload.amount_minor),
            description: payload.description,
        })
        .await?;

    Ok(Json(response(receipt)))
}

pub async fn transfer_cards(
    Extension(account): Extension<Account>,
    State(state): State<ServerState>,
    Json(payload): Json<CardTransferNew>,
) -> Result<Json<TransferResponse>, ServerError> {
    let receipt = state
        .engine
        .card_transfer(CardTransferCmd {
            account_id: account.id,
            from_card_id: payload.from_card_id,
            to_card_id: payload.to_card_id,
            amount: Money::new(payload.amount_minor),
        })
        .await?;

    Ok(Json(response(receipt)))
}

pub async fn convert(
    Extension(account): Extension<Account>,
    State(state): State<ServerState>,
    Json(payload): Json<ConvertNew>,
) -> Result<Json<TransferResponse>, ServerError> {
    let from_currency = Currency::try_from(payload.from_currency.as_str())?;
    let to_currency = Currency::try_from(payload.to_currency.as_str())?;

    let rates = state.rate_snapshot()?;
    let receipt = state
        .engine
        .convert_currency(
            ConvertCmd {
                account_id: account.id,
                card_id: payload.card_id,
                from_currency,
                to_currency,
                amount: Money::new(payload.amount_minor),
            },
            &rates,
        )
        .await?;

    Ok(Json(response(receipt)))
}

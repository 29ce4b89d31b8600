//! Transaction feed endpoint

use api_types::transaction::{TransactionList, TransactionListResponse, TransactionView};
use axum::{
    Extension, Json,
    extract::{Query, State},
};

use crate::{ServerError, server::ServerState};
use engine::{Account, Money};

const DEFAULT_LIMIT: u64 = 50;
const MAX_LIMIT: u64 = 200;

pub async fn list(
    Extension(account): Extension<Account>,
    State(state): State<ServerState>,
    Query(payload): Query<TransactionList>,
) -> Result<Json<TransactionListResponse>, ServerError> {
    let limit = payload.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    let (entries, next_cursor) = state
        .engine
        .list_transactions(account.id, limit, payload.cursor.as_deref())
        .await?;

    let transactions = entries
        .into_iter()
        .map(|(tx, is_incoming)| TransactionView {
            id: tx.id,
            kind: tx.kind.as_str().to_string(),
            amount_minor: tx.amount.minor(),
            currency: tx.currency.code().to_string(),
            secondary_amount_minor: tx.secondary_amount.map(Money::minor),
            secondary_currency: tx.secondary_currency.map(|c| c.code().to_string()),
            description: tx.description,
            is_incoming,
            created_at: tx.created_at,
        })
        .collect();

    Ok(Json(TransactionListResponse {
        transactions,
        next_cursor,
    }))
}

//! Card API endpoints

use api_types::card::{CardNew, CardView, CardsResponse};
use axum::{Extension, Json, extract::State, http::StatusCode};

use crate::{ServerError, server::ServerState};
use engine::{Account, Card, CardNewCmd, CardType};

fn view(card: Card) -> CardView {
    CardView {
        id: card.id,
        holder_name: card.holder_name,
        masked_number: card.masked_number,
        expiry: card.expiry,
        card_type: card.card_type.as_str().to_string(),
        balance_minor: card.balance.minor(),
        currency: card.currency.code().to_string(),
    }
}

pub async fn card_new(
    Extension(account): Extension<Account>,
    State(state): State<ServerState>,
    Json(payload): Json<CardNew>,
) -> Result<(StatusCode, Json<CardView>), ServerError> {
    let card_type = CardType::try_from(payload.card_type.as_str())?;

    let card = state
        .engine
        .add_card(CardNewCmd {
            account_id: account.id,
            number: payload.number,
            holder_name: payload.holder_name,
            card_type,
            expiry: payload.expiry,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(view(card))))
}

pub async fn list(
    Extension(account): Extension<Account>,
    State(state): State<ServerState>,
) -> Result<Json<CardsResponse>, ServerError> {
    let cards = state.engine.cards(account.id).await?;

    Ok(Json(CardsResponse {
        cards: cards.into_iter().map(view).collect(),
    }))
}

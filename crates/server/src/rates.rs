//! Exchange-rate endpoint

use api_types::rates::{RateView, RatesResponse};
use axum::{Json, extract::State};

use crate::{ServerError, server::ServerState};

pub async fn list(State(state): State<ServerState>) -> Result<Json<RatesResponse>, ServerError> {
    let table = state.rate_snapshot()?;

    let mut rates: Vec<RateView> = table
        .iter()
        .map(|(currency, entry)| RateView {
            currency: currency.code().to_string(),
            display_name: entry.display_name.clone(),
            display_symbol: entry.display_symbol.clone(),
            rate_to_usd: entry.rate_to_usd,
        })
        .collect();
    rates.sort_by(|a, b| a.currency.cmp(&b.currency));

    Ok(Json(RatesResponse { rates }))
}

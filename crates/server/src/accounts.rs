//! Account API endpoints

use api_types::account::{AccountNew, AccountView};
use axum::{Extension, Json, extract::State, http::StatusCode};

use crate::{ServerError, server::ServerState};
use engine::{Account, AccountNewCmd};

fn view(account: Account) -> AccountView {
    AccountView {
        id: account.id,
        email: account.email,
        balance_minor: account.balance.minor(),
        currency: account.currency.code().to_string(),
        created_at: account.created_at,
    }
}

/// `POST /accounts` - open for everyone; later requests identify themselves
/// with the returned id.
pub async fn register(
    State(state): State<ServerState>,
    Json(payload): Json<AccountNew>,
) -> Result<(StatusCode, Json<AccountView>), ServerError> {
    let account = state
        .engine
        .create_account(AccountNewCmd {
            email: payload.email,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(view(account))))
}

/// `GET /account` - the viewer's own account, as resolved by the identity
/// middleware.
pub async fn get(
    Extension(account): Extension<Account>,
) -> Result<Json<AccountView>, ServerError> {
    Ok(Json(view(account)))
}

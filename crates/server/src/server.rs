use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Error as AxumError, Header},
};

use std::sync::{Arc, RwLock};

use crate::{accounts, cards, rates, transactions, transfers};
use engine::{Engine, RateTable};
use uuid::Uuid;

/// Header carrying the already-authenticated account id. Authentication
/// itself lives in front of this service.
pub static ACCOUNT_ID_HEADER: axum::http::HeaderName =
    axum::http::HeaderName::from_static("account-id");

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    pub rates: Arc<RwLock<RateTable>>,
}

impl ServerState {
    /// Snapshot of the current rate table.
    pub fn rate_snapshot(&self) -> Result<RateTable, crate::ServerError> {
        self.rates
            .read()
            .map(|table| table.clone())
            .map_err(|_| crate::ServerError::Generic("rate table unavailable".to_string()))
    }
}

/// `TypedHeader` for the custom account header.
///
/// Requests to identity-scoped routes must carry an "account-id" entry in
/// the header, holding the account UUID.
#[derive(Debug)]
struct AccountIdHeader(Uuid);

impl Header for AccountIdHeader {
    fn name() -> &'static axum::http::HeaderName {
        &ACCOUNT_ID_HEADER
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, AxumError>
    where
        Self: Sized,
        I: Iterator<Item = &'i axum::http::HeaderValue>,
    {
        let value = values.next().ok_or_else(AxumError::invalid)?;
        let Ok(value) = value.to_str() else {
            return Err(AxumError::invalid());
        };
        let Ok(value) = Uuid::parse_str(value) else {
            return Err(AxumError::invalid());
        };

        Ok(AccountIdHeader(value))
    }

    fn encode<E: Extend<axum::http::HeaderValue>>(&self, values: &mut E) {
        let as_string = self.0.to_string();
        match axum::http::HeaderValue::from_str(&as_string) {
            Ok(value) => values.extend(std::iter::once(value)),
            Err(_) => tracing::error!("failed to encode account-id header"),
        }
    }
}

/// Resolves the viewer's account and injects it into the request.
///
/// An unknown account id is a 404 rather than a 401: the id is assumed to
/// come from an upstream authenticator, so a miss means the account is gone.
async fn identity(
    account_header: TypedHeader<AccountIdHeader>,
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let account = state
        .engine
        .account(account_header.0.0)
        .await
        .map_err(|err| match err {
            engine::EngineError::KeyNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        })?;

    request.extensions_mut().insert(account);
    Ok(next.run(request).await)
}

fn router(state: ServerState) -> Router {
    let identity_scoped = Router::new()
        .route("/account", get(accounts::get))
        .route("/cards", post(cards::card_new).get(cards::list))
        .route("/deposit", post(transfers::deposit))
        .route("/sendMoney", post(transfers::send_money))
        .route("/transferCards", post(transfers::transfer_cards))
        .route("/convert", post(transfers::convert))
        .route("/transactions", get(transactions::list))
        .route_layer(middleware::from_fn_with_state(state.clone(), identity));

    Router::new()
        .route("/accounts", post(accounts::register))
        .route("/rates", get(rates::list))
        .merge(identity_scoped)
        .with_state(state)
}

pub async fn run(engine: Engine, rates: RateTable) {
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:3000").await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind server listener: {err}");
            return;
        }
    };
    if let Err(err) = run_with_listener(engine, rates, listener).await {
        tracing::error!("server failed: {err}");
    }
}

pub async fn run_with_listener(
    engine: Engine,
    rates: RateTable,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    let state = ServerState {
        engine: Arc::new(engine),
        rates: Arc::new(RwLock::new(rates)),
    };

    axum::serve(listener, router(state)).await
}

pub fn spawn_with_listener(
    engine: Engine,
    rates: RateTable,
    listener: tokio::net::TcpListener,
) -> Result<std::net::SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(engine, rates, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}

/// Router over the given state, exposed for in-process tests.
#[doc(hidden)]
pub fn router_for_tests(engine: Engine, rates: RateTable) -> Router {
    router(ServerState {
        engine: Arc::new(engine),
        rates: Arc::new(RwLock::new(rates)),
    })
}

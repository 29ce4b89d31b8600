//! Errors the transfer engine can return.
//!
//! Every variant is recoverable by the caller: the engine classifies bad
//! input and inconsistent state instead of panicking, and the HTTP layer
//! maps each variant onto a status code. Only [`Conflict`] is produced by
//! the engine itself (optimistic-concurrency retries exhausted); the rest
//! come from validation or the store.
//!
//! [`Conflict`]: EngineError::Conflict

use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Self transfer not allowed: {0}")]
    SelfTransferNotAllowed(String),
    #[error("Same card: {0}")]
    SameCard(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Currency mismatch: {0}")]
    CurrencyMismatch(String),
    #[error("Invalid card: {0}")]
    InvalidCard(String),
    #[error("Invalid email: {0}")]
    InvalidEmail(String),
    #[error("Invalid rate table: {0}")]
    InvalidRateTable(String),
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InsufficientFunds(a), Self::InsufficientFunds(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::RecipientNotFound(a), Self::RecipientNotFound(b)) => a == b,
            (Self::Forbidden(a), Self::Forbidden(b)) => a == b,
            (Self::SelfTransferNotAllowed(a), Self::SelfTransferNotAllowed(b)) => a == b,
            (Self::SameCard(a), Self::SameCard(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::CurrencyMismatch(a), Self::CurrencyMismatch(b)) => a == b,
            (Self::InvalidCard(a), Self::InvalidCard(b)) => a == b,
            (Self::InvalidEmail(a), Self::InvalidEmail(b)) => a == b,
            (Self::InvalidRateTable(a), Self::InvalidRateTable(b)) => a == b,
            (Self::InvalidCursor(a), Self::InvalidCursor(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

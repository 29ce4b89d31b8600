//! Pure currency-conversion calculator.
//!
//! All conversions are routed through the USD pivot:
//! `usd = amount / rate_to_usd(from)`, `result = usd * rate_to_usd(to)`.
//! Rounding (half-to-even, 2 decimals) happens exactly once, on the final
//! result; the intermediate pivot value is never rounded so repeated
//! conversions do not accumulate rounding drift.
//!
//! This module is stateless and does no I/O: it only needs the amount, the
//! two currency codes and a [`RateTable`] snapshot.

use crate::{Currency, EngineError, Money, RateTable};

/// Converts `amount` of `from` into `to` using `rates`.
///
/// Returns the converted amount rounded half-to-even to minor units.
/// `from == to` returns the amount unchanged; callers that require distinct
/// currencies enforce that themselves.
pub fn convert(
    amount: Money,
    from: Currency,
    to: Currency,
    rates: &RateTable,
) -> Result<Money, EngineError> {
    if from == to {
        return Ok(amount);
    }

    let rate_from = rates.rate_to_usd(from)?;
    let rate_to = rates.rate_to_usd(to)?;

    // Single expression keeps the pivot value unrounded.
    let result = (amount.minor() as f64) * rate_to / rate_from;
    if !result.is_finite() || result.abs() >= i64::MAX as f64 {
        return Err(EngineError::InvalidAmount(
            "conversion result out of range".to_string(),
        ));
    }

    Ok(Money::new(result.round_ties_even() as i64))
}

/// Effective rate of a finished conversion, `result / amount` in major units.
///
/// Used for display in transaction descriptions.
#[must_use]
pub fn effective_rate(amount: Money, result: Money) -> f64 {
    if amount.is_zero() {
        return 0.0;
    }
    result.minor() as f64 / amount.minor() as f64
}

//! Exchange-rate snapshot consumed by the engine.
//!
//! The engine never fetches rates; an external provider hands it a
//! [`RateTable`] and the table is treated as read-only for the duration of a
//! call. `rate_to_usd` is expressed as *units of the currency per 1 USD*
//! (e.g. `TRY = 34.50` means 1 USD buys 34.50 TRY).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Currency, EngineError};

/// One row of the rate table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    /// Units of this currency per 1 USD. Must be finite and > 0.
    pub rate_to_usd: f64,
    pub display_name: String,
    pub display_symbol: String,
}

/// Immutable snapshot mapping a currency to its rate and display metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    entries: HashMap<Currency, RateEntry>,
}

impl RateTable {
    #[must_use]
    pub fn new(entries: HashMap<Currency, RateEntry>) -> Self {
        Self { entries }
    }

    /// Looks up a validated rate for `currency`.
    ///
    /// A missing, non-finite, zero or negative rate is an
    /// [`EngineError::InvalidRateTable`]: a poisoned snapshot must never
    /// silently produce a conversion.
    pub fn rate_to_usd(&self, currency: Currency) -> Result<f64, EngineError> {
        let entry = self.entries.get(&currency).ok_or_else(|| {
            EngineError::InvalidRateTable(format!("no rate for {}", currency.code()))
        })?;
        if !entry.rate_to_usd.is_finite() || entry.rate_to_usd <= 0.0 {
            return Err(EngineError::InvalidRateTable(format!(
                "non-positive rate for {}: {}",
                currency.code(),
                entry.rate_to_usd
            )));
        }
        Ok(entry.rate_to_usd)
    }

    #[must_use]
    pub fn entry(&self, currency: Currency) -> Option<&RateEntry> {
        self.entries.get(&currency)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Currency, &RateEntry)> {
        self.entries.iter().map(|(currency, entry)| (*currency, entry))
    }

    /// Default snapshot mirroring the upstream provider's seed table.
    ///
    /// Used to seed server state and in tests; a live deployment replaces it
    /// on the provider's refresh interval.
    #[must_use]
    pub fn builtin() -> Self {
        let seed: &[(Currency, f64, &str, &str)] = &[
            (Currency::Usd, 1.0, "US Dollar", "$"),
            (Currency::Eur, 0.92, "Euro", "€"),
            (Currency::Gbp, 0.79, "British Pound", "£"),
            (Currency::Jpy, 149.50, "Japanese Yen", "¥"),
            (Currency::Chf, 0.88, "Swiss Franc", "Fr"),
            (Currency::Cad, 1.35, "Canadian Dollar", "C$"),
            (Currency::Aud, 1.52, "Australian Dollar", "A$"),
            (Currency::Try, 34.50, "Turkish Lira", "₺"),
            (Currency::Cny, 7.24, "Chinese Yuan", "¥"),
            (Currency::Rub, 92.50, "Russian Ruble", "₽"),
            (Currency::Sar, 3.75, "Saudi Riyal", "﷼"),
            (Currency::Aed, 3.67, "UAE Dirham", "د.إ"),
            (Currency::Inr, 83.12, "Indian Rupee", "₹"),
            (Currency::Brl, 4.97, "Brazilian Real", "R$"),
            (Currency::Krw, 1305.50, "South Korean Won", "₩"),
            (Currency::Mxn, 17.15, "Mexican Peso", "$"),
            (Currency::Sek, 10.35, "Swedish Krona", "kr"),
            (Currency::Nok, 10.52, "Norwegian Krone", "kr"),
            (Currency::Dkk, 6.87, "Danish Krone", "kr"),
            (Currency::Pln, 4.02, "Polish Zloty", "zł"),
        ];

        let entries = seed
            .iter()
            .map(|(currency, rate, name, symbol)| {
                (
                    *currency,
                    RateEntry {
                        rate_to_usd: *rate,
                        display_name: (*name).to_string(),
                        display_symbol: (*symbol).to_string(),
                    },
                )
            })
            .collect();

        Self { entries }
    }
}

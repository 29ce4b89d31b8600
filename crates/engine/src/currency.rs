use serde::{Deserialize, Serialize};

use crate::EngineError;

/// ISO-4217 currency code known to the ledger.
///
/// Accounts hold their balance in the local currency ([`Currency::LOCAL`],
/// TRY); cards are denominated in the pivot currency ([`Currency::PIVOT`],
/// USD). All conversions are routed through the pivot.
///
/// The set of variants matches the rate provider's table; a code outside
/// this set is rejected at the boundary rather than carried around as a raw
/// string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Jpy,
    Chf,
    Cad,
    Aud,
    #[default]
    Try,
    Cny,
    Rub,
    Sar,
    Aed,
    Inr,
    Brl,
    Krw,
    Mxn,
    Sek,
    Nok,
    Dkk,
    Pln,
}

impl Currency {
    /// Currency of account balances.
    pub const LOCAL: Currency = Currency::Try;

    /// Pivot currency: card balances are held in it and every conversion is
    /// routed through it.
    pub const PIVOT: Currency = Currency::Usd;

    /// Canonical currency code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Chf => "CHF",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
            Currency::Try => "TRY",
            Currency::Cny => "CNY",
            Currency::Rub => "RUB",
            Currency::Sar => "SAR",
            Currency::Aed => "AED",
            Currency::Inr => "INR",
            Currency::Brl => "BRL",
            Currency::Krw => "KRW",
            Currency::Mxn => "MXN",
            Currency::Sek => "SEK",
            Currency::Nok => "NOK",
            Currency::Dkk => "DKK",
            Currency::Pln => "PLN",
        }
    }

    /// Number of fraction digits used when formatting/parsing amounts.
    #[must_use]
    pub const fn minor_units(self) -> u8 {
        // Every currency in the table is stored with 2 fraction digits,
        // matching the upstream rate provider.
        2
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<&str> for Currency {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            "JPY" => Ok(Currency::Jpy),
            "CHF" => Ok(Currency::Chf),
            "CAD" => Ok(Currency::Cad),
            "AUD" => Ok(Currency::Aud),
            "TRY" => Ok(Currency::Try),
            "CNY" => Ok(Currency::Cny),
            "RUB" => Ok(Currency::Rub),
            "SAR" => Ok(Currency::Sar),
            "AED" => Ok(Currency::Aed),
            "INR" => Ok(Currency::Inr),
            "BRL" => Ok(Currency::Brl),
            "KRW" => Ok(Currency::Krw),
            "MXN" => Ok(Currency::Mxn),
            "SEK" => Ok(Currency::Sek),
            "NOK" => Ok(Currency::Nok),
            "DKK" => Ok(Currency::Dkk),
            "PLN" => Ok(Currency::Pln),
            other => Err(EngineError::CurrencyMismatch(format!(
                "unsupported currency: {other}"
            ))),
        }
    }
}

use crate::error::LookupError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Reference data used by the currency step: how many base-currency units
/// one unit of `currency` is worth.
#[async_trait]
pub trait RateLookup: Send + Sync {
    fn base_currency(&self) -> &str;

    async fn lookup(&self, currency: &str) -> Result<Decimal, LookupError>;
}

/// In-memory rate table. Codes are matched case-insensitively.
#[derive(Debug, Clone)]
pub struct StaticRateTable {
    base: String,
    rates: HashMap<String, Decimal>,
}

impl StaticRateTable {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into().to_ascii_uppercase();
        let mut rates = HashMap::new();
        rates.insert(base.clone(), Decimal::ONE);
        Self { base, rates }
    }

    pub fn with_rate(mut self, currency: &str, rate: Decimal) -> Self {
        self.rates.insert(currency.to_ascii_uppercase(), rate);
        self
    }

    /// Fixed reference rates against USD.
    pub fn usd_defaults() -> Self {
        Self::new("USD")
            .with_rate("EUR", Decimal::new(108, 2))
            .with_rate("GBP", Decimal::new(127, 2))
            .with_rate("CAD", Decimal::new(74, 2))
            .with_rate("AUD", Decimal::new(66, 2))
            .with_rate("JPY", Decimal::new(67, 4))
    }

    /// Parses `CODE=RATE` pairs separated by commas, e.g. `EUR=1.08,GBP=1.27`.
    pub fn parse_pairs(base: &str, pairs: &str) -> Result<Self, String> {
        let mut table = Self::new(base);
        for pair in pairs.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (code, rate) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected CODE=RATE, got '{pair}'"))?;
            let rate: Decimal = rate
                .trim()
                .parse()
                .map_err(|e| format!("invalid rate for {code}: {e}"))?;
            table = table.with_rate(code.trim(), rate);
        }
        Ok(table)
    }
}

#[async_trait]
impl RateLookup for StaticRateTable {
    fn base_currency(&self) -> &str {
        &self.base
    }

    async fn lookup(&self, currency: &str) -> Result<Decimal, LookupError> {
        self.rates
            .get(&currency.to_ascii_uppercase())
            .copied()
            .ok_or_else(|| LookupError::Unavailable {
                key: currency.to_string(),
                reason: "no rate configured".into(),
            })
    }
}

use super::{EventDraft, TransformStep};
use crate::error::TransformError;
use async_trait::async_trait;
use engine_core::connectors::lookup::RateLookup;
use model::core::value::Value;
use rust_decimal::{Decimal, RoundingStrategy};
use std::{str::FromStr, sync::Arc, time::Duration};
use tracing::debug;

const STEP: &str = "currency";

/// Rounds a monetary amount to cents, halves away from zero.
pub(crate) fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts monetary attributes into the lookup's base currency.
///
/// Accepts `"<number> <CCY>"` strings or plain numbers; plain numbers take
/// their currency from the `currency` attribute, else the base currency.
/// Values that do not parse are left as they are.
pub struct CurrencyStep {
    fields: Vec<String>,
    rates: Arc<dyn RateLookup>,
    timeout: Duration,
}

impl CurrencyStep {
    pub fn new(fields: Vec<String>, rates: Arc<dyn RateLookup>, timeout: Duration) -> Self {
        Self {
            fields,
            rates,
            timeout,
        }
    }

    async fn rate(&self, currency: &str) -> Result<Decimal, TransformError> {
        match tokio::time::timeout(self.timeout, self.rates.lookup(currency)).await {
            Ok(Ok(rate)) => Ok(rate),
            Ok(Err(e)) => Err(TransformError::Enrichment {
                step: STEP,
                reason: e.to_string(),
            }),
            Err(_) => Err(TransformError::Enrichment {
                step: STEP,
                reason: format!("rate lookup for {currency} timed out after {:?}", self.timeout),
            }),
        }
    }
}

fn is_currency_code(s: &str) -> bool {
    s.len() == 3 && s.chars().all(|c| c.is_ascii_alphabetic())
}

/// Splits a monetary value into amount and upper-case currency code.
pub fn parse_money(value: &Value, default_currency: &str) -> Option<(Decimal, String)> {
    match value {
        Value::Str(s) => {
            let mut parts = s.split_whitespace();
            let amount = Decimal::from_str(parts.next()?).ok()?;
            let currency = match (parts.next(), parts.next()) {
                (None, _) => default_currency.to_string(),
                (Some(code), None) if is_currency_code(code) => code.to_ascii_uppercase(),
                _ => return None,
            };
            Some((amount, currency))
        }
        Value::Int(_) | Value::Float(_) | Value::Decimal(_) => {
            Some((value.as_decimal()?, default_currency.to_string()))
        }
        _ => None,
    }
}

#[async_trait]
impl TransformStep for CurrencyStep {
    fn name(&self) -> &'static str {
        STEP
    }

    async fn apply(&self, draft: &mut EventDraft) -> Result<(), TransformError> {
        let base = self.rates.base_currency().to_ascii_uppercase();
        let default_currency = draft
            .attributes
            .get("currency")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| is_currency_code(c))
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| base.clone());

        for field in &self.fields {
            let Some((amount, currency)) = draft
                .attributes
                .get(field)
                .and_then(|v| parse_money(v, &default_currency))
            else {
                continue;
            };

            let rate = if currency == base {
                Decimal::ONE
            } else {
                self.rate(&currency).await?
            };
            let Some(converted) = amount.checked_mul(rate).map(round_money) else {
                debug!(field = %field, "Monetary value overflowed during conversion, left as is");
                continue;
            };

            draft
                .attributes
                .insert(field.clone(), Value::Decimal(converted));
            draft
                .attributes
                .insert(format!("{field}_currency"), Value::Str(base.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use engine_core::{connectors::lookup::StaticRateTable, error::LookupError};
    use model::events::EventType;
    use std::collections::BTreeMap;

    struct SlowRates;

    #[async_trait]
    impl RateLookup for SlowRates {
        fn base_currency(&self) -> &str {
            "USD"
        }

        async fn lookup(&self, _currency: &str) -> Result<Decimal, LookupError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Decimal::ONE)
        }
    }

    fn draft_with(attrs: &[(&str, Value)]) -> EventDraft {
        EventDraft {
            event_id: "e1".into(),
            event_type: EventType::Purchase,
            timestamp: Utc::now(),
            user_id: "u1".into(),
            session_id: None,
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
            enrichment: BTreeMap::new(),
            partition_key: None,
        }
    }

    fn step(rates: Arc<dyn RateLookup>) -> CurrencyStep {
        CurrencyStep::new(
            vec!["amount".into(), "product_price".into()],
            rates,
            Duration::from_millis(50),
        )
    }

    fn dec(s: &str) -> Value {
        Value::Decimal(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn parses_money_shapes() {
        assert_eq!(
            parse_money(&Value::from("10 usd"), "EUR"),
            Some((Decimal::from(10), "USD".to_string()))
        );
        assert_eq!(
            parse_money(&Value::Int(4), "EUR"),
            Some((Decimal::from(4), "EUR".to_string()))
        );
        assert_eq!(parse_money(&Value::from("ten dollars"), "USD"), None);
        assert_eq!(parse_money(&Value::from("10 US DOLLARS"), "USD"), None);
        assert_eq!(parse_money(&Value::Bool(true), "USD"), None);
    }

    #[tokio::test]
    async fn converts_to_base_and_rounds() {
        let mut d = draft_with(&[
            ("amount", Value::from("10 USD")),
            ("product_price", Value::Float(19.999)),
            ("currency", Value::from("gbp")),
        ]);
        step(Arc::new(StaticRateTable::usd_defaults()))
            .apply(&mut d)
            .await
            .unwrap();

        assert_eq!(d.attributes["amount"], dec("10.00"));
        assert_eq!(d.attributes["amount_currency"], Value::from("USD"));
        assert_eq!(d.attributes["product_price"], dec("25.40"));
        assert_eq!(d.attributes["product_price_currency"], Value::from("USD"));
    }

    #[test]
    fn money_rounds_half_away_from_zero() {
        let round = |s: &str| round_money(Decimal::from_str(s).unwrap()).to_string();
        assert_eq!(round("0.125"), "0.13");
        assert_eq!(round("0.145"), "0.15");
        assert_eq!(round("-0.125"), "-0.13");
        assert_eq!(round("0.124"), "0.12");
    }

    #[tokio::test]
    async fn converted_halves_round_up() {
        let mut d = draft_with(&[("amount", Value::from("0.125 USD"))]);
        step(Arc::new(StaticRateTable::usd_defaults()))
            .apply(&mut d)
            .await
            .unwrap();
        assert_eq!(d.attributes["amount"], dec("0.13"));
    }

    #[tokio::test]
    async fn unparseable_values_are_untouched() {
        let mut d = draft_with(&[("amount", Value::from("free"))]);
        step(Arc::new(StaticRateTable::usd_defaults()))
            .apply(&mut d)
            .await
            .unwrap();
        assert_eq!(d.attributes["amount"], Value::from("free"));
        assert!(!d.attributes.contains_key("amount_currency"));
    }

    #[tokio::test]
    async fn unknown_currency_is_an_enrichment_failure() {
        let mut d = draft_with(&[("amount", Value::from("3 XYZ"))]);
        let err = step(Arc::new(StaticRateTable::usd_defaults()))
            .apply(&mut d)
            .await
            .unwrap_err();
        assert_eq!(err.step(), "currency");
    }

    #[tokio::test]
    async fn slow_lookups_time_out() {
        let mut d = draft_with(&[("amount", Value::from("3 EUR"))]);
        let err = step(Arc::new(SlowRates)).apply(&mut d).await.unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
    }
}

use once_cell::sync::Lazy;
use porthole_types::TokenUsage;
use regex::Regex;
use rust_decimal::Decimal;

/// Unit prices for one model, per million tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPrices {
    pub input: Decimal,
    pub output: Decimal,
    pub cache_read: Decimal,
    pub cache_write_5m: Decimal,
    pub cache_write_1h: Decimal,
}

/// Price resolution seam. The store implements this over model_prices; tests
/// use a plain map.
pub trait PriceLookup {
    /// Price in effect for `model_id` on `date` (YYYY-MM-DD), or None.
    fn price_for(&self, model_id: &str, date: &str) -> Option<ModelPrices>;
}

static MODEL_DATE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-\d{8}$").unwrap_or_else(|e| panic!("model id regex: {e}")));

/// `claude-opus-4-5-20251101` -> `claude-opus-4-5`. Ids without a trailing
/// date pass through unchanged.
pub fn normalize_model_id(model: &str) -> String {
    MODEL_DATE_SUFFIX.replace(model, "").into_owned()
}

/// Calendar date of an ISO 8601 timestamp, for price selection.
pub fn date_of(timestamp: &str) -> Option<String> {
    let date = timestamp.get(0..10)?;
    let mut parts = date.splitn(3, '-');
    let ok = parts.next().is_some_and(|y| y.len() == 4 && y.chars().all(|c| c.is_ascii_digit()))
        && parts.next().is_some_and(|m| m.len() == 2 && m.chars().all(|c| c.is_ascii_digit()))
        && parts.next().is_some_and(|d| d.len() == 2 && d.chars().all(|c| c.is_ascii_digit()));
    ok.then(|| date.to_string())
}

/// Dollar cost of one request, at 6 fractional digits.
pub fn compute_cost(usage: &TokenUsage, prices: &ModelPrices) -> Decimal {
    let million = Decimal::from(1_000_000u64);
    let term = |tokens: u64, unit: Decimal| Decimal::from(tokens) * unit / million;

    let (write_5m, write_1h) = usage.cache_write_split();
    let total = term(usage.input_tokens, prices.input)
        + term(usage.output_tokens, prices.output)
        + term(usage.cache_read_input_tokens, prices.cache_read)
        + term(write_5m, prices.cache_write_5m)
        + term(write_1h, prices.cache_write_1h);

    total.round_dp(6)
}

//! Lenient numeric decoding shared by the push and REST payloads.
//!
//! The dashboard backend emits numbers as JSON numbers, but proxies and
//! upstream exchanges sometimes stringify them (`"2350.40"`). Both forms are
//! accepted everywhere a price or volume is read.

use serde::{Deserialize, Deserializer, de};

/// Parse a JSON value (string or number) as a finite `f64`.
/// `"nan"` and `"inf"` strings are rejected.
#[inline]
pub fn parse_str_f64(v: Option<&serde_json::Value>) -> Option<f64> {
    let v = v?;
    let parsed = match v.as_str() {
        Some(s) => fast_float2::parse(s.trim()).ok(),
        None => v.as_f64(),
    };
    parsed.filter(|x: &f64| x.is_finite())
}

/// `deserialize_with` adapter: number or numeric string into `f64`.
pub fn de_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let v = serde_json::Value::deserialize(d)?;
    parse_str_f64(Some(&v))
        .ok_or_else(|| de::Error::custom(format!("expected a number or numeric string, got {v}")))
}

/// `deserialize_with` adapter for optional numbers; `null` and absent map to `None`.
pub fn de_opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    match v {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => parse_str_f64(Some(&v))
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("expected a number or numeric string, got {v}"))),
    }
}

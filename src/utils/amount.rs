//! Serde helpers for decimal amounts.
//!
//! Amounts are stored as `NUMERIC` and kept as [`BigDecimal`] in memory, but
//! travel as plain JSON numbers so that processors written against the
//! `float64` wire format keep working.

use bigdecimal::{BigDecimal, Zero};
use serde::{de::Error as _, ser::Error as _, Deserialize, Deserializer, Serializer};

/// Integer digits of the largest finite `f64`. Anything further from one is
/// either infinite or rounds to zero.
const MAX_MAGNITUDE: i64 = 309;

/// Converts to the `f64` sent on the wire, rounding through the decimal
/// string. `None` when a non-zero amount has no finite, non-zero `f64` form.
pub fn to_wire(amount: &BigDecimal) -> Option<f64> {
    if amount.is_zero() {
        return Some(0.0);
    }
    let (_, scale) = amount.as_bigint_and_exponent();
    let magnitude = amount.digits() as i64 - scale;
    if !(-MAX_MAGNITUDE..=MAX_MAGNITUDE).contains(&magnitude) {
        return None;
    }
    amount
        .to_string()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v != 0.0)
}

pub fn serialize<S>(amount: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let value = to_wire(amount)
        .ok_or_else(|| S::Error::custom(format!("amount {} is not representable", amount)))?;
    serializer.serialize_f64(value)
}

/// Accepts JSON numbers and numeric strings.
pub fn deserialize<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(serde_json::Number),
        Text(String),
    }

    let text = match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s,
    };
    text.trim()
        .parse::<BigDecimal>()
        .map_err(|e| D::Error::custom(format!("invalid amount '{}': {}", text, e)))
}

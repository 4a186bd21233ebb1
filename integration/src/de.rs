//! Utilities to assist deserialisation of venue wire formats.
//!
//! Venues quote prices and sizes as decimal strings. The helpers here parse
//! those spans directly into fixed-point raw integers, without routing
//! through an intermediate owned `String` or float.

use arara_markets::{Price, Quantity, FIXED_POINT_SCALE};
use serde::de::{Deserializer, Error as DeError, Visitor};
use std::fmt;

/// Parse a decimal span (eg/ `"42000.51"`, `"-0.003"`) into raw fixed-point
/// units of `10^-8`. Fractional digits beyond the scale are truncated.
pub fn parse_fixed_point(input: &str) -> Option<i64> {
    let bytes = input.as_bytes();
    if bytes.is_empty() {
        return None;
    }

    let (negative, rest) = match bytes[0] {
        b'-' => (true, &bytes[1..]),
        b'+' => (false, &bytes[1..]),
        _ => (false, bytes),
    };
    if rest.is_empty() {
        return None;
    }

    let mut raw: i128 = 0;
    let mut index = 0;
    let mut integer_digits = 0;

    while index < rest.len() && rest[index] != b'.' {
        let digit = rest[index];
        if !digit.is_ascii_digit() {
            return None;
        }
        raw = raw.checked_mul(10)?.checked_add(i128::from(digit - b'0'))?;
        integer_digits += 1;
        index += 1;
    }

    let mut fraction_digits = 0u32;
    if index < rest.len() {
        // Skip the '.'
        index += 1;
        if index == rest.len() && integer_digits == 0 {
            return None;
        }
        while index < rest.len() && fraction_digits < FIXED_POINT_SCALE {
            let digit = rest[index];
            if !digit.is_ascii_digit() {
                return None;
            }
            raw = raw.checked_mul(10)?.checked_add(i128::from(digit - b'0'))?;
            fraction_digits += 1;
            index += 1;
        }
        // Remaining sub-scale digits are truncated, but must still be digits
        while index < rest.len() {
            if !rest[index].is_ascii_digit() {
                return None;
            }
            index += 1;
        }
    }

    if integer_digits == 0 && fraction_digits == 0 {
        return None;
    }

    for _ in fraction_digits..FIXED_POINT_SCALE {
        raw = raw.checked_mul(10)?;
    }
    if negative {
        raw = -raw;
    }

    i64::try_from(raw).ok()
}

struct FixedPointVisitor;

impl Visitor<'_> for FixedPointVisitor {
    type Value = i64;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a decimal string or number")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        parse_fixed_point(value)
            .ok_or_else(|| E::custom(format!("invalid fixed-point decimal: {value}")))
    }

    fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        let scaled = (value * 1e8).round();
        if scaled.is_finite() && (i64::MIN as f64..=i64::MAX as f64).contains(&scaled) {
            Ok(scaled as i64)
        } else {
            Err(E::custom(format!("fixed-point overflow: {value}")))
        }
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        i64::try_from(value)
            .ok()
            .and_then(|raw| raw.checked_mul(100_000_000))
            .ok_or_else(|| E::custom(format!("fixed-point overflow: {value}")))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        value
            .checked_mul(100_000_000)
            .ok_or_else(|| E::custom(format!("fixed-point overflow: {value}")))
    }
}

/// Deserialize a quoted decimal into a [`Price`] without allocating.
pub fn de_price<'de, D>(deserializer: D) -> Result<Price, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer
        .deserialize_any(FixedPointVisitor)
        .map(Price::from_raw)
}

/// Deserialize a quoted decimal into a [`Quantity`] without allocating.
pub fn de_quantity<'de, D>(deserializer: D) -> Result<Quantity, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer
        .deserialize_any(FixedPointVisitor)
        .map(Quantity::from_raw)
}

struct OptFixedPointVisitor;

impl<'de> Visitor<'de> for OptFixedPointVisitor {
    type Value = Option<i64>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("an optional decimal string or number")
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        Ok(None)
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        Ok(None)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(FixedPointVisitor).map(Some)
    }
}

/// Deserialize a nullable decimal into an optional [`Price`].
pub fn de_opt_price<'de, D>(deserializer: D) -> Result<Option<Price>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer
        .deserialize_option(OptFixedPointVisitor)
        .map(|raw| raw.map(Price::from_raw))
}

/// Deserialize a nullable decimal into an optional [`Quantity`].
pub fn de_opt_quantity<'de, D>(deserializer: D) -> Result<Option<Quantity>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer
        .deserialize_option(OptFixedPointVisitor)
        .map(|raw| raw.map(Quantity::from_raw))
}

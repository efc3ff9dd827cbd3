//! Bare and valued options: `wait`, `event_name(dn)`, `result(0)`.

use crate::error::{Error, Result};
use crate::ops::payload;

/// Returns true when `name` occurs anywhere in `text`.
#[must_use]
pub fn get_option(text: &str, name: &str) -> bool {
    text.contains(name)
}

/// Looks up a valued option `name(value)`.
///
/// There are three outcomes: `Err(NotFound)` when `name` does not occur at
/// all, `Ok(None)` when it occurs without a parenthesised value, and
/// `Ok(Some(value))` otherwise. An unterminated value runs to the end of the
/// text.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when `name` is absent.
pub fn get_str_arg(text: &str, name: &str) -> Result<Option<String>> {
    let start = text
        .find(name)
        .ok_or_else(|| Error::NotFound(name.to_string()))?;

    let Some(value) = text[start + name.len()..].strip_prefix('(') else {
        return Ok(None);
    };
    let value = value.find(')').map_or(value, |end| &value[..end]);

    if value.is_empty() {
        Ok(None)
    } else {
        Ok(Some(value.to_string()))
    }
}

/// Reads a numeric option in the given radix.
///
/// A radix of 0 picks the base from the value itself: `0x` prefix for hex,
/// a leading `0` for octal, decimal otherwise. Radix 16 also tolerates a
/// `0x` prefix. A leading sign is accepted.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the option is absent,
/// [`Error::MissingValue`] when it has no value and
/// [`Error::InvalidNumber`] when the value does not parse.
pub fn get_long_arg(text: &str, name: &str, radix: u32) -> Result<i64> {
    let value = get_str_arg(text, name)?.ok_or_else(|| Error::MissingValue(name.to_string()))?;
    parse_signed(&value, radix)
}

/// Reads an unsigned numeric option; see [`get_long_arg`] for radix rules.
///
/// # Errors
///
/// Same as [`get_long_arg`].
pub fn get_unsigned_arg(text: &str, name: &str, radix: u32) -> Result<u64> {
    let value = get_str_arg(text, name)?.ok_or_else(|| Error::MissingValue(name.to_string()))?;
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    parse_digits(digits, radix).ok_or(Error::InvalidNumber { value, radix })
}

/// Reads a hex option. Digits may carry a `0x` prefix.
///
/// # Errors
///
/// Same as [`get_long_arg`].
pub fn get_hex_arg(text: &str, name: &str) -> Result<i64> {
    get_long_arg(text, name, 16)
}

/// Reads a decimal option.
///
/// # Errors
///
/// Same as [`get_long_arg`].
pub fn get_dec_arg(text: &str, name: &str) -> Result<i64> {
    get_long_arg(text, name, 10)
}

/// Reads a numeric option whose base is inferred from its prefix.
///
/// # Errors
///
/// Same as [`get_long_arg`].
pub fn get_numeric_arg(text: &str, name: &str) -> Result<i64> {
    get_long_arg(text, name, 0)
}

/// Appends `option` to a command: `?option` when the payload has no options
/// yet, `,option` otherwise.
#[must_use]
pub fn append_option(text: &str, option: &str) -> String {
    let text = text.trim_end();
    if payload(text).contains('?') {
        format!("{text},{option}")
    } else {
        format!("{text}?{option}")
    }
}

fn parse_signed(value: &str, radix: u32) -> Result<i64> {
    let invalid = || Error::InvalidNumber {
        value: value.to_string(),
        radix,
    };

    let trimmed = value.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let magnitude = parse_digits(digits, radix).ok_or_else(invalid)?;
    let magnitude = i64::try_from(magnitude).map_err(|_| invalid())?;

    Ok(if negative { -magnitude } else { magnitude })
}

fn parse_digits(digits: &str, radix: u32) -> Option<u64> {
    let hex = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"));

    let (radix, digits) = match radix {
        0 => match hex {
            Some(rest) => (16, rest),
            None if digits.len() > 1 && digits.starts_with('0') => (8, &digits[1..]),
            None => (10, digits),
        },
        16 => (16, hex.unwrap_or(digits)),
        2..=36 => (radix, digits),
        _ => return None,
    };

    u64::from_str_radix(digits, radix).ok()
}

//! Descriptors of the form `name.location#offset:extent?options`.

use crate::error::{Error, Result};
use crate::ops::payload;

const TERMINATORS: &[char] = &['.', '?', '=', '/', '#', ':'];

/// A parsed `name.location#offset:extent?options` descriptor.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Descriptor {
    /// Leading name.
    pub name: String,
    /// Location following the first `.`, if any.
    pub location: Option<String>,
    /// Hex offset following `#`, if any.
    pub offset: Option<u64>,
    /// Hex extent following `:`, if any.
    pub extent: Option<u64>,
    /// Raw option text following `?`, if any.
    pub options: Option<String>,
}

/// Returns the location of a dotted `name.location` token.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when there is no `.` or nothing follows it.
pub fn get_location(text: &str) -> Result<String> {
    let text = payload(text);
    let start = text
        .find('.')
        .ok_or_else(|| Error::NotFound("location".to_string()))?;

    non_empty(field(&text[start + 1..]), "location")
}

/// Splits a dotted `name.location` token. A leading `verb://` is skipped.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when either half is missing.
pub fn get_name_location(text: &str) -> Result<(String, String)> {
    let text = payload(text);
    let name = non_empty(field(text), "name")?;

    let location = text[name.len()..]
        .strip_prefix('.')
        .map(field)
        .unwrap_or_default();

    Ok((name, non_empty(location, "location")?))
}

/// Returns the hex extent following the first `:` of the payload.
///
/// # Errors
///
/// Returns [`Error::NotFound`] without a `:` and [`Error::InvalidNumber`]
/// when no hex digits follow it.
pub fn get_extent(text: &str) -> Result<u64> {
    hex_after(payload(text), ':', "extent")
}

/// Returns the hex offset following the first `#` of the payload.
///
/// # Errors
///
/// Returns [`Error::NotFound`] without a `#` and [`Error::InvalidNumber`]
/// when no hex digits follow it.
pub fn get_offset(text: &str) -> Result<u64> {
    hex_after(payload(text), '#', "offset")
}

/// Parses a full descriptor. A leading `verb://` is skipped.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when there is no name, and the errors of
/// [`get_offset`] and [`get_extent`] when `#` or `:` carry no number.
pub fn parse_desc(text: &str) -> Result<Descriptor> {
    let text = payload(text);
    let (head, options) = match text.split_once('?') {
        Some((head, options)) => (head, Some(options.to_string())),
        None => (text, None),
    };

    let name = non_empty(field(head), "name")?;
    let location = head[name.len()..]
        .strip_prefix('.')
        .map(field)
        .filter(|location| !location.is_empty())
        .map(str::to_string);

    let offset = optional(hex_after(head, '#', "offset"))?;
    let extent = optional(hex_after(head, ':', "extent"))?;

    Ok(Descriptor {
        name,
        location,
        offset,
        extent,
        options,
    })
}

fn field(text: &str) -> &str {
    text.find(TERMINATORS).map_or(text, |end| &text[..end])
}

fn non_empty(value: &str, what: &str) -> Result<String> {
    if value.is_empty() {
        Err(Error::NotFound(what.to_string()))
    } else {
        Ok(value.to_string())
    }
}

fn hex_after(text: &str, marker: char, what: &str) -> Result<u64> {
    let start = text
        .find(marker)
        .ok_or_else(|| Error::NotFound(what.to_string()))?;

    let rest = &text[start + marker.len_utf8()..];
    let rest = rest
        .strip_prefix("0x")
        .or_else(|| rest.strip_prefix("0X"))
        .unwrap_or(rest);
    let digits = rest
        .find(|c: char| !c.is_ascii_hexdigit())
        .map_or(rest, |end| &rest[..end]);

    u64::from_str_radix(digits, 16).map_err(|_| Error::InvalidNumber {
        value: rest.to_string(),
        radix: 16,
    })
}

fn optional(value: Result<u64>) -> Result<Option<u64>> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(Error::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

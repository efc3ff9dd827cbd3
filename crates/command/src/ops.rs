//! Splitting whole commands into verb and operands.

use crate::error::{Error, Result};

/// Separates the verb from the payload of a command.
pub const SEPARATOR: &str = "://";

/// A command with a single operand: `cmd://rest`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnaryOp {
    /// The verb.
    pub cmd: String,
    /// Everything after the separator.
    pub rest: String,
}

/// A command with a transfer, a destination and a source:
/// `cmd://xfer/dest=src`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TernaryOp {
    /// The verb.
    pub cmd: String,
    /// The transfer descriptor, up to the first `/`.
    pub xfer: String,
    /// The destination descriptor, up to the following `=`.
    pub dest: String,
    /// The source descriptor, the remainder.
    pub src: String,
}

/// Returns the verb of `text`, the part before the first `://`.
///
/// Text without a separator has no verb.
#[must_use]
pub fn extract_verb(text: &str) -> Option<String> {
    text.find(SEPARATOR).map(|end| text[..end].to_string())
}

/// Returns the payload of `text`: everything after the first `://`, or the
/// whole text when there is no separator.
#[must_use]
pub fn payload(text: &str) -> &str {
    text.find(SEPARATOR)
        .map_or(text, |start| &text[start + SEPARATOR.len()..])
}

/// Splits `cmd://rest`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the text has no `://` separator.
pub fn parse_unary_op(text: &str) -> Result<UnaryOp> {
    let (cmd, rest) = text
        .split_once(SEPARATOR)
        .ok_or_else(|| Error::NotFound(SEPARATOR.to_string()))?;

    Ok(UnaryOp {
        cmd: cmd.to_string(),
        rest: rest.to_string(),
    })
}

/// Splits `cmd://xfer/dest=src`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the separator is missing and
/// [`Error::Malformed`] when the `/` or `=` delimiters are missing.
pub fn parse_ternary_op(text: &str) -> Result<TernaryOp> {
    let UnaryOp { cmd, rest } = parse_unary_op(text)?;

    let (xfer, rest) = rest
        .split_once('/')
        .ok_or_else(|| Error::Malformed(format!("no destination in `{text}`")))?;
    let (dest, src) = rest
        .split_once('=')
        .ok_or_else(|| Error::Malformed(format!("no source in `{text}`")))?;

    Ok(TernaryOp {
        cmd,
        xfer: xfer.to_string(),
        dest: dest.to_string(),
        src: src.to_string(),
    })
}

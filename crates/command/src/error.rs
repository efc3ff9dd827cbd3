use thiserror::Error;

/// Result type for command string parsing.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while picking a command string apart.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// The named field or option does not occur in the text.
    #[error("`{0}` not found")]
    NotFound(String),

    /// The option is present but carries no parenthesised value.
    #[error("option `{0}` has no value")]
    MissingValue(String),

    /// A value could not be read as a number.
    #[error("`{value}` is not a valid base {radix} number")]
    InvalidNumber {
        /// The offending text.
        value: String,
        /// The radix that was attempted (0 means auto-detected).
        radix: u32,
    },

    /// The text does not have the expected shape.
    #[error("malformed command: {0}")]
    Malformed(String),
}

//! Error types for the client library.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::handle::AsyncHandle;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A registry or command table lookup missed.
    #[error("no {kind} named `{name}`")]
    NotFound {
        /// What kind of entry was looked up.
        kind: &'static str,
        /// The name that was not found.
        name: String,
    },

    /// A name is already registered.
    #[error("{kind} `{name}` is already registered")]
    DuplicateName {
        /// What kind of entry was registered.
        kind: &'static str,
        /// The colliding name.
        name: String,
    },

    /// The async handle was destroyed or never allocated.
    #[error("invalid async handle {0}")]
    InvalidHandle(AsyncHandle),

    /// Malformed command text.
    #[error("parse error: {0}")]
    Parse(#[from] vfi_command::Error),

    /// No reply arrived in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Underlying connection failure.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The driver reported a non-zero `result(...)`.
    #[error("driver reported result {0}")]
    Driver(i64),

    /// The device could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        /// The device path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The driver end of the connection went away.
    #[error("device connection closed")]
    Closed,

    /// A pipeline does not match the map counts its function expects.
    #[error(
        "function `{function}` takes {expected_inputs:?} inputs and {expected_outputs:?} outputs, got {actual_inputs} and {actual_outputs}"
    )]
    CountMismatch {
        /// The function name.
        function: String,
        /// Inputs the function expects, `None` for any.
        expected_inputs: Option<usize>,
        /// Inputs supplied.
        actual_inputs: usize,
        /// Outputs the function expects, `None` for any.
        expected_outputs: Option<usize>,
        /// Outputs supplied.
        actual_outputs: usize,
    },

    /// A pipeline was described without any events.
    #[error("pipeline has no events")]
    NoEvents,

    /// A byte range falls outside a map.
    #[error("range {offset:#x}+{extent:#x} is outside map `{map}`")]
    OutOfRange {
        /// The map name.
        map: String,
        /// Start of the range.
        offset: u64,
        /// Length of the range.
        extent: u64,
    },

    /// The map has no memory behind it.
    #[error("map `{0}` is not mapped")]
    Unmapped(String),

    /// The pipeline flag word no longer matches its function.
    #[error("pipeline flag word does not match function `{0}`")]
    CorruptPipeline(String),
}

//! Codec for the textual command protocol spoken by the vfi driver.
//!
//! Commands are single lines of the form `verb://payload`. Payloads carry
//! descriptors (`name.location#offset:extent`) and options, which are either
//! bare words (`wait`) or valued (`event_name(dn)`, `reply(1f)`).
//!
//! Every helper here leaves its input untouched and hands back owned copies.
//! Option lookup is a plain substring search: `wait` also matches inside
//! `waiting_room`. Callers pick option names that cannot collide.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod options;
mod ops;
mod descriptor;

pub use error::{Error, Result};
pub use descriptor::{
    Descriptor, get_extent, get_location, get_name_location, get_offset, parse_desc,
};
pub use ops::{SEPARATOR, TernaryOp, UnaryOp, extract_verb, parse_ternary_op, parse_unary_op, payload};
pub use options::{
    append_option, get_dec_arg, get_hex_arg, get_long_arg, get_numeric_arg, get_option,
    get_str_arg, get_unsigned_arg,
};

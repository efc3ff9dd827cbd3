//! Userspace client for the vfi (formerly rddma) character device.
//!
//! The driver speaks a line protocol: every command is a single
//! `verb://payload` line and every answer is a single line that echoes the
//! verb and carries options such as `result(<n>)`. A [`Session`] owns the
//! open device and offers two ways to talk to it:
//!
//! - [`Session::do_cmd`] writes a command and reads the next line. Only one
//!   caller may use it at a time.
//! - [`Session::request`] tags the command with an [`AsyncHandle`] token and
//!   sleeps until a [`Dispatcher`] thread reads the reply carrying the same
//!   token. Any number of threads may do this concurrently.
//!
//! On top of that the session keeps registries of functions, maps and
//! events, and two [`CommandTable`]s whose handlers run before a command is
//! sent and after its reply comes back. Handlers attach a [`Closure`] to the
//! command's correlator to finish work once the reply is in;
//! [`Session::execute`] drives the whole sequence.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vfi_api::{Dispatcher, Session};
//!
//! fn example() -> vfi_api::Result<()> {
//!     let session = Arc::new(Session::open(None, None)?);
//!     let dispatcher = Dispatcher::spawn(Arc::clone(&session))?;
//!
//!     let reply = session.execute("location_find://loc?wait")?;
//!     println!("{reply}");
//!
//!     dispatcher.shutdown()
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod closure;
mod config;
mod dispatcher;
pub mod error;
mod function;
mod handle;
mod map;
mod pipeline;
mod registry;
mod session;
mod source;
mod table;

#[cfg(test)]
pub(crate) mod testing;

pub use closure::{Closure, Outcome};
pub use config::{DEFAULT_DEVICE, LEGACY_DEVICE, SessionBuilder, SessionConfig};
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use function::{Body, Function};
pub use handle::{AsyncHandle, AsyncHandles, Completion};
pub use map::{AnonymousMapper, DeviceMapper, Map, Mapper};
pub use pipeline::Pipeline;
pub use registry::Registry;
pub use session::Session;
pub use source::{CommandSource, LineSource};
pub use table::{CommandTable, Disposition, Handler};

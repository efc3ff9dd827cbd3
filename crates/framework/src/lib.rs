//! Stock pre-commands for vfi sessions and a loop feeding a session from a
//! command source.
//!
//! [`install`] binds the handlers below into a session's pre-command table.
//! Most of them only attach a [`Closure`](vfi_api::Closure) to the command's
//! correlator so the session can finish the work once the driver has
//! answered. `pipe`, `quit` and `map_init` do their work up front.
//!
//! | verb | effect |
//! |---|---|
//! | `bind_create` | registers the events named by the bind once it succeeds |
//! | `smb_create` | follows up with `smb_mmap` and maps the new buffer |
//! | `smb_mmap` | maps the buffer at the offset the driver returns |
//! | `event_find` | registers the event the driver reports |
//! | `sync_find`, `location_find` | with `wait`, retries until the driver reports success |
//! | `pipe` | compiles a pipeline and starts its event chain |
//! | `quit` | marks the session done |
//! | `map_init` | fills part of a registered map with a 32-bit pattern |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod bind;
mod find;
mod map_init;
mod pipeline;
mod quit;
mod run;
mod smb;

pub use bind::bind_create;
pub use find::{event_find, location_find, sync_find};
pub use map_init::map_init;
pub use pipeline::{PipeSpec, parse_pipe, pipe};
pub use quit::quit;
pub use run::{RunSummary, run};
pub use smb::{smb_create, smb_mmap};

use vfi_api::Session;

/// Binds every stock pre-command into `session`.
pub fn install(session: &Session) {
    session.register_pre_command("bind_create", bind_create);
    session.register_pre_command("smb_create", smb_create);
    session.register_pre_command("smb_mmap", smb_mmap);
    session.register_pre_command("event_find", event_find);
    session.register_pre_command("sync_find", sync_find);
    session.register_pre_command("location_find", location_find);
    session.register_pre_command("pipe", pipe);
    session.register_pre_command("quit", quit);
    session.register_pre_command("map_init", map_init);
}

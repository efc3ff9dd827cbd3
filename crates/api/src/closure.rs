//! Deferred work attached to a correlator and run once its reply arrives.

use tracing::debug;
use vfi_command::{get_dec_arg, get_extent, get_name_location, get_unsigned_arg, payload};

use crate::error::{Error, Result};
use crate::handle::AsyncHandle;
use crate::map::Map;
use crate::pipeline::Pipeline;
use crate::session::Session;

/// What the session should do after a closure has seen a reply.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The command is complete.
    Done,
    /// Send this command next on the same correlator.
    FollowUp(String),
    /// The driver asked to be tried again; carries its result code.
    Retry(i64),
}

/// A unit of deferred work attached to a correlator.
#[derive(Clone, Debug)]
pub enum Closure {
    /// An `smb_create` is in flight; map the buffer under `map_name` once it
    /// exists.
    SmbCreate {
        /// Name to register the map under.
        map_name: String,
    },

    /// An `smb_mmap` is in flight; map `extent` bytes at the offset the
    /// driver returns.
    MmapCreate {
        /// Name to register the map under.
        map_name: String,
        /// Size of the buffer in bytes.
        extent: u64,
    },

    /// A `bind_create` is in flight; register its `(name, location)` events.
    BindCreate {
        /// The events named by the bind.
        events: Vec<(String, String)>,
    },

    /// An `event_find` is in flight; register the event it reports.
    EventFind,

    /// A waiting `sync_find` or `location_find`; retry while the driver
    /// reports a non-zero result.
    AwaitResult,

    /// An `event_start` is in flight; run the pipeline it triggers.
    Pipeline(Pipeline),
}

impl Closure {
    /// Consumes `reply` on behalf of the command that owns `handle`.
    ///
    /// Closures act only on replies reporting success, except
    /// [`AwaitResult`](Self::AwaitResult) which turns failures into retries.
    ///
    /// # Errors
    ///
    /// Returns parse errors for replies missing the fields a closure needs,
    /// and registry, mapping or pipeline errors from the work itself.
    pub fn invoke(&self, session: &Session, handle: AsyncHandle, reply: &str) -> Result<Outcome> {
        if matches!(self, Self::AwaitResult) {
            return Ok(match get_dec_arg(reply, "result") {
                Ok(0) | Err(_) => Outcome::Done,
                Ok(code) => Outcome::Retry(code),
            });
        }

        if Session::driver_result(reply).is_err() {
            return Ok(Outcome::Done);
        }

        match self {
            Self::SmbCreate { map_name } => {
                let smb = payload(reply).split('?').next().unwrap_or_default();
                let extent = get_extent(reply)?;

                session.handles().set_closure(
                    handle,
                    Some(Self::MmapCreate {
                        map_name: map_name.clone(),
                        extent,
                    }),
                )?;

                Ok(Outcome::FollowUp(format!(
                    "smb_mmap://{smb}?map_name({map_name})"
                )))
            }

            Self::MmapCreate { map_name, extent } => {
                let offset = get_unsigned_arg(reply, "mmap_offset", 16)?;
                let region = session.map_region(offset, *extent)?;

                session.register_map(Map::with_region(map_name.clone(), region))?;
                session.handles().set_closure(handle, None)?;
                debug!(map = %map_name, offset, extent, "registered mapped buffer");

                Ok(Outcome::Done)
            }

            Self::BindCreate { events } => {
                for (name, location) in events {
                    keep_existing(session.register_event(name.clone(), location.clone()))?;
                }
                Ok(Outcome::Done)
            }

            Self::EventFind => {
                let (name, location) = get_name_location(reply)?;
                keep_existing(session.register_event(name, location))?;
                Ok(Outcome::Done)
            }

            Self::Pipeline(pipeline) => {
                pipeline.execute()?;
                Ok(Outcome::Done)
            }

            Self::AwaitResult => Ok(Outcome::Done),
        }
    }
}

fn keep_existing(result: Result<()>) -> Result<()> {
    match result {
        Err(Error::DuplicateName { kind, name }) => {
            debug!(%kind, %name, "already registered");
            Ok(())
        }
        other => other,
    }
}

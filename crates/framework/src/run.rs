use std::sync::Arc;

use tracing::{info, warn};
use vfi_api::{CommandSource, Dispatcher, Result, Session};

/// Counts of a [`run`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    /// Commands taken from the source.
    pub executed: usize,
    /// Commands that ended in an error.
    pub failed: usize,
}

/// Executes commands from `source` until it is exhausted or the session is
/// marked done.
///
/// A dispatch loop runs for the duration. Failed commands are logged and
/// counted; they do not stop the run.
///
/// # Errors
///
/// Returns [`vfi_api::Error::Io`] if the dispatch thread cannot be started,
/// and the error that ended the dispatch loop early, if any.
pub fn run<S>(session: &Arc<Session>, source: &mut S) -> Result<RunSummary>
where
    S: CommandSource + ?Sized,
{
    let dispatcher = Dispatcher::spawn(Arc::clone(session))?;
    let mut summary = RunSummary::default();

    while let Some(command) = session.next_command(source) {
        summary.executed += 1;

        match session.execute(&command) {
            Ok(reply) => info!(%command, %reply, "command complete"),
            Err(e) => {
                summary.failed += 1;
                warn!(%command, error = %e, "command failed");
            }
        }
    }

    dispatcher.shutdown()?;

    info!(executed = summary.executed, failed = summary.failed, "run finished");
    Ok(summary)
}

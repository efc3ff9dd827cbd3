//! Background thread draining replies from a session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::session::Session;

/// Runs [`Session::post`] on its own thread until stopped.
///
/// Timeouts and unroutable replies keep the loop going, and so does the
/// session's done flag: requests still in flight get their replies after a
/// `quit`. I/O failure or a closed connection ends it, and the error comes back from
/// [`shutdown`](Self::shutdown). A stop request is noticed when the current
/// read returns, so sessions without a read timeout stop only once the next
/// reply arrives or the connection closes.
#[derive(Debug)]
pub struct Dispatcher {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl Dispatcher {
    /// Starts the dispatch loop for `session`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the thread cannot be spawned.
    pub fn spawn(session: Arc<Session>) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));

        let thread = thread::Builder::new()
            .name("vfi-dispatch".to_string())
            .spawn({
                let stop = Arc::clone(&stop);
                move || run(&session, &stop)
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Whether the loop has ended on its own.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stops the loop and waits for the thread.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the loop, if any.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);

        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
            None => Ok(()),
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            debug!(error = %e, "dispatch loop had failed");
        }
    }
}

fn run(session: &Session, stop: &AtomicBool) -> Result<()> {
    debug!("dispatch loop started");

    while !stop.load(Ordering::SeqCst) {
        match session.post() {
            Ok(()) | Err(Error::Timeout(_) | Error::InvalidHandle(_) | Error::Parse(_)) => {}
            Err(e @ (Error::Io(_) | Error::Closed)) => {
                error!(error = %e, "dispatch loop stopped");
                return Err(e);
            }
            Err(e) => warn!(error = %e, "dispatch error"),
        }
    }

    debug!("dispatch loop finished");
    Ok(())
}

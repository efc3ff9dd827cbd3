//! Verb-keyed handler tables run around driver round-trips.

use std::fmt;
use std::sync::Arc;

use vfi_command::extract_verb;

use crate::error::{Error, Result};
use crate::handle::AsyncHandle;
use crate::session::Session;

/// What the caller should do with a command once its handler has run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Disposition {
    /// Send the (possibly rewritten) command on to the driver.
    Forward,
    /// The handler dealt with the command; do not contact the driver.
    Handled,
}

/// A command handler.
///
/// Receives the session, the correlator of the command in flight and the
/// command text, which it may rewrite in place.
pub type Handler =
    Arc<dyn Fn(&Session, AsyncHandle, &mut String) -> Result<Disposition> + Send + Sync>;

/// An ordered verb to handler table. The most recent registration comes
/// first and the first exact verb match wins.
#[derive(Clone)]
pub struct CommandTable {
    kind: &'static str,
    entries: Vec<(String, Handler)>,
}

impl CommandTable {
    /// Creates an empty table whose errors name entries as `kind`.
    #[must_use]
    pub const fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Binds `handler` to `verb`, shadowing earlier bindings of the same verb.
    pub fn register<F>(&mut self, verb: impl Into<String>, handler: F)
    where
        F: Fn(&Session, AsyncHandle, &mut String) -> Result<Disposition> + Send + Sync + 'static,
    {
        self.entries.insert(0, (verb.into(), Arc::new(handler)));
    }

    /// Removes the binding of `verb` that currently wins lookups.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `verb` is not bound.
    pub fn unregister(&mut self, verb: &str) -> Result<()> {
        let position = self
            .entries
            .iter()
            .position(|(entry, _)| entry == verb)
            .ok_or_else(|| Error::NotFound {
                kind: self.kind,
                name: verb.to_string(),
            })?;

        self.entries.remove(position);
        Ok(())
    }

    /// Returns the handler bound to the verb of `command`.
    #[must_use]
    pub fn lookup(&self, command: &str) -> Option<Handler> {
        let verb = extract_verb(command)?;
        self.entries
            .iter()
            .find(|(entry, _)| *entry == verb)
            .map(|(_, handler)| Arc::clone(handler))
    }

    /// Runs the handler bound to the verb of `command`, if any.
    ///
    /// Without a match the command is left alone and forwarded.
    ///
    /// # Errors
    ///
    /// Returns whatever the handler returns.
    pub fn dispatch(
        &self,
        session: &Session,
        handle: AsyncHandle,
        command: &mut String,
    ) -> Result<Disposition> {
        match self.lookup(command) {
            Some(handler) => handler(session, handle, command),
            None => Ok(Disposition::Forward),
        }
    }

    /// Bound verbs, most recent first.
    pub fn verbs(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(verb, _)| verb.as_str())
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("kind", &self.kind)
            .field("verbs", &self.verbs().collect::<Vec<_>>())
            .finish()
    }
}

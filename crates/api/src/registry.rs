//! Named registries for functions, maps and events.

use crate::error::{Error, Result};

/// An associative store of uniquely named entries.
///
/// Lookups are linear scans; registries hold tens of entries. The newest
/// entry comes first. There is no internal locking, the owning session
/// serializes access.
#[derive(Clone, Debug)]
pub struct Registry<T> {
    kind: &'static str,
    entries: Vec<(String, T)>,
}

impl<T> Registry<T> {
    /// Creates an empty registry whose errors name entries as `kind`.
    #[must_use]
    pub const fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Registers `payload` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateName`] if `name` is already registered.
    pub fn register(&mut self, name: impl Into<String>, payload: T) -> Result<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(Error::DuplicateName {
                kind: self.kind,
                name,
            });
        }

        self.entries.insert(0, (name, payload));
        Ok(())
    }

    /// Returns the entry registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, payload)| payload)
    }

    /// Removes `name` and hands its payload back to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `name` is not registered.
    pub fn unregister(&mut self, name: &str) -> Result<T> {
        let position = self
            .entries
            .iter()
            .position(|(entry, _)| entry == name)
            .ok_or_else(|| self.not_found(name))?;

        Ok(self.entries.remove(position).1)
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names, newest first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn not_found(&self, name: &str) -> Error {
        Error::NotFound {
            kind: self.kind,
            name: name.to_string(),
        }
    }
}

impl<T: Clone> Registry<T> {
    /// Returns a copy of the entry registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `name` is not registered.
    pub fn find(&self, name: &str) -> Result<T> {
        self.get(name).cloned().ok_or_else(|| self.not_found(name))
    }
}

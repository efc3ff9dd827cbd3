//! Session configuration and builder.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::map::{DeviceMapper, Mapper};
use crate::session::Session;

/// Device opened when no path is given.
pub const DEFAULT_DEVICE: &str = "/dev/vfi";

/// Device node of the older driver generation.
pub const LEGACY_DEVICE: &str = "/dev/rddma";

/// Session configuration.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Path of the device node.
    pub device: PathBuf,
    /// How long a read waits for a reply. `None` waits forever.
    pub timeout: Option<Duration>,
    /// How long a correlated request waits for its reply. `None` waits
    /// forever.
    pub wait_timeout: Option<Duration>,
    /// How often a command is re-sent while the driver asks for a retry.
    pub max_retries: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            timeout: Some(Duration::from_secs(1)),
            wait_timeout: None,
            max_retries: 16,
        }
    }
}

/// Builder for creating sessions.
#[derive(Debug)]
pub struct SessionBuilder {
    config: SessionConfig,
    mapper: Box<dyn Mapper>,
}

impl SessionBuilder {
    /// Create a new session builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            mapper: Box::new(DeviceMapper),
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the device node to open.
    #[must_use]
    pub fn device(mut self, device: impl Into<PathBuf>) -> Self {
        self.config.device = device.into();
        self
    }

    /// Set the read timeout. `None` blocks until data arrives.
    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Bound how long correlated requests wait for their reply.
    #[must_use]
    pub const fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = Some(timeout);
        self
    }

    /// Set how often a command is retried.
    #[must_use]
    pub const fn max_retries(mut self, retries: usize) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set how device memory is mapped.
    #[must_use]
    pub fn mapper(mut self, mapper: impl Mapper + 'static) -> Self {
        self.mapper = Box::new(mapper);
        self
    }

    /// Open the configured device read/write and non-blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] if the device cannot be opened.
    pub fn open(self) -> Result<Session> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(nix::libc::O_NONBLOCK)
            .open(&self.config.device)
            .map_err(|source| Error::Open {
                path: self.config.device.clone(),
                source,
            })?;

        debug!(device = %self.config.device.display(), "opened device");
        self.connect(device)
    }

    /// Adopt an already open descriptor instead of opening the device.
    ///
    /// The descriptor should be non-blocking; reads then honour the
    /// configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the descriptor cannot be duplicated.
    pub fn connect(self, device: File) -> Result<Session> {
        Session::from_parts(self.config, device, self.mapper)
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

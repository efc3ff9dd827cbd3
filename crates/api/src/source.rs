//! Where commands come from.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tracing::warn;

/// Supplies command lines one at a time.
pub trait CommandSource {
    /// The next command, or `None` when the source is exhausted.
    fn next_command(&mut self) -> Option<String>;
}

/// Reads commands line by line. Blank lines are skipped.
#[derive(Debug)]
pub struct LineSource<R> {
    reader: R,
}

impl<R: BufRead> LineSource<R> {
    /// Wraps a buffered reader.
    pub const fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl LineSource<BufReader<File>> {
    /// Reads commands from a file.
    ///
    /// # Errors
    ///
    /// Returns the error of opening `path`.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> CommandSource for LineSource<R> {
    fn next_command(&mut self) -> Option<String> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {
                    let command = line.trim_end_matches(['\r', '\n']);
                    if !command.trim().is_empty() {
                        return Some(command.to_string());
                    }
                }
                Err(e) => {
                    warn!(error = %e, "command source failed");
                    return None;
                }
            }
        }
    }
}

impl<S: CommandSource + ?Sized> CommandSource for &mut S {
    fn next_command(&mut self) -> Option<String> {
        (**self).next_command()
    }
}

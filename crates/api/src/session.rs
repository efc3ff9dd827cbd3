//! The device session: connection, registries, command tables and the
//! request/reply primitives built on them.

use std::fs::File;
use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use memmap2::MmapMut;
use nix::errno::Errno;
use nix::libc::c_int;
use nix::poll::{PollFd, PollFlags, poll};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, instrument, trace, warn};
use vfi_command::{append_option, get_dec_arg, get_unsigned_arg};

use crate::closure::Outcome;
use crate::config::{SessionBuilder, SessionConfig};
use crate::error::{Error, Result};
use crate::function::Function;
use crate::handle::{AsyncHandle, AsyncHandles};
use crate::map::{Map, Mapper};
use crate::registry::Registry;
use crate::source::CommandSource;
use crate::table::{CommandTable, Disposition, Handler};

/// An open connection to the driver plus everything registered on it.
///
/// A session is shared between threads by reference or `Arc`. One thread
/// runs the dispatch loop ([`post`](Self::post)) while any number of others
/// issue correlated requests. [`do_cmd`](Self::do_cmd) reads its own reply
/// and must not overlap with any other traffic on the same session.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    device: File,
    reader: Mutex<LineReader>,
    writer: Mutex<File>,
    done: AtomicBool,
    handles: AsyncHandles,
    functions: RwLock<Registry<Function>>,
    maps: RwLock<Registry<Arc<Map>>>,
    events: RwLock<Registry<String>>,
    pre_commands: RwLock<CommandTable>,
    post_commands: RwLock<CommandTable>,
    mapper: Box<dyn Mapper>,
}

/// The read side of the connection plus any line not yet terminated.
#[derive(Debug)]
struct LineReader {
    reader: BufReader<File>,
    partial: Vec<u8>,
}

impl Session {
    /// Create a new session builder.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Opens `path`, or the default device, with the given read timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] if the device cannot be opened.
    pub fn open(path: Option<&Path>, timeout: Option<Duration>) -> Result<Self> {
        let builder = Self::builder().timeout(timeout);
        match path {
            Some(path) => builder.device(path).open(),
            None => builder.open(),
        }
    }

    pub(crate) fn from_parts(
        config: SessionConfig,
        device: File,
        mapper: Box<dyn Mapper>,
    ) -> Result<Self> {
        let reader = LineReader {
            reader: BufReader::new(device.try_clone()?),
            partial: Vec::new(),
        };
        let writer = device.try_clone()?;

        Ok(Self {
            config,
            device,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            done: AtomicBool::new(false),
            handles: AsyncHandles::new(),
            functions: RwLock::new(Registry::new("function")),
            maps: RwLock::new(Registry::new("map")),
            events: RwLock::new(Registry::new("event")),
            pre_commands: RwLock::new(CommandTable::new("pre-command")),
            post_commands: RwLock::new(CommandTable::new("post-command")),
            mapper,
        })
    }

    /// Closes the connection.
    pub fn close(self) {
        debug!(fd = self.fileno(), live_handles = self.handles.live_count(), "closing session");
    }

    /// The configuration the session was opened with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The correlator table of this session.
    #[must_use]
    pub const fn handles(&self) -> &AsyncHandles {
        &self.handles
    }

    /// The raw descriptor of the device.
    #[must_use]
    pub fn fileno(&self) -> RawFd {
        self.device.as_raw_fd()
    }

    /// Writes `text` as one line. Returns the number of bytes written,
    /// newline included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on write failure, [`Error::Closed`] if the
    /// driver stopped accepting data and [`Error::Timeout`] if it stays
    /// unwritable past the read timeout. Once part of the line is written
    /// the rest is waited for without a deadline, so a timeout never leaves
    /// half a command on the wire.
    pub fn send(&self, text: &str) -> Result<usize> {
        let line = format!("{}\n", text.trim_end_matches(['\r', '\n']));
        let bytes = line.as_bytes();

        let mut writer = self.writer.lock();
        let mut written = 0;
        while written < bytes.len() {
            match writer.write(&bytes[written..]) {
                Ok(0) => return Err(Error::Closed),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    let timeout = if written == 0 { self.config.timeout } else { None };
                    Self::poll_ready(&*writer, PollFlags::POLLOUT, timeout)?;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        writer.flush()?;

        trace!(command = %line.trim_end(), "sent");
        Ok(written)
    }

    /// Reads one reply line, without its line terminator.
    ///
    /// While no data is ready the descriptor is polled, bounded by the
    /// configured timeout. Bytes of a line cut short by a timeout are kept
    /// and the next call picks up where this one stopped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] when nothing arrives in time,
    /// [`Error::Closed`] at end of stream and [`Error::Io`] otherwise.
    pub fn recv(&self) -> Result<String> {
        let mut guard = self.reader.lock();
        let LineReader { reader, partial } = &mut *guard;

        loop {
            match reader.read_until(b'\n', partial) {
                Ok(0) if partial.is_empty() => return Err(Error::Closed),
                Ok(0) => break,
                Ok(_) if partial.ends_with(b"\n") => break,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    Self::poll_ready(reader.get_ref(), PollFlags::POLLIN, self.config.timeout)?;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        let line = std::mem::take(partial);
        drop(guard);

        let reply = String::from_utf8(line)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        let reply = reply.trim_end_matches(['\r', '\n']).to_string();

        trace!(%reply, "received");
        Ok(reply)
    }

    /// Sends `text` and reads the reply on the calling thread.
    ///
    /// Only safe while nothing else talks on this session, the dispatch
    /// loop included.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`send`](Self::send) and [`recv`](Self::recv),
    /// and [`Error::Driver`] when the reply carries a non-zero result.
    #[instrument(skip(self))]
    pub fn do_cmd(&self, text: &str) -> Result<String> {
        self.send(text)?;
        let reply = self.recv()?;
        Self::driver_result(&reply)?;
        Ok(reply)
    }

    /// Sends `text` without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub fn invoke_cmd(&self, text: &str) -> Result<usize> {
        self.send(text)
    }

    /// Reads one reply and hands it to the correlator named by its
    /// `reply(<token>)` option.
    ///
    /// Replies without a token, or for a correlator that is gone, are
    /// dropped with a warning and reported as an error.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`recv`](Self::recv), [`Error::Parse`] for a
    /// missing or malformed token and [`Error::InvalidHandle`] for a dead
    /// correlator.
    pub fn post(&self) -> Result<()> {
        let reply = self.recv()?;

        let token = match get_unsigned_arg(&reply, "reply", 16) {
            Ok(token) => token,
            Err(e) => {
                warn!(%reply, error = %e, "discarding reply without a correlation token");
                return Err(e.into());
            }
        };

        self.handles.deliver(token, reply).inspect_err(|_| {
            warn!(token = %AsyncHandle::from_token(token), "discarding reply for a dead handle");
        })
    }

    /// Sends `text` tagged with `handle` and waits for the dispatch loop to
    /// deliver the matching reply.
    ///
    /// # Errors
    ///
    /// Returns send and wait errors, and [`Error::Driver`] when the reply
    /// carries a non-zero result.
    #[instrument(skip(self))]
    pub fn request(&self, handle: AsyncHandle, text: &str) -> Result<String> {
        let reply = self.exchange(handle, text)?;
        Self::driver_result(&reply)?;
        Ok(reply)
    }

    /// Runs one command through the full client pipeline.
    ///
    /// Pre-commands run first and may rewrite the command or handle it
    /// outright, in which case the rewritten text comes back without the
    /// driver being contacted. Otherwise the command is sent on a fresh
    /// correlator, the attached closure consumes the reply, post-commands
    /// run on it, and the closure's [`Outcome`] decides whether another
    /// command follows on the same correlator.
    ///
    /// # Errors
    ///
    /// Returns the first error of any stage, and [`Error::Driver`] when the
    /// final reply carries a non-zero result or retries run out.
    #[instrument(skip(self))]
    pub fn execute(&self, text: &str) -> Result<String> {
        let handle = self.handles.alloc(None);
        let result = self.execute_on(handle, text);
        self.handles.put(handle)?;
        result
    }

    fn execute_on(&self, handle: AsyncHandle, text: &str) -> Result<String> {
        let mut command = text.trim_end().to_string();
        if self.run_pre_commands(handle, &mut command)? == Disposition::Handled {
            debug!(%command, "handled without the driver");
            return Ok(command);
        }

        let mut retries = 0;
        loop {
            let mut reply = self.exchange(handle, &command)?;

            let outcome = match self.handles.closure(handle)? {
                Some(closure) if !self.is_done() => closure.invoke(self, handle, &reply)?,
                _ => Outcome::Done,
            };

            self.run_post_commands(handle, &mut reply)?;

            match outcome {
                Outcome::Done => {
                    Self::driver_result(&reply)?;
                    return Ok(reply);
                }
                Outcome::FollowUp(next) => {
                    debug!(%next, "following up");
                    command = next;
                }
                Outcome::Retry(code) => {
                    retries += 1;
                    if retries > self.config.max_retries {
                        warn!(%command, code, "giving up after retries");
                        return Err(Error::Driver(code));
                    }
                    debug!(%command, code, retries, "retrying");
                }
            }
        }
    }

    fn exchange(&self, handle: AsyncHandle, text: &str) -> Result<String> {
        let command = append_option(text, &handle.request_option());
        self.invoke_cmd(&command)?;

        let completion = match self.config.wait_timeout {
            Some(timeout) => self.handles.wait_timeout(handle, timeout)?,
            None => self.handles.wait(handle)?,
        };
        Ok(completion.reply)
    }

    /// Reads the `result(<n>)` option of a reply. A missing option counts as
    /// success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Driver`] for a non-zero result and [`Error::Parse`]
    /// when the value is not a number.
    pub fn driver_result(reply: &str) -> Result<()> {
        match get_dec_arg(reply, "result") {
            Ok(0) | Err(vfi_command::Error::NotFound(_)) => Ok(()),
            Ok(code) => Err(Error::Driver(code)),
            Err(e) => Err(e.into()),
        }
    }

    /// Marks the session done; command sources stop yielding.
    pub fn set_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    /// Whether the session has been marked done.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Pulls the next command from `source`, or `None` once the session is
    /// done.
    pub fn next_command<S>(&self, source: &mut S) -> Option<String>
    where
        S: CommandSource + ?Sized,
    {
        if self.is_done() {
            return None;
        }
        source.next_command()
    }

    /// Maps `extent` bytes of device memory at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the mapping fails.
    pub fn map_region(&self, offset: u64, extent: u64) -> Result<MmapMut> {
        let extent = usize::try_from(extent)
            .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
        Ok(self.mapper.map_region(&self.device, offset, extent)?)
    }

    /// Registers a function under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateName`] if the name is taken.
    pub fn register_function(&self, function: Function) -> Result<()> {
        let name = function.name().to_string();
        self.functions.write().register(name, function)
    }

    /// Looks up a function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such function is registered.
    pub fn find_function(&self, name: &str) -> Result<Function> {
        self.functions.read().find(name)
    }

    /// Removes a function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such function is registered.
    pub fn unregister_function(&self, name: &str) -> Result<Function> {
        self.functions.write().unregister(name)
    }

    /// Registers a map under its own name; the session keeps it until it is
    /// unregistered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateName`] if the name is taken.
    pub fn register_map(&self, map: Map) -> Result<()> {
        let name = map.name().to_string();
        self.maps.write().register(name, Arc::new(map))
    }

    /// Looks up a map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such map is registered.
    pub fn find_map(&self, name: &str) -> Result<Arc<Map>> {
        self.maps.read().find(name)
    }

    /// Removes a map and hands it back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such map is registered.
    pub fn unregister_map(&self, name: &str) -> Result<Arc<Map>> {
        self.maps.write().unregister(name)
    }

    /// Registers an event with its driver location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateName`] if the name is taken.
    pub fn register_event(&self, name: impl Into<String>, location: impl Into<String>) -> Result<()> {
        let name = name.into();
        let location = location.into();
        debug!(%name, %location, "registering event");
        self.events.write().register(name, location)
    }

    /// Looks up the location of an event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such event is registered.
    pub fn find_event(&self, name: &str) -> Result<String> {
        self.events.read().find(name)
    }

    /// Removes an event and returns its location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such event is registered.
    pub fn unregister_event(&self, name: &str) -> Result<String> {
        self.events.write().unregister(name)
    }

    /// Binds a pre-command to `verb`.
    pub fn register_pre_command<F>(&self, verb: impl Into<String>, handler: F)
    where
        F: Fn(&Self, AsyncHandle, &mut String) -> Result<Disposition> + Send + Sync + 'static,
    {
        self.pre_commands.write().register(verb, handler);
    }

    /// Unbinds the pre-command of `verb`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `verb` is not bound.
    pub fn unregister_pre_command(&self, verb: &str) -> Result<()> {
        self.pre_commands.write().unregister(verb)
    }

    /// Binds a post-command to `verb`.
    pub fn register_post_command<F>(&self, verb: impl Into<String>, handler: F)
    where
        F: Fn(&Self, AsyncHandle, &mut String) -> Result<Disposition> + Send + Sync + 'static,
    {
        self.post_commands.write().register(verb, handler);
    }

    /// Unbinds the post-command of `verb`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `verb` is not bound.
    pub fn unregister_post_command(&self, verb: &str) -> Result<()> {
        self.post_commands.write().unregister(verb)
    }

    /// The pre-command bound to the verb of `command`.
    #[must_use]
    pub fn pre_command(&self, command: &str) -> Option<Handler> {
        self.pre_commands.read().lookup(command)
    }

    /// Runs the pre-command table on `command`.
    ///
    /// The table is snapshotted first, so handlers may register or
    /// unregister commands themselves.
    ///
    /// # Errors
    ///
    /// Returns whatever the handler returns.
    pub fn run_pre_commands(&self, handle: AsyncHandle, command: &mut String) -> Result<Disposition> {
        let table = self.pre_commands.read().clone();
        table.dispatch(self, handle, command)
    }

    /// Runs the post-command table on `reply`.
    ///
    /// # Errors
    ///
    /// Returns whatever the handler returns.
    pub fn run_post_commands(&self, handle: AsyncHandle, reply: &mut String) -> Result<Disposition> {
        let table = self.post_commands.read().clone();
        table.dispatch(self, handle, reply)
    }

    fn poll_ready(fd: &impl AsFd, flags: PollFlags, timeout: Option<Duration>) -> Result<()> {
        let millis: c_int = timeout.map_or(-1, |timeout| {
            c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX)
        });

        loop {
            let mut fds = [PollFd::new(fd, flags)];
            match poll(&mut fds, millis) {
                Ok(0) => return Err(Error::Timeout(timeout.unwrap_or_default())),
                Ok(_) => return Ok(()),
                Err(Errno::EINTR) => {}
                Err(errno) => return Err(io::Error::from(errno).into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{BufRead, BufReader, Write};
    use std::time::Instant;

    use assert_matches::assert_matches;
    use tracing_test::traced_test;

    use crate::testing;

    #[test]
    fn test_recv_times_out() {
        let (session, _driver) = testing::session();

        let start = Instant::now();
        assert_matches!(session.recv(), Err(Error::Timeout(t)) if t == Duration::from_millis(50));
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_recv_reports_closed_peer() {
        let (session, driver) = testing::session();
        drop(driver);

        assert_matches!(session.recv(), Err(Error::Closed));
    }

    #[test]
    fn test_send_appends_single_newline() {
        let (session, driver) = testing::session();

        assert_eq!(session.send("location_find://loc\n").unwrap(), 20);

        let mut line = String::new();
        BufReader::new(driver).read_line(&mut line).unwrap();
        assert_eq!(line, "location_find://loc\n");
    }

    #[test]
    fn test_send_finishes_a_partly_written_line() {
        let (session, driver) = testing::session();
        let command = format!("smb_create://{}", "x".repeat(4 << 20));

        let reader = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            let mut line = String::new();
            BufReader::new(driver).read_line(&mut line).unwrap();
            line
        });

        assert_eq!(session.send(&command).unwrap(), command.len() + 1);
        assert_eq!(reader.join().unwrap(), format!("{command}\n"));
    }

    #[test]
    fn test_do_cmd_round_trip_and_driver_error() {
        let (session, mut driver) = testing::session();

        driver.write_all(b"event_find://done.loc1?result(0)\r\n").unwrap();
        assert_eq!(
            session.do_cmd("event_find://done").unwrap(),
            "event_find://done.loc1?result(0)"
        );

        driver.write_all(b"event_find://nope?result(-2)\n").unwrap();
        assert_matches!(session.do_cmd("event_find://nope"), Err(Error::Driver(-2)));
    }

    #[test]
    fn test_recv_joins_partial_lines() {
        let (session, mut driver) = testing::session();

        driver.write_all(b"smb_create://a").unwrap();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            driver.write_all(b".b?result(0)\n").unwrap();
            driver
        });

        assert_eq!(session.recv().unwrap(), "smb_create://a.b?result(0)");
        writer.join().unwrap();
    }

    #[test]
    fn test_driver_result() {
        Session::driver_result("x://y").unwrap();
        Session::driver_result("x://y?result(0)").unwrap();
        assert_matches!(Session::driver_result("x://y?result(5)"), Err(Error::Driver(5)));
        assert_matches!(
            Session::driver_result("x://y?result(oops)"),
            Err(Error::Parse(vfi_command::Error::InvalidNumber { .. }))
        );
        assert_matches!(
            Session::driver_result("x://y?result"),
            Err(Error::Parse(vfi_command::Error::MissingValue(_)))
        );
    }

    #[test]
    #[traced_test]
    fn test_post_discards_unroutable_replies() {
        let (session, mut driver) = testing::session();

        driver.write_all(b"event_start://a.b?result(0)\n").unwrap();
        assert_matches!(session.post(), Err(Error::Parse(_)));

        driver.write_all(b"event_start://a.b?reply(2a00000000)\n").unwrap();
        assert_matches!(session.post(), Err(Error::InvalidHandle(_)));

        assert!(logs_contain("discarding reply for a dead handle"));
    }

    #[test]
    fn test_post_delivers_to_handle() {
        let (session, mut driver) = testing::session();
        let handle = session.handles().alloc(None);

        writeln!(driver, "event_start://a.b?reply({handle}),result(0)").unwrap();
        session.post().unwrap();

        let completion = session.handles().wait(handle).unwrap();
        assert_eq!(completion.reply, format!("event_start://a.b?reply({handle}),result(0)"));
        session.handles().put(handle).unwrap();
    }

    #[test]
    fn test_reply_split_by_a_timeout_still_delivers() {
        let (session, mut driver) = testing::session();
        let handle = session.handles().alloc(None);

        driver.write_all(b"event_start://a.b?re").unwrap();
        assert_matches!(session.post(), Err(Error::Timeout(_)));

        writeln!(driver, "ply({handle}),result(0)").unwrap();
        session.post().unwrap();

        let completion = session
            .handles()
            .wait_timeout(handle, Duration::from_secs(1))
            .unwrap();
        assert_eq!(completion.reply, format!("event_start://a.b?reply({handle}),result(0)"));
        session.handles().put(handle).unwrap();
    }

    #[test]
    fn test_next_command_stops_when_done() {
        let (session, _driver) = testing::session();
        let mut source = crate::source::LineSource::new("a://b\nquit://\n".as_bytes());

        assert_eq!(session.next_command(&mut source).as_deref(), Some("a://b"));
        session.set_done();
        assert_eq!(session.next_command(&mut source), None);
    }

    #[test]
    fn test_registries() {
        let (session, _driver) = testing::session();

        session.register_map(Map::new("in1", 0x100)).unwrap();
        assert_matches!(
            session.register_map(Map::new("in1", 0x200)),
            Err(Error::DuplicateName { kind: "map", .. })
        );
        assert_eq!(session.find_map("in1").unwrap().extent(), 0x100);

        let map = session.unregister_map("in1").unwrap();
        assert_eq!(map.name(), "in1");
        assert_matches!(session.find_map("in1"), Err(Error::NotFound { kind: "map", .. }));

        session
            .register_function(Function::new("scale", Some(1), Some(1), |_, _| Ok(())))
            .unwrap();
        assert_eq!(session.find_function("scale").unwrap().inputs(), Some(1));
        session.unregister_function("scale").unwrap();
        assert_matches!(session.find_function("scale"), Err(Error::NotFound { .. }));
    }
}

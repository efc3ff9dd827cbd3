#![allow(dead_code)]

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use vfi_api::{AnonymousMapper, Dispatcher, Session, SessionBuilder};
use vfi_command::{append_option, get_str_arg};

/// Builder preset used by the tests: short read timeout, anonymous memory.
pub fn builder() -> SessionBuilder {
    Session::builder()
        .timeout(Some(Duration::from_millis(50)))
        .mapper(AnonymousMapper)
}

/// Connects a session built by `builder` to one end of a socket pair.
pub fn connect(builder: SessionBuilder) -> (Session, UnixStream) {
    let (client, driver) = UnixStream::pair().unwrap();
    client.set_nonblocking(true).unwrap();

    let session = builder.connect(File::from(OwnedFd::from(client))).unwrap();
    (session, driver)
}

/// A session with the stock pre-commands installed, a driver answering with
/// `respond` and a running dispatch loop.
pub fn start<F>(builder: SessionBuilder, respond: F) -> (Arc<Session>, FakeDriver, Dispatcher)
where
    F: FnMut(&str) -> Vec<String> + Send + 'static,
{
    let (session, stream) = connect(builder);
    vfi_framework::install(&session);

    let session = Arc::new(session);
    let driver = FakeDriver::spawn(stream, respond);
    let dispatcher = Dispatcher::spawn(Arc::clone(&session)).unwrap();

    (session, driver, dispatcher)
}

/// `body` with the correlation token of `command` added as `reply(...)`.
pub fn reply_to(command: &str, body: &str) -> String {
    match get_str_arg(command, "request") {
        Ok(Some(token)) => append_option(body, &format!("reply({token})")),
        _ => body.to_string(),
    }
}

/// Echoes `command` with `options` added and its correlation token turned
/// into a `reply(...)` option.
pub fn answer(command: &str, options: &str) -> String {
    reply_to(command, &append_option(command, options))
}

/// A driver stand-in answering command lines on a background thread.
pub struct FakeDriver {
    commands: Arc<Mutex<Vec<String>>>,
    thread: Option<JoinHandle<()>>,
}

impl FakeDriver {
    /// Serves `stream`, writing whatever `respond` returns for each line.
    pub fn spawn<F>(stream: UnixStream, mut respond: F) -> Self
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        let commands = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&commands);

        let thread = thread::spawn(move || {
            let mut writer = stream.try_clone().unwrap();
            for line in BufReader::new(stream).lines() {
                let Ok(line) = line else { break };
                seen.lock().push(line.clone());

                for reply in respond(&line) {
                    if writeln!(writer, "{reply}").is_err() {
                        return;
                    }
                }
            }
        });

        Self {
            commands,
            thread: Some(thread),
        }
    }

    /// Answers every command with `result(0)`.
    pub fn succeeding(stream: UnixStream) -> Self {
        Self::spawn(stream, |line| vec![answer(line, "result(0)")])
    }

    /// Commands received so far.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Waits until at least `count` commands have arrived.
    pub fn wait_for(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.commands.lock().len() < count {
            assert!(Instant::now() < deadline, "driver saw {:?}", self.commands());
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Waits for the session side to hang up and returns every command
    /// received.
    pub fn join(mut self) -> Vec<String> {
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap();
        }
        self.commands()
    }
}

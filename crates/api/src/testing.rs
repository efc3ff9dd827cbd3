use std::fs::File;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::map::AnonymousMapper;
use crate::session::Session;

/// A session talking to the returned socket instead of a device.
pub fn session() -> (Session, UnixStream) {
    let (client, driver) = UnixStream::pair().unwrap();
    client.set_nonblocking(true).unwrap();

    let session = Session::builder()
        .timeout(Some(Duration::from_millis(50)))
        .mapper(AnonymousMapper)
        .connect(File::from(OwnedFd::from(client)))
        .unwrap();

    (session, driver)
}

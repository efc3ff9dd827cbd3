mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;
use vfi_api::{Closure, Disposition, Dispatcher, Error};

use common::{FakeDriver, answer};

#[test]
fn test_execute_round_trip() {
    let (session, stream) = common::connect(common::builder());
    let session = Arc::new(session);
    let driver = FakeDriver::succeeding(stream);
    let dispatcher = Dispatcher::spawn(Arc::clone(&session)).unwrap();

    let reply = session.execute("location_find://loc").unwrap();

    assert!(reply.starts_with("location_find://loc?request("));
    assert!(reply.contains("result(0)"));
    assert_eq!(session.handles().live_count(), 0);
    assert_eq!(driver.commands().len(), 1);

    dispatcher.shutdown().unwrap();
}

#[test]
fn test_execute_surfaces_driver_error() {
    let (session, stream) = common::connect(common::builder());
    let session = Arc::new(session);
    let _driver = FakeDriver::spawn(stream, |line| vec![answer(line, "result(-5)")]);
    let dispatcher = Dispatcher::spawn(Arc::clone(&session)).unwrap();

    assert_matches!(session.execute("event_find://nope"), Err(Error::Driver(-5)));
    assert_eq!(session.handles().live_count(), 0);

    dispatcher.shutdown().unwrap();
}

#[test]
fn test_replies_routed_by_token_not_order() {
    let (session, stream) = common::connect(common::builder());
    let session = Arc::new(session);

    let mut held = None;
    let driver = FakeDriver::spawn(stream, move |line| {
        if line.starts_with("first://") {
            held = Some(answer(line, "result(0),which(first)"));
            Vec::new()
        } else {
            let mut replies = vec![answer(line, "result(0),which(second)")];
            replies.extend(held.take());
            replies
        }
    });
    let dispatcher = Dispatcher::spawn(Arc::clone(&session)).unwrap();

    let first = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            let handle = session.handles().alloc(None);
            let reply = session.request(handle, "first://a");
            session.handles().put(handle).unwrap();
            reply
        })
    };
    driver.wait_for(1);

    let handle = session.handles().alloc(None);
    let second = session.request(handle, "second://b").unwrap();
    session.handles().put(handle).unwrap();

    assert!(second.contains("which(second)"));
    assert!(first.join().unwrap().unwrap().contains("which(first)"));
    assert_eq!(session.handles().live_count(), 0);

    dispatcher.shutdown().unwrap();
}

#[test]
fn test_retry_until_success() {
    let (session, stream) = common::connect(common::builder());
    let session = Arc::new(session);

    let mut attempts = 0;
    let driver = FakeDriver::spawn(stream, move |line| {
        attempts += 1;
        let result = if attempts < 3 { "result(-11)" } else { "result(0)" };
        vec![answer(line, result)]
    });
    let dispatcher = Dispatcher::spawn(Arc::clone(&session)).unwrap();

    session.register_pre_command("sync_find", |session, handle, _command| {
        session.handles().set_closure(handle, Some(Closure::AwaitResult))?;
        Ok(Disposition::Forward)
    });

    let reply = session.execute("sync_find://s.l?wait").unwrap();

    assert!(reply.contains("result(0)"));
    assert_eq!(driver.commands().len(), 3);

    dispatcher.shutdown().unwrap();
}

#[test]
fn test_retries_run_out() {
    let (session, stream) = common::connect(common::builder().max_retries(1));
    let session = Arc::new(session);
    let driver = FakeDriver::spawn(stream, |line| vec![answer(line, "result(-11)")]);
    let dispatcher = Dispatcher::spawn(Arc::clone(&session)).unwrap();

    session.register_pre_command("sync_find", |session, handle, _command| {
        session.handles().set_closure(handle, Some(Closure::AwaitResult))?;
        Ok(Disposition::Forward)
    });

    assert_matches!(session.execute("sync_find://s.l?wait"), Err(Error::Driver(-11)));
    assert_eq!(driver.commands().len(), 2);
    assert_eq!(session.handles().live_count(), 0);

    dispatcher.shutdown().unwrap();
}

#[test]
fn test_handled_pre_command_skips_driver() {
    let (session, stream) = common::connect(common::builder());
    let driver = FakeDriver::succeeding(stream);

    session.register_pre_command("quit", |session, _handle, _command| {
        session.set_done();
        Ok(Disposition::Handled)
    });

    assert_eq!(session.execute("quit://").unwrap(), "quit://");
    assert!(session.is_done());

    drop(session);
    driver.join();
}

#[test]
fn test_quit_leaves_in_flight_requests_answered() {
    let builder = common::builder().wait_timeout(Duration::from_secs(2));
    let (session, stream) = common::connect(builder);
    let session = Arc::new(session);
    let driver = FakeDriver::spawn(stream, |line| {
        thread::sleep(Duration::from_millis(100));
        vec![answer(line, "result(0)")]
    });
    let dispatcher = Dispatcher::spawn(Arc::clone(&session)).unwrap();

    session.register_pre_command("quit", |session, _handle, _command| {
        session.set_done();
        Ok(Disposition::Handled)
    });

    let worker = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.execute("event_start://a.b"))
    };
    driver.wait_for(1);
    session.execute("quit://").unwrap();
    assert!(session.is_done());

    let reply = worker.join().unwrap().unwrap();
    assert!(reply.starts_with("event_start://a.b?request("));
    assert!(!dispatcher.is_finished());

    dispatcher.shutdown().unwrap();
}

#[test]
fn test_failed_pre_command_leaves_driver_alone() {
    let (session, stream) = common::connect(common::builder());
    let driver = FakeDriver::succeeding(stream);

    session.register_pre_command("event_start", |session, _handle, _command| {
        session.find_event("missing").map(|_| Disposition::Forward)
    });

    assert_matches!(
        session.execute("event_start://missing"),
        Err(Error::NotFound { kind: "event", .. })
    );
    assert_eq!(session.handles().live_count(), 0);

    drop(session);
    driver.join();
}

#[test]
fn test_post_commands_see_the_reply() {
    let (session, stream) = common::connect(common::builder());
    let session = Arc::new(session);
    let _driver = FakeDriver::spawn(stream, |line| vec![answer(line, "result(0),mark(1)")]);
    let dispatcher = Dispatcher::spawn(Arc::clone(&session)).unwrap();

    session.register_post_command("event_find", |session, _handle, reply| {
        let (name, location) = vfi_command::get_name_location(reply)?;
        session.register_event(name, location)?;
        Ok(Disposition::Forward)
    });

    session.execute("event_find://done.loc1").unwrap();

    assert_eq!(session.find_event("done").unwrap(), "loc1");
    dispatcher.shutdown().unwrap();
}

#[test]
fn test_wait_timeout_releases_handle() {
    let (session, stream) = common::connect(common::builder().wait_timeout(Duration::from_millis(50)));
    let session = Arc::new(session);
    let _driver = FakeDriver::spawn(stream, |_| Vec::new());
    let dispatcher = Dispatcher::spawn(Arc::clone(&session)).unwrap();

    assert_matches!(session.execute("event_find://silent"), Err(Error::Timeout(_)));
    assert_eq!(session.handles().live_count(), 0);

    dispatcher.shutdown().unwrap();
}

#[test]
fn test_many_threads_share_a_session() {
    const THREADS: usize = 8;

    let (session, stream) = common::connect(common::builder());
    let session = Arc::new(session);
    let driver = FakeDriver::succeeding(stream);
    let dispatcher = Dispatcher::spawn(Arc::clone(&session)).unwrap();

    let workers: Vec<_> = (0..THREADS)
        .map(|i| {
            let session = Arc::clone(&session);
            thread::spawn(move || (i, session.execute(&format!("event_find://e{i}.loc")).unwrap()))
        })
        .collect();

    let replies: HashMap<_, _> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    for (i, reply) in replies {
        assert!(reply.starts_with(&format!("event_find://e{i}.loc?")));
    }
    assert_eq!(driver.commands().len(), THREADS);
    assert_eq!(session.handles().live_count(), 0);

    dispatcher.shutdown().unwrap();
}

#[test]
fn test_dispatcher_ends_when_driver_hangs_up() {
    let (session, stream) = common::connect(common::builder());
    let dispatcher = Dispatcher::spawn(Arc::new(session)).unwrap();

    drop(stream);
    while !dispatcher.is_finished() {
        thread::sleep(Duration::from_millis(1));
    }

    assert_matches!(dispatcher.shutdown(), Err(Error::Closed));
}

#[test]
fn test_open_and_close_regular_file() {
    let file = tempfile::NamedTempFile::new().unwrap();

    let session = vfi_api::Session::open(Some(file.path()), Some(Duration::from_millis(10))).unwrap();
    assert!(session.fileno() >= 0);
    session.send("event_find://x").unwrap();
    session.close();

    let written = std::fs::read_to_string(file.path()).unwrap();
    assert_eq!(written, "event_find://x\n");
}

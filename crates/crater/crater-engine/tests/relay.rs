//! Loopback sessions driven through real sockets.

use bytes::Bytes;
use crater_engine::{Acceptor, Client, RosterPlan, Session, SessionState};
use crater_protocol::{Channel, Configure, Limit, Message, Role};
use crater_ring::RingConfig;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("crater_engine=debug")
        .try_init();
}

/// Binds an ephemeral port and assembles `session` on a background thread.
fn assemble(mut session: Session) -> (SocketAddr, JoinHandle<Session>) {
    let acceptor = Acceptor::bind("127.0.0.1:0").unwrap();
    let addr = acceptor.local_addr().unwrap();
    let handle = thread::spawn(move || {
        acceptor.assemble(&mut session).unwrap();
        session
    });
    (addr, handle)
}

/// Blocks until the server closes `stream`.
fn assert_closed_by_server(stream: &mut TcpStream) {
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    let mut buf = [0u8; 16];
    match stream.read(&mut buf) {
        Ok(0) => {}
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {}
        other => panic!("expected the server to close the connection, got {other:?}"),
    }
}

fn poll(client: &mut Client, channel: Channel, want: usize) -> Vec<Bytes> {
    let deadline = Instant::now() + TIMEOUT;
    let mut got = Vec::new();
    while got.len() < want {
        assert!(Instant::now() < deadline, "timed out after {} of {want} records", got.len());
        let batch = client.get(channel, Limit::Elements(16)).unwrap();
        if batch.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        got.extend(batch);
    }
    got
}

#[test]
fn records_flow_from_producer_through_transformer_to_consumer() {
    init_tracing();
    let plan = RosterPlan {
        consumers: 1,
        ..RosterPlan::default()
    };
    let (addr, assembler) = assemble(Session::new(RingConfig::new(8), plan));

    let mut producer = Client::connect(addr, Role::Producer).unwrap();
    let mut transformer = Client::connect(addr, Role::Transformer).unwrap();
    let mut consumer = Client::connect(addr, Role::Consumer).unwrap();

    let mut session = assembler.join().unwrap();
    assert_eq!(session.state(), SessionState::Running);
    session.start().unwrap();

    let words = ["alpha", "beta", "gamma"];
    producer
        .give(Channel::Input, words.iter().map(|w| Bytes::from_static(w.as_bytes())).collect())
        .unwrap();

    let fetched = poll(&mut transformer, Channel::Input, words.len());
    let upper = fetched.iter().map(|r| Bytes::from(r.to_ascii_uppercase())).collect();
    transformer.give(Channel::Output, upper).unwrap();

    let delivered = poll(&mut consumer, Channel::Output, words.len());
    assert_eq!(delivered, vec!["ALPHA", "BETA", "GAMMA"]);

    for client in [&producer, &transformer, &consumer] {
        client.shutdown().unwrap();
    }
    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.ring().tracker().len(), 3);
}

#[test]
fn unknown_role_is_closed_without_touching_the_roster() {
    init_tracing();
    let plan = RosterPlan {
        transformer: false,
        ..RosterPlan::default()
    };
    let (addr, assembler) = assemble(Session::new(RingConfig::new(4), plan));

    let mut bad = TcpStream::connect(addr).unwrap();
    let mut frame = 1u64.to_le_bytes().to_vec();
    frame.extend_from_slice(&[2, 0x09]);
    bad.write_all(&frame).unwrap();
    assert_closed_by_server(&mut bad);

    let _producer = Client::connect(addr, Role::Producer).unwrap();
    let session = assembler.join().unwrap();
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(session.ring().tracker().len(), 1);
    assert!(session.roster().producer);
}

#[test]
fn second_producer_is_refused_and_the_first_keeps_working() {
    init_tracing();
    let plan = RosterPlan {
        transformer: false,
        consumers: 1,
        ..RosterPlan::default()
    };
    let (addr, assembler) = assemble(Session::new(RingConfig::new(4), plan));

    let mut first = Client::connect(addr, Role::Producer).unwrap();
    let second = Client::connect(addr, Role::Producer).unwrap();
    let mut raw = second.into_stream();
    assert_closed_by_server(&mut raw);

    let mut consumer = Client::connect(addr, Role::Consumer).unwrap();
    let mut session = assembler.join().unwrap();
    assert_eq!(session.ring().tracker().len(), 2);
    session.start().unwrap();

    first.give(Channel::Input, vec![Bytes::from_static(b"still here")]).unwrap();
    assert_eq!(poll(&mut consumer, Channel::Input, 1), vec!["still here"]);
    session.stop();
}

#[test]
fn bad_frame_closes_only_that_connection() {
    init_tracing();
    let plan = RosterPlan {
        transformer: false,
        consumers: 1,
        ..RosterPlan::default()
    };
    let (addr, assembler) = assemble(Session::new(RingConfig::new(4), plan));

    let mut producer = Client::connect(addr, Role::Producer).unwrap();
    let mut consumer = Client::connect(addr, Role::Consumer).unwrap();
    let mut session = assembler.join().unwrap();
    session.start().unwrap();

    // A consumer may not give data; its connection is dropped.
    consumer.give(Channel::Input, vec![Bytes::from_static(b"x")]).unwrap();
    let mut raw = consumer.into_stream();
    assert_closed_by_server(&mut raw);

    producer.give(Channel::Input, vec![Bytes::from_static(b"ok")]).unwrap();
    let deadline = Instant::now() + TIMEOUT;
    while session.live_workers() > 1 {
        assert!(Instant::now() < deadline, "consumer worker did not exit");
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(session.live_workers(), 1);
    session.stop();
}

#[test]
fn listener_closes_once_the_roster_is_complete() {
    init_tracing();
    let plan = RosterPlan {
        transformer: false,
        ..RosterPlan::default()
    };
    let (addr, assembler) = assemble(Session::new(RingConfig::new(4), plan));

    let _producer = Client::connect(addr, Role::Producer).unwrap();
    let mut session = assembler.join().unwrap();
    session.start().unwrap();

    match TcpStream::connect(addr) {
        Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionRefused),
        Ok(mut late) => {
            late.write_all(&Message::Configure(Configure { role: Role::Consumer }).to_bytes()).unwrap();
            assert_closed_by_server(&mut late);
        }
    }
    assert_eq!(session.ring().tracker().len(), 1);
    session.stop();
}

//! Facade-level end-to-end scenarios. Lower-level protocol invariants (block
//! round-trip, checksum, reassembly, T3 restart) are exercised in
//! `secs-protocol`/`secs-communication`/`secs-circuit`; these tests cover
//! what only exists once the backends are wired up behind `Communicator`:
//! the open/close lifecycle, HSMS-SS Select handshake, reply correlation
//! through `send`/`reply`, and the SML plumbing seam.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Instant;

use secs::{Communicator, CommunicatorConfig, CommunicatorError, CommunicatorKind, Message, SmlParser, UsageError};
use secs_timing::Duration;

fn free_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

fn hsms_config() -> CommunicatorConfig {
    CommunicatorConfig {
        timeout_t3: Duration::from_secs(2),
        timeout_t6: Duration::from_secs(2),
        timeout_t8: Duration::from_secs(2),
        ..Default::default()
    }
}

/// HSMS Select scenario (§8): client connects, sends Select.req, and both
/// sides observe the NotConnect -> Connected -> Selected transitions.
#[test]
fn hsms_select_reaches_selected_on_both_sides() {
    let addr = free_addr();

    let server = Arc::new(Communicator::new(hsms_config(), CommunicatorKind::HsmsPassive { bind_addr: addr.clone() }));
    let mut server_states = Vec::new();
    let (tx, rx) = std::sync::mpsc::channel();
    server.on_communicate_state(move |s| {
        let _ = tx.send(*s);
    });
    let server2 = server.clone();
    let server_thread = std::thread::spawn(move || {
        server2.open_and_wait_until_communicating(Duration::from_secs(5)).unwrap();
    });

    std::thread::sleep(std::time::Duration::from_millis(50));
    let client = Communicator::new(hsms_config(), CommunicatorKind::HsmsActive { addr });
    client.open_and_wait_until_communicating(Duration::from_secs(5)).unwrap();
    server_thread.join().unwrap();

    while let Ok(s) = rx.try_recv() {
        server_states.push(s);
    }
    assert_eq!(
        server_states,
        vec![secs::CommunicateState::Connected, secs::CommunicateState::Selected]
    );
}

/// A primary sent with `w_bit` over HSMS gets matched to the peer's reply
/// by system-bytes, driven entirely through the façade: the server answers
/// from inside an `on_recv_primary` listener.
#[test]
fn hsms_send_with_reply_round_trips() {
    let addr = free_addr();

    let server = Arc::new(Communicator::new(hsms_config(), CommunicatorKind::HsmsPassive { bind_addr: addr.clone() }));
    let responder = server.clone();
    server.on_recv_primary(move |msg| {
        responder.reply(msg, msg.stream, msg.function + 1, false, vec![0x12, 0x34]).unwrap();
    });
    let server2 = server.clone();
    let server_thread = std::thread::spawn(move || {
        server2.open_and_wait_until_communicating(Duration::from_secs(5)).unwrap();
    });

    std::thread::sleep(std::time::Duration::from_millis(50));
    let client = Communicator::new(hsms_config(), CommunicatorKind::HsmsActive { addr });
    client.open_and_wait_until_communicating(Duration::from_secs(5)).unwrap();
    server_thread.join().unwrap();

    let reply = client.send(1, 1, true, vec![0xAA, 0xBB, 0xCC]).unwrap();
    let reply = reply.expect("expected a reply");
    assert_eq!(reply.body, vec![0x12, 0x34]);
}

/// A primary sent without `w_bit` never blocks on a reply.
#[test]
fn hsms_send_without_w_bit_returns_immediately_with_no_reply() {
    let addr = free_addr();

    let server = Communicator::new(hsms_config(), CommunicatorKind::HsmsPassive { bind_addr: addr.clone() });
    let server_thread = std::thread::spawn(move || {
        server.open().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(300));
    });

    std::thread::sleep(std::time::Duration::from_millis(50));
    let client = Communicator::new(hsms_config(), CommunicatorKind::HsmsActive { addr });
    client.open_and_wait_until_communicating(Duration::from_secs(5)).unwrap();

    let reply = client.send(1, 1, false, vec![]).unwrap();
    assert!(reply.is_none());
    server_thread.join().unwrap();
}

/// Close during send (§8): a caller blocked in `send` awaiting a reply that
/// never comes observes a communicator-closed error promptly once `close`
/// runs, rather than waiting out T3.
#[test]
fn close_during_blocked_send_returns_promptly() {
    let addr = free_addr();

    let server = Communicator::new(hsms_config(), CommunicatorKind::HsmsPassive { bind_addr: addr.clone() });
    let server_thread = std::thread::spawn(move || {
        server.open().unwrap();
        std::thread::sleep(std::time::Duration::from_secs(2));
    });

    std::thread::sleep(std::time::Duration::from_millis(50));
    let client = Arc::new(Communicator::new(hsms_config(), CommunicatorKind::HsmsActive { addr }));
    client.open_and_wait_until_communicating(Duration::from_secs(5)).unwrap();

    let client2 = client.clone();
    let send_handle = std::thread::spawn(move || client2.send(1, 1, true, vec![]));
    std::thread::sleep(std::time::Duration::from_millis(50));

    let start = Instant::now();
    client.close().unwrap();
    let result = send_handle.join().unwrap();
    assert!(result.is_err());
    assert!(start.elapsed() < std::time::Duration::from_millis(500));

    server_thread.join().unwrap();
}

#[test]
fn double_open_and_reopen_after_close_are_rejected() {
    let addr = free_addr();

    let server = Communicator::new(hsms_config(), CommunicatorKind::HsmsPassive { bind_addr: addr.clone() });
    let server_thread = std::thread::spawn(move || {
        server.open().unwrap();
    });
    std::thread::sleep(std::time::Duration::from_millis(50));

    let client = Communicator::new(hsms_config(), CommunicatorKind::HsmsActive { addr });
    client.open().unwrap();
    server_thread.join().unwrap();

    let err = client.open().unwrap_err();
    assert!(matches!(err, CommunicatorError::Usage(UsageError::AlreadyOpen)));

    client.close().unwrap();
    client.close().unwrap(); // idempotent

    let err = client.open().unwrap_err();
    assert!(matches!(err, CommunicatorError::Usage(UsageError::ReopenAfterClose)));
}

#[test]
fn reply_rejects_w_bit() {
    let communicator = Communicator::new(CommunicatorConfig::default(), CommunicatorKind::Secs1 { path: "/dev/null".into(), baud: 9600 });
    let primary = Message::new(0, 1, 1, true, [0, 0, 0, 1], vec![]);
    let err = communicator.reply(&primary, 1, 2, true, vec![]).unwrap_err();
    assert!(matches!(err, CommunicatorError::Usage(UsageError::ReplyMustNotSetWBit)));
}

#[test]
fn send_sml_without_a_configured_parser_is_a_usage_error() {
    let communicator = Communicator::new(CommunicatorConfig::default(), CommunicatorKind::Secs1 { path: "/dev/null".into(), baud: 9600 });
    let err = communicator.send_sml("S1F1 W.").unwrap_err();
    assert!(matches!(err, CommunicatorError::Usage(UsageError::NoSmlParser)));
}

struct RejectingParser;

impl SmlParser for RejectingParser {
    fn parse(&self, _sml: &str) -> Result<(u8, u8, bool, Vec<u8>), String> {
        Err("unexpected token".into())
    }
}

#[test]
fn send_sml_propagates_a_parser_error() {
    let communicator = Communicator::new(CommunicatorConfig::default(), CommunicatorKind::Secs1 { path: "/dev/null".into(), baud: 9600 })
        .with_sml_parser(Arc::new(RejectingParser));
    let err = communicator.send_sml("garbage").unwrap_err();
    assert!(matches!(err, CommunicatorError::ParseError(_)));
}

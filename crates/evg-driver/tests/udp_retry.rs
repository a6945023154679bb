//! Retry and timeout behavior of the UDP transport against a loopback
//! gateway thread.
//!
//! Reply timeouts are shortened from the normative 1 s so the suite stays
//! fast; the defaults themselves are asserted as constants.

use std::net::{Ipv4Addr, UdpSocket};
use std::thread;
use std::time::Duration;

use evg_card::{regs, Message, MESSAGE_LEN};
use evg_driver::{EvgError, Transport, UdpTransport, MAX_RETRIES, REPLY_TIMEOUT};

const TEST_TIMEOUT: Duration = Duration::from_millis(100);

/// Spawn a gateway that runs `respond` for each request (attempt number,
/// payload) and returns how many requests it saw once idle.
fn spawn_gateway(
    respond: impl Fn(u32, &[u8], &UdpSocket, std::net::SocketAddr) + Send + 'static,
) -> (u16, thread::JoinHandle<u32>) {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = socket.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let mut buf = [0u8; 64];
        let mut count = 0u32;
        while let Ok((n, src)) = socket.recv_from(&mut buf) {
            count += 1;
            respond(count, &buf[..n], &socket, src);
        }
        count
    });
    (port, handle)
}

fn connect(port: u16) -> UdpTransport {
    UdpTransport::connect(Ipv4Addr::LOCALHOST, port)
        .unwrap()
        .with_reply_timeout(TEST_TIMEOUT)
}

#[test]
fn normative_timing_constants() {
    assert_eq!(MAX_RETRIES, 3);
    assert_eq!(REPLY_TIMEOUT, Duration::from_millis(1000));
}

#[test]
fn exchange_succeeds_when_only_the_third_attempt_is_answered() {
    let (port, gateway) = spawn_gateway(|attempt, payload, socket, src| {
        if attempt == 3 {
            socket.send_to(payload, src).unwrap();
        }
    });

    let mut link = connect(port);
    let reply = link.exchange(&Message::read(regs::CONTROL)).unwrap();
    assert_eq!(reply.register(), regs::CONTROL);

    assert_eq!(gateway.join().unwrap(), 3, "request sent once per attempt");
}

#[test]
fn exchange_times_out_after_exactly_three_attempts() {
    let (port, gateway) = spawn_gateway(|_, _, _, _| {
        // Never reply.
    });

    let mut link = connect(port);
    let err = link.exchange(&Message::read(regs::CONTROL)).unwrap_err();
    assert!(
        matches!(err, EvgError::TransportTimeout { attempts: 3 }),
        "got {err:?}"
    );

    assert_eq!(gateway.join().unwrap(), 3);
}

#[test]
fn malformed_replies_are_retried_like_drops() {
    let (port, gateway) = spawn_gateway(|attempt, payload, socket, src| {
        match attempt {
            // Short datagram, then an oversized one, then the real reply.
            1 => {
                socket.send_to(&payload[..5], src).unwrap();
            }
            2 => {
                socket.send_to(&[0u8; 20], src).unwrap();
            }
            _ => {
                socket.send_to(payload, src).unwrap();
            }
        }
    });

    let mut link = connect(port);
    let reply = link.exchange(&Message::read(regs::FIRMWARE)).unwrap();
    assert_eq!(reply.register(), regs::FIRMWARE);

    assert_eq!(gateway.join().unwrap(), 3);
}

#[test]
fn gateway_reply_payload_reaches_the_caller() {
    // A minimal register gateway: answer READ CONTROL with 0x7001.
    let (port, gateway) = spawn_gateway(|_, payload, socket, src| {
        let mut frame = [0u8; MESSAGE_LEN];
        frame.copy_from_slice(payload);
        let mut reply = Message::from_bytes(&frame);
        reply.data = 0x7001;
        socket.send_to(&reply.to_bytes(), src).unwrap();
    });

    let mut link = connect(port);
    let reply = link.exchange(&Message::read(regs::CONTROL)).unwrap();
    assert_eq!(reply.data, 0x7001);
    assert_eq!(reply.register(), regs::CONTROL);

    assert_eq!(gateway.join().unwrap(), 1);
}

//! End-to-end tests against a running relay with real WebSocket clients.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message, WebSocket};

use ws_relay::{Delivery, FailureKind, RelayConfig, RelayServer, ServerState};

const TIMEOUT: Duration = Duration::from_secs(5);

type Client = WebSocket<TcpStream>;

fn local_relay(config: RelayConfig) -> (RelayServer, SocketAddr) {
    let relay = RelayServer::new(config.host("127.0.0.1").port(0));
    let addr = relay.start().unwrap();
    (relay, addr)
}

fn connect(addr: SocketAddr) -> Client {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    let (ws, _) = tungstenite::client(format!("ws://{addr}/"), stream)
        .unwrap_or_else(|e| panic!("handshake failed: {e}"));
    ws
}

/// Poll `cond` until it holds or the test timeout elapses
fn wait_for(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn read_binary(ws: &mut Client) -> Vec<u8> {
    loop {
        match ws.read().expect("read failed") {
            Message::Binary(data) => return data.to_vec(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

fn disconnect(mut ws: Client) {
    ws.close(None).unwrap();
    // Drain until the close handshake finishes
    while ws.read().is_ok() {}
}

#[test]
fn broadcast_to_changing_client_set() {
    let (relay, addr) = local_relay(RelayConfig::default());

    let mut a = connect(addr);
    let mut b = connect(addr);
    assert!(wait_for(|| relay.connection_count() == 2));

    let report = relay.broadcast(vec![0x01, 0x02, 0x03]);
    assert_eq!(report.len(), 2);
    assert!(report.all_delivered());
    assert_eq!(read_binary(&mut a), vec![0x01, 0x02, 0x03]);
    assert_eq!(read_binary(&mut b), vec![0x01, 0x02, 0x03]);

    disconnect(a);
    assert!(wait_for(|| relay.connection_count() == 1));

    let report = relay.broadcast(vec![0x04]);
    assert_eq!(report.len(), 1);
    assert!(report.all_delivered());
    assert_eq!(read_binary(&mut b), vec![0x04]);

    relay.stop().unwrap();
    assert_eq!(relay.state(), ServerState::Stopped);
    assert_eq!(relay.connection_count(), 0);

    let start = Instant::now();
    assert!(relay.broadcast(vec![0x05]).is_empty());
    assert!(start.elapsed() < Duration::from_secs(1));

    // Remaining client is told the server went away
    match b.read() {
        Ok(Message::Close(Some(frame))) => assert_eq!(frame.code, CloseCode::Away),
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[test]
fn broadcast_without_clients_does_not_block() {
    let (relay, _addr) = local_relay(RelayConfig::default().send_timeout(Duration::from_secs(30)));

    let start = Instant::now();
    let report = relay.broadcast(vec![1u8, 2, 3]);

    assert!(report.is_empty());
    assert!(start.elapsed() < Duration::from_secs(1));
    relay.stop().unwrap();
}

#[test]
fn messages_arrive_in_push_order() {
    let (relay, addr) = local_relay(RelayConfig::default());
    let mut client = connect(addr);
    assert!(wait_for(|| relay.connection_count() == 1));

    for i in 0..20u8 {
        let report = relay.broadcast(vec![i]);
        assert!(report.all_delivered(), "broadcast {i}: {report:?}");
    }

    for i in 0..20u8 {
        assert_eq!(read_binary(&mut client), vec![i]);
    }
    relay.stop().unwrap();
}

#[test]
fn inbound_client_messages_are_ignored() {
    let (relay, addr) = local_relay(RelayConfig::default());
    let mut client = connect(addr);
    assert!(wait_for(|| relay.connection_count() == 1));

    client.send(Message::text("hello")).unwrap();
    client.send(Message::binary(vec![9u8, 9, 9])).unwrap();

    let report = relay.broadcast(vec![0xAA]);
    assert!(report.all_delivered());
    assert_eq!(read_binary(&mut client), vec![0xAA]);
    assert_eq!(relay.connection_count(), 1);
    relay.stop().unwrap();
}

#[test]
fn stop_with_connected_clients_empties_registry() {
    let (relay, addr) = local_relay(RelayConfig::default().poll_timeout(Duration::from_millis(100)));
    let _a = connect(addr);
    let _b = connect(addr);
    assert!(wait_for(|| relay.connection_count() == 2));

    let start = Instant::now();
    relay.stop().unwrap();

    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(relay.connection_count(), 0);
    assert_eq!(relay.stats().active_connections, 0);
}

#[test]
fn stop_interrupts_write_in_progress() {
    let config = RelayConfig::default()
        .poll_timeout(Duration::from_millis(100))
        .send_timeout(Duration::from_secs(30));
    let (relay, addr) = local_relay(config);
    let relay = Arc::new(relay);

    // Never reads, so a large frame cannot be written out
    let _stalled = connect(addr);
    assert!(wait_for(|| relay.connection_count() == 1));

    let producer = {
        let relay = Arc::clone(&relay);
        thread::spawn(move || relay.broadcast(vec![0u8; 64 * 1024 * 1024]))
    };
    thread::sleep(Duration::from_millis(300));

    let start = Instant::now();
    relay.stop().unwrap();
    assert!(start.elapsed() < Duration::from_secs(3));
    assert_eq!(relay.connection_count(), 0);

    let report = producer.join().unwrap();
    assert_eq!(report.len(), 1);
    assert!(matches!(report.results()[0].1, Delivery::Failed(_)));
    assert_ne!(
        report.results()[0].1,
        Delivery::Failed(FailureKind::Timeout)
    );
}

#[test]
fn stalled_client_times_out_without_blocking_others() {
    let send_timeout = Duration::from_millis(500);
    let (relay, addr) = local_relay(RelayConfig::default().send_timeout(send_timeout));

    // Never reads, so the frame cannot fit in the socket buffers
    let _stalled = connect(addr);
    assert!(wait_for(|| relay.connection_count() == 1));

    let mut healthy = connect(addr);
    assert!(wait_for(|| relay.connection_count() == 2));

    let reader = thread::spawn(move || {
        let len = read_binary(&mut healthy).len();
        (healthy, len)
    });

    let payload = vec![0x5Au8; 15 * 1024 * 1024];
    let start = Instant::now();
    let report = relay.broadcast(payload.clone());
    let elapsed = start.elapsed();

    // Results follow registration order: stalled first, healthy second
    assert_eq!(report.len(), 2);
    assert_eq!(
        report.results()[0].1,
        Delivery::Failed(FailureKind::Timeout)
    );
    assert_eq!(report.results()[1].1, Delivery::Delivered);
    assert!(elapsed >= send_timeout);
    assert!(elapsed < send_timeout + Duration::from_secs(2));

    let (mut healthy, len) = reader.join().unwrap();
    assert_eq!(len, payload.len());

    // The timed-out client is closed and unregistered
    assert!(wait_for(|| relay.connection_count() == 1));
    assert_eq!(relay.stats().timed_out, 1);

    let report = relay.broadcast(vec![0x01]);
    assert_eq!(report.len(), 1);
    assert!(report.all_delivered());
    assert_eq!(read_binary(&mut healthy), vec![0x01]);

    relay.stop().unwrap();
}

#[test]
fn zero_poll_timeout_still_serves_clients() {
    let mut config = RelayConfig::default();
    config.poll_timeout = Duration::ZERO;
    let (relay, addr) = local_relay(config);

    let mut client = connect(addr);
    assert!(wait_for(|| relay.connection_count() == 1));
    assert_eq!(relay.state(), ServerState::Running);

    assert!(relay.broadcast(vec![0x42]).all_delivered());
    assert_eq!(read_binary(&mut client), vec![0x42]);

    relay.stop().unwrap();
    assert_eq!(relay.state(), ServerState::Stopped);
}

#[test]
fn unbounded_send_timeout_waits_for_delivery() {
    let (relay, addr) = local_relay(RelayConfig::default().send_timeout(Duration::MAX));
    let mut client = connect(addr);
    assert!(wait_for(|| relay.connection_count() == 1));

    assert!(relay.broadcast(vec![1u8]).all_delivered());
    assert_eq!(read_binary(&mut client), vec![1]);

    relay.stop().unwrap();
}

#[test]
fn connection_limit_refuses_extra_clients() {
    let (relay, addr) = local_relay(RelayConfig::default().max_connections(1));
    let _first = connect(addr);
    assert!(wait_for(|| relay.connection_count() == 1));

    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    assert!(tungstenite::client(format!("ws://{addr}/"), stream).is_err());

    assert!(wait_for(|| relay.stats().refused_connections == 1));
    assert_eq!(relay.connection_count(), 1);
    relay.stop().unwrap();
}

#[test]
fn stats_track_deliveries() {
    let (relay, addr) = local_relay(RelayConfig::default());
    let mut client = connect(addr);
    assert!(wait_for(|| relay.connection_count() == 1));

    relay.broadcast(vec![1u8; 100]);
    assert_eq!(read_binary(&mut client).len(), 100);

    let stats = relay.stats();
    assert_eq!(stats.total_connections, 1);
    assert_eq!(stats.active_connections, 1);
    assert_eq!(stats.broadcasts, 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.bytes_sent, 100);
    relay.stop().unwrap();
}

#[test]
fn relay_can_be_restarted() {
    let (relay, _) = local_relay(RelayConfig::default());
    relay.stop().unwrap();

    let addr = relay.start_at("127.0.0.1", 0).unwrap();
    assert_ne!(addr.port(), 0);
    let mut client = connect(addr);
    assert!(wait_for(|| relay.connection_count() == 1));

    assert!(relay.broadcast(vec![7u8]).all_delivered());
    assert_eq!(read_binary(&mut client), vec![7]);

    relay.stop().unwrap();
}

use std::sync::{Arc, Mutex};

use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use vdwall::{encode, ConnectionState, DeviceAddress, ResolvedOptions, Transport};

type Seen = Arc<Mutex<Vec<ConnectionState>>>;

fn observed() -> (Transport, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let transport = Transport::with_observer(tracing::Span::none(), move |s: &ConnectionState| {
        sink.lock().unwrap().push(s.clone())
    });
    (transport, seen)
}

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[tokio::test]
async fn connect_send_close() {
    let (listener, port) = listener().await;
    let (transport, seen) = observed();

    let address = DeviceAddress::new("127.0.0.1", port, 1).unwrap();
    transport.connect(address).await;
    let (mut peer, _) = listener.accept().await.unwrap();

    assert_eq!(transport.state(), ConnectionState::Connected);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );

    let options: ResolvedOptions = vec![("fadeTime", 2i64), ("inputSource", 4)]
        .into_iter()
        .collect();
    let command = encode("InputSwitch", &options, 1).unwrap();
    assert!(transport.send_command(&command).await);

    let mut frame = [0u8; 13];
    peer.read_exact(&mut frame).await.unwrap();
    assert_eq!(frame, [5, 1, 0, 2, 4, 0, 0, 0, 0, 0, 0, 0, 5]);

    transport.close();
    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert!(!transport.send_command(&command).await);

    // the device sees the socket go away
    let mut rest = Vec::new();
    assert_eq!(peer.read_to_end(&mut rest).await.unwrap(), 0);
}

#[tokio::test]
async fn execute_uses_configured_serial_number() {
    let (listener, port) = listener().await;
    let transport = Transport::new(tracing::Span::none());
    transport
        .connect(DeviceAddress::new("127.0.0.1", port, 7).unwrap())
        .await;
    let (mut peer, _) = listener.accept().await.unwrap();

    let mut options = ResolvedOptions::new();
    options.insert("value", "80");
    assert_eq!(transport.execute("Brightness", &options).await, Ok(true));

    let mut frame = [0u8; 13];
    peer.read_exact(&mut frame).await.unwrap();
    assert_eq!(frame, [5, 7, 16, 80, 0, 0, 0, 0, 0, 0, 0, 0, 5]);

    assert!(transport.execute("Contrast", &options).await.is_err());
}

#[tokio::test]
async fn reconfigure_with_same_address_connects_once() {
    let (listener, port) = listener().await;
    let (transport, seen) = observed();
    let address = DeviceAddress::new("127.0.0.1", port, 0).unwrap();

    transport.reconfigure(address.clone()).await;
    transport.reconfigure(address.clone()).await;
    let _peer = listener.accept().await.unwrap();

    let attempts = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|s| **s == ConnectionState::Connecting)
        .count();
    assert_eq!(attempts, 1);
    assert_eq!(transport.address(), Some(address));
}

#[tokio::test]
async fn reconfigure_with_new_serial_number_reconnects() {
    let (listener, port) = listener().await;
    let (transport, seen) = observed();

    transport
        .reconfigure(DeviceAddress::new("127.0.0.1", port, 0).unwrap())
        .await;
    let (mut first, _) = listener.accept().await.unwrap();
    transport
        .reconfigure(DeviceAddress::new("127.0.0.1", port, 2).unwrap())
        .await;
    let _second = listener.accept().await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );

    // the first socket was torn down before the second one was opened
    let mut rest = Vec::new();
    assert_eq!(first.read_to_end(&mut rest).await.unwrap(), 0);
}

#[tokio::test]
async fn empty_host_does_not_connect() {
    let (transport, seen) = observed();
    transport.connect(DeviceAddress::new("", 7, 0).unwrap()).await;

    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert!(seen.lock().unwrap().is_empty());
    assert!(!transport.send(&[0u8; 13]).await);
}

#[tokio::test]
async fn refused_connection_is_reported_as_state() {
    let (listener, port) = listener().await;
    drop(listener);

    let (transport, seen) = observed();
    transport
        .connect(DeviceAddress::new("127.0.0.1", port, 0).unwrap())
        .await;

    assert!(matches!(transport.state(), ConnectionState::Error(_)));
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert!(!transport.send(&[0u8; 13]).await);
}

#[tokio::test]
async fn reconfigure_retries_unchanged_address_after_failure() {
    let (listener, port) = listener().await;
    drop(listener);

    let (transport, seen) = observed();
    let address = DeviceAddress::new("127.0.0.1", port, 0).unwrap();
    transport.reconfigure(address.clone()).await;
    assert!(matches!(transport.state(), ConnectionState::Error(_)));

    // device comes up on the same port
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    transport.reconfigure(address.clone()).await;
    let _peer = listener.accept().await.unwrap();
    assert_eq!(transport.state(), ConnectionState::Connected);

    // once connected, the same address is left alone again
    transport.reconfigure(address).await;
    let attempts = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|s| **s == ConnectionState::Connecting)
        .count();
    assert_eq!(attempts, 2);
}

#[tokio::test]
async fn reconfigure_reopens_after_close() {
    let (listener, port) = listener().await;
    let transport = Transport::new(tracing::Span::none());
    let address = DeviceAddress::new("127.0.0.1", port, 0).unwrap();

    transport.connect(address.clone()).await;
    let _first = listener.accept().await.unwrap();
    transport.close();

    transport.reconfigure(address).await;
    let _second = listener.accept().await.unwrap();
    assert_eq!(transport.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn close_discards_attempt_in_flight() {
    let (_listener, port) = listener().await;
    let (transport, seen) = observed();
    let other = transport.clone();
    let address = DeviceAddress::new("127.0.0.1", port, 0).unwrap();

    tokio::join!(transport.connect(address), async { other.close() });

    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![ConnectionState::Connecting, ConnectionState::Disconnected]
    );
    assert!(!transport.send(&[0u8; 13]).await);
}

#[tokio::test]
async fn later_connect_supersedes_earlier_one() {
    let (listener_a, port_a) = listener().await;
    let (listener_b, port_b) = listener().await;
    let transport = Transport::new(tracing::Span::none());
    let other = transport.clone();
    let a = DeviceAddress::new("127.0.0.1", port_a, 1).unwrap();
    let b = DeviceAddress::new("127.0.0.1", port_b, 2).unwrap();

    tokio::join!(transport.connect(a), other.connect(b.clone()));

    assert_eq!(transport.state(), ConnectionState::Connected);
    assert_eq!(transport.address(), Some(b));

    // the socket to A was opened but thrown away
    let (mut peer_a, _) = listener_a.accept().await.unwrap();
    let mut rest = Vec::new();
    assert_eq!(peer_a.read_to_end(&mut rest).await.unwrap(), 0);

    // B carries the traffic
    let (mut peer_b, _) = listener_b.accept().await.unwrap();
    let mut options = ResolvedOptions::new();
    options.insert("level", 10i64);
    assert_eq!(transport.execute("Brightness", &options).await, Ok(true));
    let mut frame = [0u8; 13];
    peer_b.read_exact(&mut frame).await.unwrap();
    assert_eq!(frame, [5, 2, 16, 10, 0, 0, 0, 0, 0, 0, 0, 0, 5]);
}

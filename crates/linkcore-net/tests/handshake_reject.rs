mod common;

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use linkcore_net::framed::{ConnHandle, Server};
use linkcore_net::{FramedMsg, ServerCallbacks};

#[derive(Default)]
struct CountingCallbacks {
    requests: AtomicUsize,
    connected: AtomicUsize,
}

impl ServerCallbacks<FramedMsg, ConnHandle> for CountingCallbacks {
    fn on_client_connection_request(&self, _conn: &ConnHandle) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn on_client_connected(&self, _conn: &Arc<ConnHandle>) {
        self.connected.fetch_add(1, Ordering::SeqCst);
    }
}

/// Writing garbage instead of the expected handshake response closes the
/// socket without ever firing `on_client_connected`.
#[test]
fn bad_handshake_response_closes_without_connecting() {
    let bind_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
    let callbacks = Arc::new(CountingCallbacks::default());
    let server = Server::new(bind_addr, callbacks.clone());
    server.start().unwrap();
    let addr = server.local_addr().unwrap();

    let mut raw = TcpStream::connect(addr).unwrap();
    // The server's first move is to write its nonce; read and discard it,
    // then respond with 8 zero bytes instead of the expected transform.
    let mut nonce = [0u8; 8];
    raw.read_exact(&mut nonce).unwrap();
    raw.write_all(&[0u8; 8]).unwrap();

    assert!(common::wait_for(Duration::from_secs(1), || {
        let mut buf = [0u8; 1];
        matches!(raw.read(&mut buf), Ok(0))
    }));

    assert_eq!(callbacks.requests.load(Ordering::SeqCst), 1);
    assert_eq!(callbacks.connected.load(Ordering::SeqCst), 0);

    server.request_shutdown();
}

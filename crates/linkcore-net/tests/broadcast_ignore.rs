mod common;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use linkcore_net::framed::{Client, ConnHandle, Server};
use linkcore_net::{ClientCallbacks, FramedMsg, ServerCallbacks};

struct TrackingCallbacks {
    connected: mpsc::Sender<Arc<ConnHandle>>,
}

impl ServerCallbacks<FramedMsg, ConnHandle> for TrackingCallbacks {
    fn on_client_connected(&self, conn: &Arc<ConnHandle>) {
        let _ = self.connected.send(conn.clone());
    }
}

struct Recorder(mpsc::Sender<FramedMsg>);

impl ClientCallbacks<FramedMsg> for Recorder {
    fn on_message(&self, msg: FramedMsg) {
        let _ = self.0.send(msg);
    }
}

fn spawn_connected_client(addr: SocketAddr) -> (Arc<Client>, thread::JoinHandle<()>, mpsc::Receiver<FramedMsg>) {
    let (tx, rx) = mpsc::channel();
    let client = Arc::new(Client::new(Arc::new(Recorder(tx))).unwrap());
    assert!(client.connect("127.0.0.1", addr.port()).unwrap());
    assert!(common::wait_for(Duration::from_secs(1), || client.is_connected()));
    let handle = thread::spawn({
        let client = client.clone();
        move || client.run()
    });
    (client, handle, rx)
}

/// `message_all` reaches every connected peer except the one passed as
/// `ignore`.
#[test]
fn message_all_skips_the_ignored_connection() {
    let bind_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
    let (conn_tx, conn_rx) = mpsc::channel();
    let callbacks = Arc::new(TrackingCallbacks { connected: conn_tx });
    let server = Arc::new(Server::new(bind_addr, callbacks));
    server.start().unwrap();
    let addr = server.local_addr().unwrap();
    let server_run = thread::spawn({
        let server = server.clone();
        move || server.run()
    });

    let (client_a, run_a, rx_a) = spawn_connected_client(addr);
    let handle_a = conn_rx.recv_timeout(Duration::from_secs(1)).unwrap();
    let (client_b, run_b, rx_b) = spawn_connected_client(addr);
    let handle_b = conn_rx.recv_timeout(Duration::from_secs(1)).unwrap();
    let (client_c, run_c, rx_c) = spawn_connected_client(addr);
    let handle_c = conn_rx.recv_timeout(Duration::from_secs(1)).unwrap();
    let _ = (&handle_a, &handle_c);

    let mut msg = FramedMsg::new(42);
    msg.append_str("broadcast");
    server.message_all(msg, Some(handle_b));

    assert!(rx_a.recv_timeout(Duration::from_secs(1)).is_ok());
    assert!(rx_c.recv_timeout(Duration::from_secs(1)).is_ok());
    assert!(rx_b.recv_timeout(Duration::from_millis(200)).is_err());

    for client in [&client_a, &client_b, &client_c] {
        client.request_shutdown();
    }
    run_a.join().unwrap();
    run_b.join().unwrap();
    run_c.join().unwrap();
    server.request_shutdown();
    server_run.join().unwrap();
}

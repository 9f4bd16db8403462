mod common;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use linkcore_net::framed::{Client, ConnHandle, Server};
use linkcore_net::{ConnId, FramedMsg, NoopCallbacks, ServerCallbacks};

struct IdRecorder(mpsc::Sender<ConnId>);

impl ServerCallbacks<FramedMsg, ConnHandle> for IdRecorder {
    fn on_client_connected(&self, conn: &Arc<ConnHandle>) {
        let _ = self.0.send(conn.id());
    }
}

/// IDs are assigned in order starting at 10000.
#[test]
fn accepted_connections_get_sequential_ids_from_10000() {
    let bind_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
    let (tx, rx) = mpsc::channel();
    let server = Arc::new(Server::new(bind_addr, Arc::new(IdRecorder(tx))));
    server.start().unwrap();
    let addr = server.local_addr().unwrap();
    let server_run = thread::spawn({
        let server = server.clone();
        move || server.run()
    });

    let mut ids = Vec::new();
    let mut clients = Vec::new();
    for _ in 0..3 {
        let client = Arc::new(Client::new(Arc::new(NoopCallbacks)).unwrap());
        assert!(client.connect("127.0.0.1", addr.port()).unwrap());
        assert!(common::wait_for(Duration::from_secs(1), || client.is_connected()));
        ids.push(rx.recv_timeout(Duration::from_secs(1)).unwrap());
        clients.push(client);
    }

    assert_eq!(ids, vec![10000, 10001, 10002]);

    for client in &clients {
        client.request_shutdown();
    }
    server.request_shutdown();
    server_run.join().unwrap();
}

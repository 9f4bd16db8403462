mod common;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::mpsc;
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use linkcore_net::framed::{ConnHandle, Server};
use linkcore_net::{FramedMsg, ServerCallbacks};

/// Echoes every inbound message back to its sender.
struct EchoCallbacks {
    server: OnceLock<Weak<Server>>,
}

impl ServerCallbacks<FramedMsg, ConnHandle> for EchoCallbacks {
    fn on_message(&self, conn: &Arc<ConnHandle>, msg: FramedMsg) {
        if let Some(server) = self.server.get().and_then(Weak::upgrade) {
            server.message_client(conn, msg);
        }
    }
}

#[test]
fn client_receives_its_own_message_echoed_back() {
    let bind_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
    let callbacks = Arc::new(EchoCallbacks { server: OnceLock::new() });
    let server = Arc::new(Server::new(bind_addr, callbacks.clone()));
    callbacks.server.set(Arc::downgrade(&server)).unwrap();
    server.start().unwrap();
    let addr = server.local_addr().expect("server should be bound after start");

    let server_run = thread::spawn({
        let server = server.clone();
        move || server.run()
    });

    let (tx, rx) = mpsc::channel();
    struct ClientCallbacks(mpsc::Sender<FramedMsg>);
    impl linkcore_net::ClientCallbacks<FramedMsg> for ClientCallbacks {
        fn on_message(&self, msg: FramedMsg) {
            let _ = self.0.send(msg);
        }
    }

    let client = Arc::new(linkcore_net::framed::Client::new(Arc::new(ClientCallbacks(tx))).unwrap());
    assert!(client.connect("127.0.0.1", addr.port()).unwrap());
    assert!(common::wait_for(Duration::from_secs(1), || client.is_connected()));

    let client_run = thread::spawn({
        let client = client.clone();
        move || client.run()
    });

    let mut ping = FramedMsg::new(7);
    ping.append_str("ping");
    client.send(ping);

    let echoed = rx.recv_timeout(Duration::from_secs(1)).expect("no echo within 1s");
    assert_eq!(echoed.msg_type(), 7);
    assert_eq!(echoed.body(), b"ping");
    assert_eq!(echoed.size() as usize, 12);

    client.request_shutdown();
    client_run.join().unwrap();
    server.request_shutdown();
    server_run.join().unwrap();
}

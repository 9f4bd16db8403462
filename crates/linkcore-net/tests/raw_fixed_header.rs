mod common;

use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use linkcore_net::raw::{ConnHandle, Server};
use linkcore_net::{RawHeaderDescriptor, RawMsg, ServerCallbacks};

struct Recorder(mpsc::Sender<RawMsg>);

impl ServerCallbacks<RawMsg, ConnHandle> for Recorder {
    fn on_message(&self, _conn: &Arc<ConnHandle>, msg: RawMsg) {
        let _ = self.0.send(msg);
    }
}

/// A fixed 4-byte header with a big-endian 2-byte length at offset 2 (not
/// counting the header itself) is decoded and the full header+body frame
/// is delivered as one inbound message.
#[test]
fn fixed_header_frame_delivers_full_bytes() {
    let descriptor = RawHeaderDescriptor::new(4, 2, 2, false, true).unwrap();
    let bind_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
    let (tx, rx) = mpsc::channel();
    let server = Arc::new(Server::with_header_descriptor(bind_addr, Arc::new(Recorder(tx)), Some(descriptor)));
    server.start().unwrap();
    let addr = server.local_addr().unwrap();
    let server_run = thread::spawn({
        let server = server.clone();
        move || server.run()
    });

    let frame = [0xAA, 0xBB, 0x00, 0x03, b'f', b'o', b'o'];
    let mut peer = TcpStream::connect(addr).unwrap();
    peer.write_all(&frame).unwrap();

    let msg = rx.recv_timeout(Duration::from_secs(1)).expect("no inbound message within 1s");
    assert_eq!(msg.body(), &frame[..]);

    server.request_shutdown();
    server_run.join().unwrap();
}

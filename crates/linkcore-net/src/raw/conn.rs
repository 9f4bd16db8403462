use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

use crate::incoming::ConnId;
use crate::msg::{RawMsg, RAW_RECEIVE_BUFFER_SIZE};
use crate::raw_header::RawHeaderDescriptor;

enum RxState {
    /// No header descriptor configured: each successful read is delivered
    /// as one inbound message, whatever boundary the socket happened to
    /// hand back.
    Probe,
    Header { buf: Vec<u8>, have: usize },
    Body { header: Vec<u8>, body: Vec<u8>, have: usize },
}

enum StepResult {
    Done,
    Blocked,
    Err,
}

fn write_progress(stream: &mut TcpStream, bytes: &[u8], written: &mut usize) -> StepResult {
    while *written < bytes.len() {
        match stream.write(&bytes[*written..]) {
            Ok(0) => return StepResult::Err,
            Ok(n) => *written += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return StepResult::Blocked,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return StepResult::Err,
        }
    }
    StepResult::Done
}

fn read_exact_progress(stream: &mut TcpStream, buf: &mut [u8], have: &mut usize) -> StepResult {
    while *have < buf.len() {
        match stream.read(&mut buf[*have..]) {
            Ok(0) => return StepResult::Err,
            Ok(n) => *have += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return StepResult::Blocked,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return StepResult::Err,
        }
    }
    StepResult::Done
}

pub(crate) enum ConnOutcome {
    Idle,
    Messages(Vec<RawMsg>),
}

/// One TCP socket in raw mode: no handshake, no library-imposed framing
/// beyond an optional caller-supplied [`RawHeaderDescriptor`].
pub(crate) struct RawConn {
    stream: TcpStream,
    pub(crate) token: Token,
    pub(crate) id: ConnId,
    pub(crate) peer_addr: Option<SocketAddr>,
    descriptor: Option<RawHeaderDescriptor>,
    rx: RxState,
    closed: bool,
    tx_queue: VecDeque<RawMsg>,
    tx_offset: usize,
}

impl RawConn {
    pub(crate) fn new(stream: TcpStream, peer_addr: Option<SocketAddr>, descriptor: Option<RawHeaderDescriptor>) -> Self {
        let rx = match descriptor {
            Some(d) => RxState::Header { buf: vec![0; d.header_size()], have: 0 },
            None => RxState::Probe,
        };
        Self {
            stream,
            token: Token(0),
            id: 0,
            peer_addr,
            descriptor,
            rx,
            closed: false,
            tx_queue: VecDeque::new(),
            tx_offset: 0,
        }
    }

    pub(crate) fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        self.token = token;
        registry.register(&mut self.stream, token, Interest::READABLE | Interest::WRITABLE)
    }

    pub(crate) fn deregister(&mut self, registry: &Registry) {
        let _ = registry.deregister(&mut self.stream);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn force_close(&mut self) {
        self.closed = true;
        self.tx_queue.clear();
    }

    pub(crate) fn enqueue(&mut self, msg: RawMsg) {
        if self.closed {
            return;
        }
        self.tx_queue.push_back(msg);
        self.drain_writes();
    }

    pub(crate) fn on_readable(&mut self) -> ConnOutcome {
        if self.closed {
            return ConnOutcome::Idle;
        }
        match self.descriptor {
            Some(_) => self.drain_reads_framed(),
            None => self.drain_reads_probe(),
        }
    }

    pub(crate) fn on_writable(&mut self) -> ConnOutcome {
        if !self.closed {
            self.drain_writes();
        }
        ConnOutcome::Idle
    }

    fn drain_reads_probe(&mut self) -> ConnOutcome {
        let mut messages = Vec::new();
        loop {
            let mut buf = vec![0u8; RAW_RECEIVE_BUFFER_SIZE];
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    self.closed = true;
                    break;
                }
                Ok(n) => {
                    buf.truncate(n);
                    messages.push(RawMsg::from_bytes(buf));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.closed = true;
                    break;
                }
            }
        }
        if messages.is_empty() {
            ConnOutcome::Idle
        } else {
            ConnOutcome::Messages(messages)
        }
    }

    fn drain_reads_framed(&mut self) -> ConnOutcome {
        let descriptor = self.descriptor.expect("drain_reads_framed only called with a descriptor");
        let mut messages = Vec::new();
        loop {
            let rx = std::mem::replace(&mut self.rx, RxState::Probe);
            match rx {
                RxState::Header { mut buf, mut have } => {
                    match read_exact_progress(&mut self.stream, &mut buf, &mut have) {
                        StepResult::Done => {
                            let body_len = descriptor.remaining_body_len(&buf);
                            if body_len == 0 {
                                messages.push(RawMsg::from_bytes(buf));
                                self.rx = RxState::Header { buf: vec![0; descriptor.header_size()], have: 0 };
                            } else {
                                self.rx = RxState::Body { header: buf, body: vec![0; body_len], have: 0 };
                            }
                        }
                        StepResult::Blocked => {
                            self.rx = RxState::Header { buf, have };
                            break;
                        }
                        StepResult::Err => {
                            self.closed = true;
                            break;
                        }
                    }
                }
                RxState::Body { header, mut body, mut have } => {
                    match read_exact_progress(&mut self.stream, &mut body, &mut have) {
                        StepResult::Done => {
                            let mut frame = header;
                            frame.extend_from_slice(&body);
                            messages.push(RawMsg::from_bytes(frame));
                            self.rx = RxState::Header { buf: vec![0; descriptor.header_size()], have: 0 };
                        }
                        StepResult::Blocked => {
                            self.rx = RxState::Body { header, body, have };
                            break;
                        }
                        StepResult::Err => {
                            self.closed = true;
                            break;
                        }
                    }
                }
                RxState::Probe => unreachable!("descriptor is Some, rx never set to Probe"),
            }
        }
        if messages.is_empty() {
            ConnOutcome::Idle
        } else {
            ConnOutcome::Messages(messages)
        }
    }

    fn drain_writes(&mut self) {
        loop {
            let Some(front) = self.tx_queue.front() else { return };
            let bytes = front.body();
            match write_progress(&mut self.stream, bytes, &mut self.tx_offset) {
                StepResult::Done => {
                    self.tx_queue.pop_front();
                    self.tx_offset = 0;
                    continue;
                }
                StepResult::Blocked => return,
                StepResult::Err => {
                    self.closed = true;
                    self.tx_queue.clear();
                    self.tx_offset = 0;
                    return;
                }
            }
        }
    }
}

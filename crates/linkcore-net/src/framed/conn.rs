use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

use crate::handshake::{draw_nonce, transform};
use crate::incoming::ConnId;
use crate::msg::{FramedMsg, FRAMED_HEADER_SIZE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

enum RxState {
    Header { buf: [u8; FRAMED_HEADER_SIZE], have: usize },
    Body { msg_type: u32, body: Vec<u8>, have: usize },
}

/// Handshake steps; `Reading` is the steady state entered once the
/// handshake succeeds.
enum Phase {
    ServerWriteNonce { written: usize },
    ServerReadResponse { buf: [u8; 8], have: usize },
    ServerWriteConfirm { written: usize },
    ClientReadNonce { buf: [u8; 8], have: usize },
    ClientWriteResponse { written: usize },
    ClientReadConfirm { buf: [u8; 8], have: usize },
    Reading(RxState),
    Closed,
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

fn read_progress(stream: &mut TcpStream, buf: &mut [u8], have: &mut usize) -> StepResult {
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
    Connected,
    Messages(Vec<FramedMsg>),
}

/// One TCP socket plus the framed-mode state machine: handshake, then the
/// header/body read loop and the outbound-queue write loop.
pub(crate) struct FramedConn {
    pub(crate) stream: TcpStream,
    pub(crate) token: Token,
    pub(crate) role: Role,
    pub(crate) id: ConnId,
    pub(crate) peer_addr: Option<SocketAddr>,
    started_at: linkcore_time::Instant,
    phase: Phase,
    hs_value: u64,
    hs_expect: u64,
    tx_queue: VecDeque<FramedMsg>,
    tx_buf: Vec<u8>,
    tx_offset: usize,
}

impl FramedConn {
    pub(crate) fn new_server(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        let nonce_out = draw_nonce();
        Self {
            stream,
            token: Token(0),
            role: Role::Server,
            id: 0,
            peer_addr: Some(peer_addr),
            started_at: linkcore_time::Instant::now(),
            phase: Phase::ServerWriteNonce { written: 0 },
            hs_value: nonce_out,
            hs_expect: transform(nonce_out),
            tx_queue: VecDeque::new(),
            tx_buf: Vec::new(),
            tx_offset: 0,
        }
    }

    pub(crate) fn new_client(stream: TcpStream) -> Self {
        Self {
            stream,
            token: Token(0),
            role: Role::Client,
            id: 0,
            peer_addr: None,
            started_at: linkcore_time::Instant::now(),
            phase: Phase::ClientReadNonce { buf: [0; 8], have: 0 },
            hs_value: 0,
            hs_expect: 0,
            tx_queue: VecDeque::new(),
            tx_buf: Vec::new(),
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
        matches!(self.phase, Phase::Closed)
    }

    pub(crate) fn is_handshaking(&self) -> bool {
        !matches!(self.phase, Phase::Reading(_) | Phase::Closed)
    }

    pub(crate) fn handshake_age(&self) -> linkcore_time::Duration {
        self.started_at.elapsed()
    }

    pub(crate) fn force_close(&mut self) {
        self.phase = Phase::Closed;
        self.tx_queue.clear();
    }

    pub(crate) fn enqueue(&mut self, msg: FramedMsg) {
        if self.is_closed() {
            return;
        }
        self.tx_queue.push_back(msg);
        if matches!(self.phase, Phase::Reading(_)) {
            self.drain_writes();
        }
    }

    pub(crate) fn on_readable(&mut self) -> ConnOutcome {
        let phase = std::mem::replace(&mut self.phase, Phase::Closed);
        match phase {
            Phase::ServerReadResponse { mut buf, mut have } => {
                match read_progress(&mut self.stream, &mut buf, &mut have) {
                    StepResult::Done => {
                        let value = u64::from_ne_bytes(buf);
                        if value == self.hs_expect {
                            self.hs_value = self.hs_expect;
                            self.phase = Phase::ServerWriteConfirm { written: 0 };
                        } else {
                            tracing::debug!(token = ?self.token, "handshake response mismatch, closing");
                            self.phase = Phase::Closed;
                        }
                    }
                    StepResult::Blocked => self.phase = Phase::ServerReadResponse { buf, have },
                    StepResult::Err => self.phase = Phase::Closed,
                }
                ConnOutcome::Idle
            }
            Phase::ClientReadNonce { mut buf, mut have } => {
                match read_progress(&mut self.stream, &mut buf, &mut have) {
                    StepResult::Done => {
                        let nonce_in = u64::from_ne_bytes(buf);
                        self.hs_value = transform(nonce_in);
                        self.hs_expect = self.hs_value;
                        self.phase = Phase::ClientWriteResponse { written: 0 };
                    }
                    StepResult::Blocked => self.phase = Phase::ClientReadNonce { buf, have },
                    StepResult::Err => self.phase = Phase::Closed,
                }
                ConnOutcome::Idle
            }
            Phase::ClientReadConfirm { mut buf, mut have } => {
                match read_progress(&mut self.stream, &mut buf, &mut have) {
                    StepResult::Done => {
                        let confirm = u64::from_ne_bytes(buf);
                        if confirm == self.hs_expect {
                            self.phase =
                                Phase::Reading(RxState::Header { buf: [0; FRAMED_HEADER_SIZE], have: 0 });
                            self.drain_writes();
                            return ConnOutcome::Connected;
                        }
                        tracing::debug!(token = ?self.token, "handshake confirmation mismatch, closing");
                        self.phase = Phase::Closed;
                    }
                    StepResult::Blocked => self.phase = Phase::ClientReadConfirm { buf, have },
                    StepResult::Err => self.phase = Phase::Closed,
                }
                ConnOutcome::Idle
            }
            Phase::Reading(rx) => {
                self.phase = Phase::Reading(rx);
                self.drain_reads()
            }
            other => {
                self.phase = other;
                ConnOutcome::Idle
            }
        }
    }

    pub(crate) fn on_writable(&mut self) -> ConnOutcome {
        let phase = std::mem::replace(&mut self.phase, Phase::Closed);
        match phase {
            Phase::ServerWriteNonce { mut written } => {
                let bytes = self.hs_value.to_ne_bytes();
                match write_progress(&mut self.stream, &bytes, &mut written) {
                    StepResult::Done => self.phase = Phase::ServerReadResponse { buf: [0; 8], have: 0 },
                    StepResult::Blocked => self.phase = Phase::ServerWriteNonce { written },
                    StepResult::Err => self.phase = Phase::Closed,
                }
                ConnOutcome::Idle
            }
            Phase::ServerWriteConfirm { mut written } => {
                let bytes = self.hs_value.to_ne_bytes();
                match write_progress(&mut self.stream, &bytes, &mut written) {
                    StepResult::Done => {
                        self.phase =
                            Phase::Reading(RxState::Header { buf: [0; FRAMED_HEADER_SIZE], have: 0 });
                        self.drain_writes();
                        return ConnOutcome::Connected;
                    }
                    StepResult::Blocked => self.phase = Phase::ServerWriteConfirm { written },
                    StepResult::Err => self.phase = Phase::Closed,
                }
                ConnOutcome::Idle
            }
            Phase::ClientWriteResponse { mut written } => {
                let bytes = self.hs_value.to_ne_bytes();
                match write_progress(&mut self.stream, &bytes, &mut written) {
                    StepResult::Done => self.phase = Phase::ClientReadConfirm { buf: [0; 8], have: 0 },
                    StepResult::Blocked => self.phase = Phase::ClientWriteResponse { written },
                    StepResult::Err => self.phase = Phase::Closed,
                }
                ConnOutcome::Idle
            }
            Phase::Reading(rx) => {
                self.phase = Phase::Reading(rx);
                self.drain_writes();
                ConnOutcome::Idle
            }
            other => {
                self.phase = other;
                ConnOutcome::Idle
            }
        }
    }

    fn drain_reads(&mut self) -> ConnOutcome {
        let mut messages = Vec::new();
        loop {
            let phase = std::mem::replace(&mut self.phase, Phase::Closed);
            let Phase::Reading(rx) = phase else {
                self.phase = phase;
                break;
            };
            match rx {
                RxState::Header { mut buf, mut have } => {
                    match read_progress(&mut self.stream, &mut buf, &mut have) {
                        StepResult::Done => {
                            let msg_type = u32::from_le_bytes(buf[0..4].try_into().unwrap());
                            let size = u32::from_le_bytes(buf[4..8].try_into().unwrap());
                            let body_len = size.saturating_sub(FRAMED_HEADER_SIZE as u32) as usize;
                            if body_len == 0 {
                                messages.push(FramedMsg::from_parts(msg_type, Vec::new()));
                                self.phase =
                                    Phase::Reading(RxState::Header { buf: [0; FRAMED_HEADER_SIZE], have: 0 });
                            } else {
                                self.phase =
                                    Phase::Reading(RxState::Body { msg_type, body: vec![0; body_len], have: 0 });
                            }
                        }
                        StepResult::Blocked => {
                            self.phase = Phase::Reading(RxState::Header { buf, have });
                            break;
                        }
                        StepResult::Err => {
                            self.phase = Phase::Closed;
                            break;
                        }
                    }
                }
                RxState::Body { msg_type, mut body, mut have } => {
                    match read_progress(&mut self.stream, &mut body, &mut have) {
                        StepResult::Done => {
                            messages.push(FramedMsg::from_parts(msg_type, body));
                            self.phase =
                                Phase::Reading(RxState::Header { buf: [0; FRAMED_HEADER_SIZE], have: 0 });
                        }
                        StepResult::Blocked => {
                            self.phase = Phase::Reading(RxState::Body { msg_type, body, have });
                            break;
                        }
                        StepResult::Err => {
                            self.phase = Phase::Closed;
                            break;
                        }
                    }
                }
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
            if self.tx_offset >= self.tx_buf.len() {
                self.tx_buf.clear();
                self.tx_offset = 0;
                match self.tx_queue.pop_front() {
                    Some(msg) => self.tx_buf = msg.to_wire(),
                    None => return,
                }
            }
            match write_progress(&mut self.stream, &self.tx_buf, &mut self.tx_offset) {
                StepResult::Done => continue,
                StepResult::Blocked => return,
                StepResult::Err => {
                    self.phase = Phase::Closed;
                    self.tx_queue.clear();
                    return;
                }
            }
        }
    }
}

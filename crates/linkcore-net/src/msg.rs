use bytemuck::Pod;

/// `type: u32` + `size: u32`, little-endian on the wire.
pub const FRAMED_HEADER_SIZE: usize = 8;

/// Size of a raw-mode receive probe when no header descriptor is
/// configured.
pub const RAW_RECEIVE_BUFFER_SIZE: usize = 1024;

/// A framed message: a `type` tag plus an opaque body, with `size` kept in
/// sync with `FRAMED_HEADER_SIZE + body.len()`.
///
/// Endianness and field layout inside the body are the caller's concern;
/// this type only guarantees the size invariant and LIFO/head-copy
/// append/extract semantics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FramedMsg {
    msg_type: u32,
    body: Vec<u8>,
}

impl FramedMsg {
    pub fn new(msg_type: u32) -> Self {
        Self { msg_type, body: Vec::new() }
    }

    pub fn with_body(msg_type: u32, body: Vec<u8>) -> Self {
        Self { msg_type, body }
    }

    pub fn msg_type(&self) -> u32 {
        self.msg_type
    }

    pub fn set_msg_type(&mut self, msg_type: u32) {
        self.msg_type = msg_type;
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// `size` field as it would appear on the wire: header plus body.
    pub fn size(&self) -> u32 {
        FRAMED_HEADER_SIZE as u32 + self.body.len() as u32
    }

    /// Appends the raw bit pattern of a trivially-copyable value.
    pub fn append<T: Pod>(&mut self, value: T) {
        self.body.extend_from_slice(bytemuck::bytes_of(&value));
    }

    /// Appends a contiguous sequence of trivially-copyable values.
    pub fn append_seq<T: Pod>(&mut self, values: &[T]) {
        self.body.extend_from_slice(bytemuck::cast_slice(values));
    }

    pub fn append_str(&mut self, s: &str) {
        self.body.extend_from_slice(s.as_bytes());
    }

    /// Reads the trailing `size_of::<T>()` bytes into `value` and truncates
    /// the body by that many bytes. Returns `false` (leaving `value`
    /// untouched) if the body is shorter than `size_of::<T>()`.
    pub fn extract<T: Pod>(&mut self, value: &mut T) -> bool {
        let n = std::mem::size_of::<T>();
        if self.body.len() < n {
            return false;
        }
        let split = self.body.len() - n;
        *value = bytemuck::pod_read_unaligned(&self.body[split..]);
        self.body.truncate(split);
        true
    }

    /// Copies `len` bytes from the head as a UTF-8 string, then drops them
    /// from the front of the body.
    pub fn extract_str(&mut self, len: usize) -> Option<String> {
        if self.body.len() < len {
            return None;
        }
        let s = String::from_utf8(self.body[..len].to_vec()).ok()?;
        self.body.drain(..len);
        Some(s)
    }

    pub fn extract_seq<T: Pod>(&mut self, count: usize) -> Option<Vec<T>> {
        let n = count * std::mem::size_of::<T>();
        if self.body.len() < n {
            return None;
        }
        let xs = bytemuck::pod_collect_to_vec(&self.body[..n]);
        self.body.drain(..n);
        Some(xs)
    }

    pub(crate) fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAMED_HEADER_SIZE + self.body.len());
        out.extend_from_slice(&self.msg_type.to_le_bytes());
        out.extend_from_slice(&self.size().to_le_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    pub(crate) fn from_parts(msg_type: u32, body: Vec<u8>) -> Self {
        Self { msg_type, body }
    }
}

/// A raw message: just an ordered byte sequence, no header bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawMsg {
    body: Vec<u8>,
}

impl RawMsg {
    pub fn new() -> Self {
        Self { body: Vec::new() }
    }

    pub fn from_bytes(body: Vec<u8>) -> Self {
        Self { body }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn full_size(&self) -> usize {
        self.body.len()
    }

    pub fn append<T: Pod>(&mut self, value: T) {
        self.body.extend_from_slice(bytemuck::bytes_of(&value));
    }

    pub fn append_str(&mut self, s: &str) {
        self.body.extend_from_slice(s.as_bytes());
    }

    pub fn extract<T: Pod>(&mut self, value: &mut T) -> bool {
        let n = std::mem::size_of::<T>();
        if self.body.len() < n {
            return false;
        }
        let split = self.body.len() - n;
        *value = bytemuck::pod_read_unaligned(&self.body[split..]);
        self.body.truncate(split);
        true
    }

    pub fn extract_str(&mut self, len: usize) -> Option<String> {
        if self.body.len() < len {
            return None;
        }
        let s = String::from_utf8(self.body[..len].to_vec()).ok()?;
        self.body.drain(..len);
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_updates_size_invariant() {
        let mut m = FramedMsg::new(7);
        assert_eq!(m.size() as usize, FRAMED_HEADER_SIZE);
        m.append(42u32);
        assert_eq!(m.size() as usize, FRAMED_HEADER_SIZE + m.body().len());
        assert_eq!(m.body().len(), 4);
    }

    #[test]
    fn append_then_extract_round_trips_and_restores_len() {
        let mut m = FramedMsg::new(1);
        let before = m.body().len();
        m.append(1234u64);
        let mut out = 0u64;
        assert!(m.extract(&mut out));
        assert_eq!(out, 1234);
        assert_eq!(m.body().len(), before);
        assert_eq!(m.size() as usize, FRAMED_HEADER_SIZE + before);
    }

    #[test]
    fn extract_str_reads_from_head() {
        let mut m = FramedMsg::new(0);
        m.append_str("ping");
        m.append(99u32);
        assert_eq!(m.extract_str(4), Some("ping".to_string()));
        let mut tail = 0u32;
        assert!(m.extract(&mut tail));
        assert_eq!(tail, 99);
    }

    #[test]
    fn raw_msg_full_size_is_body_len() {
        let mut m = RawMsg::new();
        m.append_str("foo");
        assert_eq!(m.full_size(), 3);
    }
}

use thiserror::Error;

/// Invalid combination of raw-mode header parameters.
#[derive(Clone, Copy, Debug, Error)]
pub enum RawHeaderError {
    #[error("header_size must be greater than zero")]
    ZeroHeaderSize,

    #[error("length_size must be 1, 2, or 4 bytes, got {0}")]
    InvalidLengthSize(u8),

    #[error(
        "length field at offset {offset} (size {size}) does not fit within header_size {header_size}"
    )]
    LengthFieldOutOfBounds { offset: usize, size: u8, header_size: usize },
}

/// Describes a third-party length-prefixed header so the raw read loop can
/// delineate messages on the caller's behalf.
///
/// `None` means no descriptor is configured: the raw loop just probes for
/// up to `RAW_RECEIVE_BUFFER_SIZE` bytes per read.
#[derive(Clone, Copy, Debug)]
pub struct RawHeaderDescriptor {
    header_size: usize,
    length_offset: usize,
    length_size: u8,
    length_includes_header: bool,
    big_endian_length: bool,
}

impl RawHeaderDescriptor {
    pub fn new(
        header_size: usize,
        length_offset: usize,
        length_size: u8,
        length_includes_header: bool,
        big_endian_length: bool,
    ) -> Result<Self, RawHeaderError> {
        if header_size == 0 {
            return Err(RawHeaderError::ZeroHeaderSize);
        }
        if !matches!(length_size, 1 | 2 | 4) {
            return Err(RawHeaderError::InvalidLengthSize(length_size));
        }
        if length_offset + length_size as usize > header_size {
            return Err(RawHeaderError::LengthFieldOutOfBounds {
                offset: length_offset,
                size: length_size,
                header_size,
            });
        }
        Ok(Self { header_size, length_offset, length_size, length_includes_header, big_endian_length })
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    /// Number of bytes still to read after the header, given the already
    /// read `header` buffer (must be exactly `header_size` long).
    pub fn remaining_body_len(&self, header: &[u8]) -> usize {
        let field = &header[self.length_offset..self.length_offset + self.length_size as usize];
        let raw_len: u64 = match self.length_size {
            1 => field[0] as u64,
            2 => {
                let b: [u8; 2] = field.try_into().expect("slice is length_size bytes");
                if self.big_endian_length { u16::from_be_bytes(b) as u64 } else { u16::from_le_bytes(b) as u64 }
            }
            4 => {
                let b: [u8; 4] = field.try_into().expect("slice is length_size bytes");
                if self.big_endian_length { u32::from_be_bytes(b) as u64 } else { u32::from_le_bytes(b) as u64 }
            }
            _ => unreachable!("validated in new()"),
        };
        let total = raw_len as usize;
        if self.length_includes_header {
            total.saturating_sub(self.header_size)
        } else {
            total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_length_field_past_header_bound() {
        assert!(matches!(
            RawHeaderDescriptor::new(4, 3, 4, false, true),
            Err(RawHeaderError::LengthFieldOutOfBounds { .. })
        ));
    }

    #[test]
    fn rejects_bad_length_size() {
        assert!(matches!(RawHeaderDescriptor::new(4, 0, 3, false, true), Err(RawHeaderError::InvalidLengthSize(3))));
    }

    #[test]
    fn decodes_big_endian_length_not_including_header() {
        let d = RawHeaderDescriptor::new(4, 2, 2, false, true).unwrap();
        let header = [0xAA, 0xBB, 0x00, 0x03];
        assert_eq!(d.remaining_body_len(&header), 3);
    }
}

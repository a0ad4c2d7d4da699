//! Helpers for the protocol's fixed wire byte order.
//!
//! Every numeric header field is little-endian regardless of the negotiated
//! protocol version. Keeping the conversions here means header code never
//! spells out an endianness at the call site.

/// Serialise a `u32` in wire byte order (little-endian).
///
/// # Examples
///
/// ```
/// use vstream::byte_order::write_wire_u32;
///
/// assert_eq!(write_wire_u32(0x1234_5678), [0x78, 0x56, 0x34, 0x12]);
/// ```
#[must_use]
pub fn write_wire_u32(value: u32) -> [u8; 4] { value.to_le_bytes() }

/// Parse a wire-order `u32`.
///
/// # Examples
///
/// ```
/// use vstream::byte_order::read_wire_u32;
///
/// assert_eq!(read_wire_u32([0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
/// ```
#[must_use]
pub fn read_wire_u32(bytes: [u8; 4]) -> u32 { u32::from_le_bytes(bytes) }

/// Serialise a `u64` in wire byte order (little-endian).
///
/// # Examples
///
/// ```
/// use vstream::byte_order::write_wire_u64;
///
/// assert_eq!(
///     write_wire_u64(0x1122_3344_5566_7788),
///     [0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]
/// );
/// ```
#[must_use]
pub fn write_wire_u64(value: u64) -> [u8; 8] { value.to_le_bytes() }

/// Parse a wire-order `u64`.
#[must_use]
pub fn read_wire_u64(bytes: [u8; 8]) -> u64 { u64::from_le_bytes(bytes) }

/// Read a wire-order `u32` starting at `offset`, or `None` if `buf` is too short.
#[must_use]
pub fn read_wire_u32_at(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset.checked_add(4)?)?;
    bytes.try_into().ok().map(read_wire_u32)
}

/// Read a wire-order `u64` starting at `offset`, or `None` if `buf` is too short.
#[must_use]
pub fn read_wire_u64_at(buf: &[u8], offset: usize) -> Option<u64> {
    let bytes = buf.get(offset..offset.checked_add(8)?)?;
    bytes.try_into().ok().map(read_wire_u64)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{read_wire_u32_at, read_wire_u64_at, write_wire_u32, write_wire_u64};

    #[rstest]
    #[case(0, Some(0x0403_0201))]
    #[case(4, Some(0x0807_0605))]
    #[case(5, None)]
    #[case(usize::MAX, None)]
    fn reads_u32_at_offset(#[case] offset: usize, #[case] expected: Option<u32>) {
        let buf = [1_u8, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(read_wire_u32_at(&buf, offset), expected);
    }

    #[test]
    fn reads_u64_written_at_offset() {
        let mut buf = write_wire_u32(7).to_vec();
        buf.extend_from_slice(&write_wire_u64(0xDEAD_BEEF_0000_0001));
        assert_eq!(read_wire_u64_at(&buf, 4), Some(0xDEAD_BEEF_0000_0001));
        assert_eq!(read_wire_u64_at(&buf, 5), None);
    }
}

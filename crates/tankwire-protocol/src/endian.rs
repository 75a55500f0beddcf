//! Big-endian integer access at fixed offsets.
//!
//! Appending writes go through `bytes::BufMut` (`put_u16`, `put_u32`), which
//! is already network byte order. What `BufMut` can't do is peek a field in
//! the middle of a buffer without consuming it, or patch a field after the
//! fact. The frame decoder needs the former to read the declared body length
//! before a whole frame has arrived, and the encoder needs the latter to
//! backfill the checksum.
//!
//! Every function returns `None` instead of panicking when the requested
//! range runs past the end of the slice.

/// Reads a big-endian `u16` starting at `offset`.
pub fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let end = offset.checked_add(2)?;
    let bytes: [u8; 2] = buf.get(offset..end)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

/// Reads a big-endian `u32` starting at `offset`.
pub fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    let bytes: [u8; 4] = buf.get(offset..end)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Writes `value` as a big-endian `u16` at `offset`.
pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) -> Option<()> {
    let end = offset.checked_add(2)?;
    buf.get_mut(offset..end)?.copy_from_slice(&value.to_be_bytes());
    Some(())
}

/// Writes `value` as a big-endian `u32` at `offset`.
pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) -> Option<()> {
    let end = offset.checked_add(4)?;
    buf.get_mut(offset..end)?.copy_from_slice(&value.to_be_bytes());
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32_is_big_endian() {
        let buf = [0x00, 0x12, 0x34, 0x56, 0x78];
        assert_eq!(read_u32(&buf, 1), Some(0x1234_5678));
    }

    #[test]
    fn test_read_u16_is_big_endian() {
        let buf = [0xab, 0xcd];
        assert_eq!(read_u16(&buf, 0), Some(0xabcd));
    }

    #[test]
    fn test_reads_past_end_return_none() {
        let buf = [0u8; 5];
        assert_eq!(read_u32(&buf, 2), None);
        assert_eq!(read_u16(&buf, 4), None);
        assert_eq!(read_u32(&buf, usize::MAX), None);
    }

    #[test]
    fn test_write_then_read_at_offset() {
        let mut buf = [0u8; 8];
        write_u32(&mut buf, 3, 0xcafe_f00d).unwrap();
        assert_eq!(buf, [0, 0, 0, 0xca, 0xfe, 0xf0, 0x0d, 0]);
        assert_eq!(read_u32(&buf, 3), Some(0xcafe_f00d));

        write_u16(&mut buf, 0, 0x0102).unwrap();
        assert_eq!(&buf[..2], &[0x01, 0x02]);
    }

    #[test]
    fn test_write_past_end_leaves_buffer_untouched() {
        let mut buf = [7u8; 3];
        assert_eq!(write_u32(&mut buf, 0, 1), None);
        assert_eq!(buf, [7, 7, 7]);
    }
}

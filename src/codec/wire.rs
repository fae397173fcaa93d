//! Byte-level helpers shared by the packer, the loader and the type library format.
//!
//! Packed data is little endian. The in-memory layout uses the host byte order,
//! so the layout-aware helpers take a [`LayoutKind`].

use crate::error::{DlError, Result};
use crate::types::{LayoutKind, TypeId};

/// Magic of a packed instance, "DLDL".
pub const INSTANCE_MAGIC: u32 = u32::from_le_bytes(*b"DLDL");
/// Magic of a binary type library, "DLTL".
pub const LIBRARY_MAGIC: u32 = u32::from_le_bytes(*b"DLTL");
/// Current version of both formats.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the packed instance header.
pub const SIZEOF_HEADER: usize = 16;
/// Size of a packed dynamic slot: `offset u32, count u32`.
pub const SIZEOF_PACKED_SLOT: usize = 8;
/// Size of a native dynamic slot: `address usize, count u32`, padded.
pub const SIZEOF_NATIVE_SLOT: usize = align_up(SIZEOF_PTR + 4, SIZEOF_PTR);
pub const SIZEOF_PTR: usize = std::mem::size_of::<usize>();

/// Round `v` up to a multiple of `align` (a power of two, or 1).
#[inline]
pub const fn align_up(v: usize, align: usize) -> usize {
    (v + align - 1) & !(align - 1)
}

/// Size and alignment of a dynamic slot in `layout`.
#[inline]
pub fn slot_footprint(layout: LayoutKind) -> (usize, usize) {
    match layout {
        LayoutKind::Packed => (SIZEOF_PACKED_SLOT, 4),
        LayoutKind::Native => (SIZEOF_NATIVE_SLOT, SIZEOF_PTR),
    }
}

/// Read a 16-bit unsigned integer from a little-endian byte slice.
#[inline]
pub fn read_u16_le(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}

/// Read a 32-bit unsigned integer from a little-endian byte slice.
#[inline]
pub fn read_u32_le(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Read a 64-bit unsigned integer from a little-endian byte slice.
#[inline]
pub fn read_u64_le(buf: &[u8]) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[..8]);
    u64::from_le_bytes(b)
}

/// Write a 16-bit unsigned integer in little-endian.
#[inline]
pub fn write_u16_le(buf: &mut [u8], val: u16) {
    buf[..2].copy_from_slice(&val.to_le_bytes());
}

/// Write a 32-bit unsigned integer in little-endian.
#[inline]
pub fn write_u32_le(buf: &mut [u8], val: u32) {
    buf[..4].copy_from_slice(&val.to_le_bytes());
}

/// Write a 64-bit unsigned integer in little-endian.
#[inline]
pub fn write_u64_le(buf: &mut [u8], val: u64) {
    buf[..8].copy_from_slice(&val.to_le_bytes());
}

/// Read an unsigned integer of `bytes.len()` (1 to 8) bytes in the byte order of `layout`.
#[inline]
pub fn read_uint(bytes: &[u8], layout: LayoutKind) -> u64 {
    let n = bytes.len();
    let mut b = [0u8; 8];
    if layout == LayoutKind::Native && cfg!(target_endian = "big") {
        b[8 - n..].copy_from_slice(bytes);
        u64::from_be_bytes(b)
    } else {
        b[..n].copy_from_slice(bytes);
        u64::from_le_bytes(b)
    }
}

/// Write the low `bytes.len()` bytes of `val` in the byte order of `layout`.
#[inline]
pub fn write_uint(bytes: &mut [u8], val: u64, layout: LayoutKind) {
    let n = bytes.len();
    if layout == LayoutKind::Native && cfg!(target_endian = "big") {
        bytes.copy_from_slice(&val.to_be_bytes()[8 - n..]);
    } else {
        bytes.copy_from_slice(&val.to_le_bytes()[..n]);
    }
}

/// Write a dynamic slot at `at`.
///
/// `offset` is relative to the start of the instance region. Packed slots store it
/// as is; native slots store `base + offset`. Empty payloads store zeros in both.
pub fn write_slot(
    buf: &mut [u8],
    at: usize,
    layout: LayoutKind,
    base: usize,
    offset: usize,
    count: u32,
) {
    let (slot_size, _) = slot_footprint(layout);
    let slot = &mut buf[at..at + slot_size];
    slot.fill(0);
    if count == 0 {
        return;
    }
    match layout {
        LayoutKind::Packed => {
            write_u32_le(&mut slot[0..4], offset as u32);
            write_u32_le(&mut slot[4..8], count);
        }
        LayoutKind::Native => {
            let address = base.wrapping_add(offset);
            slot[..SIZEOF_PTR].copy_from_slice(&address.to_ne_bytes());
            slot[SIZEOF_PTR..SIZEOF_PTR + 4].copy_from_slice(&count.to_ne_bytes());
        }
    }
}

/// Read a dynamic slot at `at`, returning `(offset, count)` relative to the region start.
///
/// A native address below `base` is reported as corrupt; bounds of the payload are
/// checked by the caller.
pub fn read_slot(buf: &[u8], at: usize, layout: LayoutKind, base: usize) -> Result<(usize, u32)> {
    let (slot_size, _) = slot_footprint(layout);
    let slot = buf
        .get(at..at + slot_size)
        .ok_or_else(|| DlError::CorruptData(format!("slot at {} is out of bounds", at)))?;
    match layout {
        LayoutKind::Packed => Ok((read_u32_le(&slot[0..4]) as usize, read_u32_le(&slot[4..8]))),
        LayoutKind::Native => {
            let mut addr = [0u8; SIZEOF_PTR];
            addr.copy_from_slice(&slot[..SIZEOF_PTR]);
            let address = usize::from_ne_bytes(addr);
            let mut cnt = [0u8; 4];
            cnt.copy_from_slice(&slot[SIZEOF_PTR..SIZEOF_PTR + 4]);
            let count = u32::from_ne_bytes(cnt);
            if count == 0 {
                return Ok((0, 0));
            }
            let offset = address.checked_sub(base).ok_or_else(|| {
                DlError::CorruptData(format!("address {:#x} is outside the instance", address))
            })?;
            Ok((offset, count))
        }
    }
}

/// Header of a packed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceHeader {
    pub version: u32,
    pub root: TypeId,
    pub arena_size: u32,
}

impl InstanceHeader {
    pub fn write(&self, buf: &mut [u8]) {
        write_u32_le(&mut buf[0..4], INSTANCE_MAGIC);
        write_u32_le(&mut buf[4..8], self.version);
        write_u32_le(&mut buf[8..12], self.root.0);
        write_u32_le(&mut buf[12..16], self.arena_size);
    }

    /// Parse and validate the header of `packed`. Bytes after the arena are not
    /// part of the instance and are left alone.
    pub fn read(packed: &[u8]) -> Result<InstanceHeader> {
        if packed.len() < SIZEOF_HEADER {
            return Err(DlError::CorruptData(format!(
                "instance is {} bytes, shorter than its header",
                packed.len()
            )));
        }
        if read_u32_le(&packed[0..4]) != INSTANCE_MAGIC {
            return Err(DlError::CorruptData("bad instance magic".into()));
        }
        let version = read_u32_le(&packed[4..8]);
        if version != FORMAT_VERSION {
            return Err(DlError::CorruptData(format!("unsupported instance version {}", version)));
        }
        let header = InstanceHeader {
            version,
            root: TypeId(read_u32_le(&packed[8..12])),
            arena_size: read_u32_le(&packed[12..16]),
        };
        if header.arena_size as usize > packed.len() - SIZEOF_HEADER {
            return Err(DlError::CorruptData(format!(
                "header claims {} arena bytes, only {} follow",
                header.arena_size,
                packed.len() - SIZEOF_HEADER
            )));
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_u16() {
        let mut buf = [0u8; 2];
        write_u16_le(&mut buf, 0x1234);
        assert_eq!(buf, [0x34, 0x12]);
        assert_eq!(read_u16_le(&buf), 0x1234);
    }

    #[test]
    fn test_read_write_u32() {
        let mut buf = [0u8; 4];
        write_u32_le(&mut buf, 0x12345678);
        assert_eq!(buf, [0x78, 0x56, 0x34, 0x12]);
        assert_eq!(read_u32_le(&buf), 0x12345678);
    }

    #[test]
    fn test_read_write_u64() {
        let mut buf = [0u8; 8];
        write_u64_le(&mut buf, 0x123456789ABCDEF0);
        assert_eq!(read_u64_le(&buf), 0x123456789ABCDEF0);
    }

    #[test]
    fn test_uint_narrow_widths() {
        let mut buf = [0u8; 3];
        write_uint(&mut buf[..2], 0xBEEF, LayoutKind::Packed);
        assert_eq!(&buf[..2], &[0xEF, 0xBE]);
        assert_eq!(read_uint(&buf[..2], LayoutKind::Packed), 0xBEEF);

        write_uint(&mut buf[..1], 0x1FF, LayoutKind::Native);
        assert_eq!(read_uint(&buf[..1], LayoutKind::Native), 0xFF);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(13, 4), 16);
        assert_eq!(align_up(5, 1), 5);
    }

    #[test]
    fn test_native_slot_relative_to_base() {
        let mut buf = [0u8; 32];
        let base = 0x1000;
        write_slot(&mut buf, 0, LayoutKind::Native, base, 24, 3);
        assert_eq!(read_slot(&buf, 0, LayoutKind::Native, base).unwrap(), (24, 3));
        assert!(read_slot(&buf, 0, LayoutKind::Native, base + 0x100).is_err());
    }

    #[test]
    fn test_empty_slot_is_zero() {
        let mut buf = [0xAAu8; 8];
        write_slot(&mut buf, 0, LayoutKind::Packed, 0, 40, 0);
        assert_eq!(buf, [0u8; 8]);
    }

    #[test]
    fn test_header_validation() {
        let mut blob = vec![0u8; SIZEOF_HEADER + 4];
        InstanceHeader { version: FORMAT_VERSION, root: TypeId(7), arena_size: 4 }.write(&mut blob);
        assert_eq!(InstanceHeader::read(&blob).unwrap().root, TypeId(7));

        // trailing bytes belong to whatever follows the instance
        blob.push(0);
        assert_eq!(InstanceHeader::read(&blob).unwrap().arena_size, 4);

        assert!(InstanceHeader::read(&blob[..SIZEOF_HEADER + 3]).is_err());
        assert!(InstanceHeader::read(&blob[..10]).is_err());
    }
}

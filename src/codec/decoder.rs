//! Instance loader.
//!
//! Loading translates the packed arena straight into the in-memory layout,
//! walking the type descriptors: fixed members are copied with their byte
//! order adjusted and every dynamic slot is patched to an absolute address
//! inside the output buffer. A first pass validates and sizes, a second pass
//! writes, so a failing load never touches the output.

use std::collections::HashMap;

use crate::context::{Allocator, SystemAllocator};
use crate::error::{DlError, Result};
use crate::layout::{bit_mask, elem_footprint};
use crate::registry::TypeLibrary;
use crate::types::{ElemKind, LayoutKind, Member, MemberKind, ScalarKind, TypeDesc, TypeId};
use crate::value::Value;

use super::wire::*;

/// Nesting limit for dynamic payloads, guards the recursion on hostile input.
pub const MAX_DEPTH: usize = 512;

/// Header fields of a packed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceInfo {
    pub root: TypeId,
    pub arena_size: usize,
    pub version: u32,
}

impl InstanceInfo {
    /// Bytes the instance occupies, header included. Anything after that is
    /// not part of the instance.
    pub fn packed_size(&self) -> usize {
        SIZEOF_HEADER + self.arena_size
    }
}

/// Read the header of a packed instance without touching the arena.
pub fn instance_info(packed: &[u8]) -> Result<InstanceInfo> {
    let header = InstanceHeader::read(packed)?;
    Ok(InstanceInfo {
        root: header.root,
        arena_size: header.arena_size as usize,
        version: header.version,
    })
}

/// Check the header against `type_id` and return the root type and its arena.
fn open<'a>(
    lib: &'a TypeLibrary,
    type_id: TypeId,
    packed: &'a [u8],
) -> Result<(&'a TypeDesc, &'a [u8])> {
    let header = InstanceHeader::read(packed)?;
    if header.root != type_id {
        return Err(DlError::mismatch(
            "root",
            format!("type {}", type_id),
            format!("type {}", header.root),
        ));
    }
    let desc = lib.lookup(type_id)?;
    let arena = &packed[SIZEOF_HEADER..SIZEOF_HEADER + header.arena_size as usize];
    if arena.len() < desc.size(LayoutKind::Packed) {
        return Err(DlError::CorruptData(format!(
            "arena is {} bytes, '{}' needs {}",
            arena.len(),
            desc.name,
            desc.size(LayoutKind::Packed)
        )));
    }
    Ok((desc, arena))
}

/// Decode a packed instance of `type_id` into a [`Value`], validating every slot.
pub fn decode(lib: &TypeLibrary, type_id: TypeId, packed: &[u8]) -> Result<Value> {
    decode_with(lib, &SystemAllocator, type_id, packed)
}

/// [`decode`] with scratch memory from `alloc`.
pub fn decode_with(
    lib: &TypeLibrary,
    alloc: &dyn Allocator,
    type_id: TypeId,
    packed: &[u8],
) -> Result<Value> {
    let (desc, arena) = open(lib, type_id, packed)?;
    Reader::new(lib, LayoutKind::Packed, arena, 0, desc, alloc)?.read_struct(desc, 0, &desc.name)
}

/// Bytes the in-memory instance of `packed` needs.
pub fn load_size(lib: &TypeLibrary, type_id: TypeId, packed: &[u8]) -> Result<usize> {
    Ok(prepare(lib, &SystemAllocator, type_id, packed)?.native_size())
}

/// Load a packed instance into `out` in the in-memory layout.
///
/// Returns the number of bytes used.
pub fn load(lib: &TypeLibrary, type_id: TypeId, packed: &[u8], out: &mut [u8]) -> Result<usize> {
    load_with(lib, &SystemAllocator, type_id, packed, out)
}

/// [`load`] with scratch memory from `alloc`.
pub fn load_with(
    lib: &TypeLibrary,
    alloc: &dyn Allocator,
    type_id: TypeId,
    packed: &[u8],
    out: &mut [u8],
) -> Result<usize> {
    let prepared = prepare(lib, alloc, type_id, packed)?;
    let need = prepared.native_size();
    if out.len() < need {
        return Err(DlError::BufferTooSmall { need, have: out.len() });
    }
    prepared.write(&mut out[..need])
}

/// Validate `packed` and size its in-memory form.
pub fn prepare<'a>(
    lib: &'a TypeLibrary,
    alloc: &dyn Allocator,
    type_id: TypeId,
    packed: &'a [u8],
) -> Result<PreparedLoad<'a>> {
    let (desc, arena) = open(lib, type_id, packed)?;
    let claims = Claims::new(alloc, arena.len(), desc.size(LayoutKind::Packed))?;
    let mut pass = Translator {
        lib,
        src: arena,
        claims: Some(claims),
        out: None,
        base: 0,
        cursor: desc.size(LayoutKind::Native),
        depth: 0,
    };
    pass.translate_struct(desc, 0, 0, &desc.name)?;
    Ok(PreparedLoad {
        lib,
        desc,
        arena,
        native_size: pass.cursor,
    })
}

/// A packed instance that passed validation and is ready to be written out.
#[derive(Debug)]
pub struct PreparedLoad<'a> {
    lib: &'a TypeLibrary,
    desc: &'a TypeDesc,
    arena: &'a [u8],
    native_size: usize,
}

impl PreparedLoad<'_> {
    pub fn native_size(&self) -> usize {
        self.native_size
    }

    /// Write the in-memory instance into `out`, which must hold at least
    /// [`native_size`](Self::native_size) bytes. Slots point into `out`.
    pub fn write(&self, out: &mut [u8]) -> Result<usize> {
        let need = self.native_size;
        if out.len() < need {
            return Err(DlError::BufferTooSmall { need, have: out.len() });
        }
        let out = &mut out[..need];
        out.fill(0);
        let base = out.as_ptr() as usize;
        let mut pass = Translator {
            lib: self.lib,
            src: self.arena,
            claims: None,
            out: Some(out),
            base,
            cursor: self.desc.size(LayoutKind::Native),
            depth: 0,
        };
        pass.translate_struct(self.desc, 0, 0, &self.desc.name)?;
        debug_assert_eq!(pass.cursor, need);
        tracing::debug!(
            type_name = %self.desc.name,
            packed = self.arena.len() + SIZEOF_HEADER,
            native = need,
            "loaded instance"
        );
        Ok(need)
    }
}

/// Bitmap of the bytes of an instance region that are already accounted for.
/// Every payload is visited once, so a byte claimed twice means overlapping
/// or cyclic slots.
pub(crate) struct Claims {
    bits: Vec<u8>,
}

impl Claims {
    pub(crate) fn new(alloc: &dyn Allocator, region: usize, fixed: usize) -> Result<Claims> {
        let bytes = region.div_ceil(8);
        let bits = alloc.allocate(bytes)?;
        if bits.len() < bytes {
            return Err(DlError::AllocationFailure(bytes));
        }
        let mut claims = Claims { bits };
        claims.take(0, fixed);
        Ok(claims)
    }

    /// Mark `offset..offset + len`, which must lie inside the region.
    /// Returns false when any of the bytes was marked before.
    fn take(&mut self, offset: usize, len: usize) -> bool {
        let mut fresh = true;
        for i in offset..offset + len {
            let mask = 1u8 << (i % 8);
            fresh &= self.bits[i / 8] & mask == 0;
            self.bits[i / 8] |= mask;
        }
        fresh
    }
}

fn bounds<'a>(buf: &'a [u8], at: usize, len: usize) -> Result<&'a [u8]> {
    at.checked_add(len)
        .and_then(|end| buf.get(at..end))
        .ok_or_else(|| DlError::CorruptData(format!("{} bytes at {} are out of bounds", len, at)))
}

fn claim(
    claims: &mut Option<Claims>,
    buf: &[u8],
    offset: usize,
    len: usize,
    path: &str,
) -> Result<()> {
    bounds(buf, offset, len)?;
    if let Some(claims) = claims {
        if !claims.take(offset, len) {
            return Err(DlError::CorruptData(format!("payload of '{}' overlaps other data", path)));
        }
    }
    Ok(())
}

fn enter(depth: &mut usize, path: &str) -> Result<()> {
    *depth += 1;
    if *depth > MAX_DEPTH {
        return Err(DlError::CorruptData(format!("'{}' is nested too deeply", path)));
    }
    Ok(())
}

fn union_member<'d>(desc: &'d TypeDesc, tag: u32, path: &str) -> Result<&'d Member> {
    desc.member_by_tag(tag).ok_or_else(|| {
        DlError::CorruptData(format!("'{}' holds unknown union tag {:#x}", path, tag))
    })
}

fn bit_info(member: &Member, path: &str) -> Result<(u8, u8, usize)> {
    match (member.kind, member.bit) {
        (MemberKind::Bitfield { bits }, Some(info)) => {
            Ok((bits, info.bit_offset, info.storage as usize))
        }
        _ => Err(DlError::MalformedTypeLibrary(format!("bitfield '{}' has no layout", path))),
    }
}

/// Packed to native translation. Without `out` it only validates and
/// advances `cursor`; with `out` it writes what it walks.
struct Translator<'a, 'o> {
    lib: &'a TypeLibrary,
    src: &'a [u8],
    claims: Option<Claims>,
    out: Option<&'o mut [u8]>,
    base: usize,
    /// End of the native region reserved so far.
    cursor: usize,
    depth: usize,
}

impl Translator<'_, '_> {
    fn translate_struct(
        &mut self,
        desc: &TypeDesc,
        src: usize,
        dst: usize,
        path: &str,
    ) -> Result<()> {
        if desc.is_union {
            let raw = bounds(self.src, src + desc.tag_offset(LayoutKind::Packed), 4)?;
            let tag = read_uint(raw, LayoutKind::Packed) as u32;
            let member = union_member(desc, tag, path)?;
            let member_path = format!("{}.{}", path, member.name);
            self.translate_member(member, src, dst, &member_path)?;
            self.put_uint(dst + desc.tag_offset(LayoutKind::Native), 4, tag as u64);
            return Ok(());
        }
        for member in &desc.members {
            let member_path = format!("{}.{}", path, member.name);
            self.translate_member(
                member,
                src + member.offset(LayoutKind::Packed),
                dst + member.offset(LayoutKind::Native),
                &member_path,
            )?;
        }
        Ok(())
    }

    fn translate_member(
        &mut self,
        member: &Member,
        src: usize,
        dst: usize,
        path: &str,
    ) -> Result<()> {
        match member.kind {
            MemberKind::Bitfield { .. } => {
                let (bits, shift, storage) = bit_info(member, path)?;
                let raw = read_uint(bounds(self.src, src, storage)?, LayoutKind::Packed);
                let v = (raw >> shift) & bit_mask(bits);
                if let Some(out) = self.out.as_deref_mut() {
                    let group = &mut out[dst..dst + storage];
                    let mask = bit_mask(bits) << shift;
                    let cur = read_uint(group, LayoutKind::Native);
                    write_uint(group, (cur & !mask) | (v << shift), LayoutKind::Native);
                }
                Ok(())
            }
            MemberKind::InlineArray { elem, count } => {
                let (packed_size, _) = elem_footprint(self.lib, elem, LayoutKind::Packed)?;
                let (native_size, _) = elem_footprint(self.lib, elem, LayoutKind::Native)?;
                for i in 0..count as usize {
                    let item_path = format!("{}[{}]", path, i);
                    let (from, to) = (src + i * packed_size, dst + i * native_size);
                    self.translate_elem(elem, from, to, &item_path)?;
                }
                Ok(())
            }
            MemberKind::Array { elem } => {
                let (offset, count) = read_slot(self.src, src, LayoutKind::Packed, 0)?;
                if count == 0 {
                    self.put_slot(dst, 0, 0);
                    return Ok(());
                }
                let (packed_size, _) = elem_footprint(self.lib, elem, LayoutKind::Packed)?;
                let (native_size, native_align) =
                    elem_footprint(self.lib, elem, LayoutKind::Native)?;
                let len = (count as usize)
                    .checked_mul(packed_size)
                    .ok_or_else(|| DlError::CorruptData(format!("array '{}' is too large", path)))?;
                claim(&mut self.claims, self.src, offset, len, path)?;
                enter(&mut self.depth, path)?;

                let start = align_up(self.cursor, native_align);
                self.cursor = start + count as usize * native_size;
                self.put_slot(dst, start, count);
                for i in 0..count as usize {
                    let item_path = format!("{}[{}]", path, i);
                    let (from, to) = (offset + i * packed_size, start + i * native_size);
                    self.translate_elem(elem, from, to, &item_path)?;
                }
                self.depth -= 1;
                Ok(())
            }
            kind => match kind.as_elem() {
                Some(elem) => self.translate_elem(elem, src, dst, path),
                None => Err(DlError::MalformedTypeLibrary(format!(
                    "member '{}' has no element kind",
                    path
                ))),
            },
        }
    }

    fn translate_elem(&mut self, elem: ElemKind, src: usize, dst: usize, path: &str) -> Result<()> {
        match elem {
            ElemKind::Scalar(k) => {
                let n = k.size() as usize;
                let raw = read_uint(bounds(self.src, src, n)?, LayoutKind::Packed);
                self.put_uint(dst, n, raw);
            }
            ElemKind::Enum(id) => {
                let raw = read_uint(bounds(self.src, src, 4)?, LayoutKind::Packed) as u32;
                let desc = self.lib.lookup_enum(id)?;
                if desc.name_of(raw).is_none() {
                    return Err(DlError::CorruptData(format!(
                        "'{}' holds {}, not a value of {}",
                        path, raw, desc.name
                    )));
                }
                self.put_uint(dst, 4, raw as u64);
            }
            ElemKind::String => {
                let (offset, count) = read_slot(self.src, src, LayoutKind::Packed, 0)?;
                if count == 0 {
                    self.put_slot(dst, 0, 0);
                    return Ok(());
                }
                let len = count as usize;
                claim(&mut self.claims, self.src, offset, len + 1, path)?;
                let bytes = check_string(&self.src[offset..offset + len + 1], path)?;
                let start = self.cursor;
                self.cursor = start + len + 1;
                if let Some(out) = self.out.as_deref_mut() {
                    out[start..start + len].copy_from_slice(bytes.as_bytes());
                }
                self.put_slot(dst, start, count);
            }
            ElemKind::Struct(id) => {
                let desc = self.lib.lookup(id)?;
                self.translate_struct(desc, src, dst, path)?;
            }
        }
        Ok(())
    }

    fn put_uint(&mut self, at: usize, len: usize, v: u64) {
        if let Some(out) = self.out.as_deref_mut() {
            write_uint(&mut out[at..at + len], v, LayoutKind::Native);
        }
    }

    fn put_slot(&mut self, at: usize, offset: usize, count: u32) {
        if let Some(out) = self.out.as_deref_mut() {
            write_slot(out, at, LayoutKind::Native, self.base, offset, count);
        }
    }
}

/// A NUL-terminated UTF-8 payload, terminator included in `bytes`.
fn check_string<'b>(bytes: &'b [u8], path: &str) -> Result<&'b str> {
    let (last, text) = bytes
        .split_last()
        .ok_or_else(|| DlError::CorruptData(format!("string '{}' is empty", path)))?;
    if *last != 0 {
        return Err(DlError::CorruptData(format!("string '{}' is not terminated", path)));
    }
    std::str::from_utf8(text)
        .map_err(|_| DlError::CorruptData(format!("string '{}' is not UTF-8", path)))
}

/// Validating reader producing [`Value`]s from an instance region in either layout.
pub(crate) struct Reader<'a> {
    lib: &'a TypeLibrary,
    layout: LayoutKind,
    buf: &'a [u8],
    base: usize,
    claims: Option<Claims>,
    depth: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(
        lib: &'a TypeLibrary,
        layout: LayoutKind,
        buf: &'a [u8],
        base: usize,
        root: &TypeDesc,
        alloc: &dyn Allocator,
    ) -> Result<Self> {
        let fixed = root.size(layout);
        if buf.len() < fixed {
            return Err(DlError::CorruptData(format!(
                "instance region is {} bytes, '{}' needs {}",
                buf.len(),
                root.name,
                fixed
            )));
        }
        Ok(Reader {
            lib,
            layout,
            buf,
            base,
            claims: Some(Claims::new(alloc, buf.len(), fixed)?),
            depth: 0,
        })
    }

    pub(crate) fn read_struct(&mut self, desc: &TypeDesc, at: usize, path: &str) -> Result<Value> {
        if desc.is_union {
            let tag = self.union_tag(desc, at)?;
            let member = union_member(desc, tag, path)?;
            let member_path = format!("{}.{}", path, member.name);
            let v = self.read_member(member, at, &member_path)?;
            return Ok(Value::Struct(HashMap::from([(member.name.clone(), v)])));
        }
        let mut map = HashMap::with_capacity(desc.members.len());
        for member in &desc.members {
            let path = format!("{}.{}", path, member.name);
            let v = self.read_member(member, at + member.offset(self.layout), &path)?;
            map.insert(member.name.clone(), v);
        }
        Ok(Value::Struct(map))
    }

    /// Tag of the union instance at `at`.
    pub(crate) fn union_tag(&self, desc: &TypeDesc, at: usize) -> Result<u32> {
        let raw = bounds(self.buf, at + desc.tag_offset(self.layout), 4)?;
        Ok(read_uint(raw, self.layout) as u32)
    }

    /// Read one member whose storage starts at `at`.
    pub(crate) fn read_member(&mut self, member: &Member, at: usize, path: &str) -> Result<Value> {
        match member.kind {
            MemberKind::Bitfield { .. } => {
                let (bits, shift, storage) = bit_info(member, path)?;
                let raw = read_uint(bounds(self.buf, at, storage)?, self.layout);
                Ok(Value::UInt((raw >> shift) & bit_mask(bits)))
            }
            MemberKind::InlineArray { elem, count } => {
                let (size, _) = elem_footprint(self.lib, elem, self.layout)?;
                (0..count as usize)
                    .map(|i| self.read_elem(elem, at + i * size, &format!("{}[{}]", path, i)))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
            }
            MemberKind::Array { elem } => {
                let (offset, count) = read_slot(self.buf, at, self.layout, self.base)?;
                if count == 0 {
                    return Ok(Value::Array(Vec::new()));
                }
                let (size, _) = elem_footprint(self.lib, elem, self.layout)?;
                let len = (count as usize)
                    .checked_mul(size)
                    .ok_or_else(|| DlError::CorruptData(format!("array '{}' is too large", path)))?;
                claim(&mut self.claims, self.buf, offset, len, path)?;
                enter(&mut self.depth, path)?;
                let items = (0..count as usize)
                    .map(|i| self.read_elem(elem, offset + i * size, &format!("{}[{}]", path, i)))
                    .collect::<Result<Vec<_>>>()?;
                self.depth -= 1;
                Ok(Value::Array(items))
            }
            kind => match kind.as_elem() {
                Some(elem) => self.read_elem(elem, at, path),
                None => Err(DlError::MalformedTypeLibrary(format!(
                    "member '{}' has no element kind",
                    path
                ))),
            },
        }
    }

    fn read_elem(&mut self, elem: ElemKind, at: usize, path: &str) -> Result<Value> {
        match elem {
            ElemKind::Scalar(k) => {
                let raw = read_uint(bounds(self.buf, at, k.size() as usize)?, self.layout);
                Ok(scalar_value(k, raw))
            }
            ElemKind::Enum(id) => {
                let raw = read_uint(bounds(self.buf, at, 4)?, self.layout) as u32;
                let desc = self.lib.lookup_enum(id)?;
                desc.name_of(raw).map(|n| Value::Enum(n.to_string())).ok_or_else(|| {
                    DlError::CorruptData(format!(
                        "'{}' holds {}, not a value of {}",
                        path, raw, desc.name
                    ))
                })
            }
            ElemKind::String => {
                let (offset, count) = read_slot(self.buf, at, self.layout, self.base)?;
                if count == 0 {
                    return Ok(Value::Str(String::new()));
                }
                let len = count as usize;
                claim(&mut self.claims, self.buf, offset, len + 1, path)?;
                let s = check_string(&self.buf[offset..offset + len + 1], path)?;
                Ok(Value::Str(s.to_string()))
            }
            ElemKind::Struct(id) => {
                let desc = self.lib.lookup(id)?;
                bounds(self.buf, at, desc.size(self.layout))?;
                self.read_struct(desc, at, path)
            }
        }
    }
}

fn scalar_value(kind: ScalarKind, raw: u64) -> Value {
    match kind {
        ScalarKind::F32 => Value::Float(f32::from_bits(raw as u32) as f64),
        ScalarKind::F64 => Value::Float(f64::from_bits(raw)),
        k if k.is_signed() => {
            let shift = 64 - k.size() * 8;
            Value::Int(((raw << shift) as i64) >> shift)
        }
        _ => Value::UInt(raw),
    }
}

use crate::error::{DlError, Result};
use crate::layout::{bit_mask, elem_footprint};
use crate::registry::TypeLibrary;
use crate::types::{
    union_tag, ElemKind, LayoutKind, Member, MemberKind, ScalarKind, TypeDesc, TypeId,
};
use crate::value::Value;

use super::size::{self, count_of, expect_array, expect_str, resolve_members, resolve_union};
use super::wire::*;

/// Store `value` as a packed instance of `type_id` into `out`.
///
/// An empty `out` only measures. Returns the number of bytes the instance
/// takes, header included.
pub fn store(lib: &TypeLibrary, type_id: TypeId, value: &Value, out: &mut [u8]) -> Result<usize> {
    let desc = lib.lookup(type_id)?;
    let need = size::measure(lib, type_id, value, LayoutKind::Packed)?;
    if out.is_empty() {
        return Ok(need);
    }
    if out.len() < need {
        return Err(DlError::BufferTooSmall { need, have: out.len() });
    }

    let (header, arena) = out[..need].split_at_mut(SIZEOF_HEADER);
    let written = write_instance(lib, desc, value, arena, LayoutKind::Packed, 0)?;
    debug_assert_eq!(written + SIZEOF_HEADER, need);

    InstanceHeader {
        version: FORMAT_VERSION,
        root: type_id,
        arena_size: written as u32,
    }
    .write(header);
    tracing::debug!(type_name = %desc.name, bytes = need, "stored instance");
    Ok(need)
}

/// Write `value` into `buf` in `layout`, root struct at offset 0.
///
/// `buf` must be exactly as large as the measure pass reported. `base` is the
/// address native slots are made relative to.
pub(crate) fn write_instance(
    lib: &TypeLibrary,
    desc: &TypeDesc,
    value: &Value,
    buf: &mut [u8],
    layout: LayoutKind,
    base: usize,
) -> Result<usize> {
    buf.fill(0);
    let mut w = Writer {
        lib,
        layout,
        buf,
        base,
        cursor: desc.size(layout),
    };
    w.write_struct(desc, value, 0, &desc.name)?;
    Ok(w.cursor)
}

/// Raw bits of a scalar, range-checked against its kind.
pub(crate) fn scalar_bits(kind: ScalarKind, value: &Value, path: &str) -> Result<u64> {
    match kind {
        ScalarKind::F32 => {
            let wide = float_of(value, path)?;
            let narrow = wide as f32;
            if wide.is_finite() && narrow.is_infinite() {
                return Err(DlError::mismatch(path, "fp32", format!("out of range value {}", wide)));
            }
            Ok(narrow.to_bits() as u64)
        }
        ScalarKind::F64 => Ok(float_of(value, path)?.to_bits()),
        _ => {
            let n: i128 = match value {
                Value::Int(v) => *v as i128,
                Value::UInt(v) => *v as i128,
                other => return Err(DlError::mismatch(path, kind.name(), other.type_name())),
            };
            let (lo, hi) = kind.int_range();
            if n < lo || n > hi {
                let actual = format!("out of range value {}", n);
                return Err(DlError::mismatch(path, kind.name(), actual));
            }
            Ok(n as u64)
        }
    }
}

fn float_of(value: &Value, path: &str) -> Result<f64> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(v) => Ok(*v as f64),
        Value::UInt(v) => Ok(*v as f64),
        other => Err(DlError::mismatch(path, "float", other.type_name())),
    }
}

/// Enum storage value from a name or a declared integer value.
pub(crate) fn enum_bits(lib: &TypeLibrary, id: TypeId, value: &Value, path: &str) -> Result<u32> {
    let desc = lib.lookup_enum(id)?;
    let expected = || format!("a value of {}", desc.name);
    match value {
        Value::Enum(name) | Value::Str(name) => desc
            .value_of(name)
            .ok_or_else(|| DlError::mismatch(path, expected(), format!("'{}'", name))),
        Value::Int(_) | Value::UInt(_) => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| desc.name_of(*v).is_some())
            .ok_or_else(|| DlError::mismatch(path, expected(), value.to_string())),
        other => Err(DlError::mismatch(path, format!("enum {}", desc.name), other.type_name())),
    }
}

pub(crate) fn bitfield_bits(bits: u8, value: &Value, path: &str) -> Result<u64> {
    let v = match value {
        Value::Int(_) | Value::UInt(_) => value.as_u64(),
        _ => return Err(DlError::mismatch(path, format!("bitfield:{}", bits), value.type_name())),
    };
    v.filter(|v| *v <= bit_mask(bits)).ok_or_else(|| {
        DlError::mismatch(
            path,
            format!("bitfield:{}", bits),
            format!("out of range value {}", value),
        )
    })
}

struct Writer<'a> {
    lib: &'a TypeLibrary,
    layout: LayoutKind,
    buf: &'a mut [u8],
    base: usize,
    cursor: usize,
}

impl Writer<'_> {
    fn write_struct(
        &mut self,
        desc: &TypeDesc,
        value: &Value,
        at: usize,
        path: &str,
    ) -> Result<()> {
        if desc.is_union {
            let (member, v) = resolve_union(desc, value, path)?;
            let path = format!("{}.{}", path, member.name);
            self.write_member(member, v, at + member.offset(self.layout), &path)?;
            let tag_at = at + desc.tag_offset(self.layout);
            let tag = union_tag(&member.name) as u64;
            write_uint(&mut self.buf[tag_at..tag_at + 4], tag, self.layout);
            return Ok(());
        }
        let values = resolve_members(desc, value, path)?;
        for (member, v) in desc.members.iter().zip(values) {
            let path = format!("{}.{}", path, member.name);
            self.write_member(member, v, at + member.offset(self.layout), &path)?;
        }
        Ok(())
    }

    fn write_member(
        &mut self,
        member: &Member,
        value: &Value,
        at: usize,
        path: &str,
    ) -> Result<()> {
        match member.kind {
            MemberKind::Bitfield { bits } => {
                let v = bitfield_bits(bits, value, path)?;
                let info = member.bit.ok_or_else(|| {
                    DlError::MalformedTypeLibrary(format!("bitfield '{}' has no layout", path))
                })?;
                let group = &mut self.buf[at..at + info.storage as usize];
                let mask = bit_mask(bits) << info.bit_offset;
                let cur = read_uint(group, self.layout);
                write_uint(group, (cur & !mask) | (v << info.bit_offset), self.layout);
                Ok(())
            }
            MemberKind::InlineArray { elem, .. } => {
                let items = expect_array(value, path)?;
                let (size, _) = elem_footprint(self.lib, elem, self.layout)?;
                for (i, item) in items.iter().enumerate() {
                    self.write_elem(elem, item, at + i * size, &format!("{}[{}]", path, i))?;
                }
                Ok(())
            }
            MemberKind::Array { elem } => {
                let items = expect_array(value, path)?;
                let count = count_of(items.len(), path)?;
                if items.is_empty() {
                    write_slot(self.buf, at, self.layout, self.base, 0, 0);
                    return Ok(());
                }
                let (size, align) = elem_footprint(self.lib, elem, self.layout)?;
                let start = align_up(self.cursor, align);
                self.cursor = start + items.len() * size;
                write_slot(self.buf, at, self.layout, self.base, start, count);
                for (i, item) in items.iter().enumerate() {
                    self.write_elem(elem, item, start + i * size, &format!("{}[{}]", path, i))?;
                }
                Ok(())
            }
            kind => match kind.as_elem() {
                Some(elem) => self.write_elem(elem, value, at, path),
                None => Ok(()),
            },
        }
    }

    fn write_elem(&mut self, elem: ElemKind, value: &Value, at: usize, path: &str) -> Result<()> {
        match elem {
            ElemKind::Scalar(k) => {
                let bits = scalar_bits(k, value, path)?;
                write_uint(&mut self.buf[at..at + k.size() as usize], bits, self.layout);
            }
            ElemKind::Enum(id) => {
                let v = enum_bits(self.lib, id, value, path)?;
                write_uint(&mut self.buf[at..at + 4], v as u64, self.layout);
            }
            ElemKind::String => {
                let s = expect_str(value, path)?;
                let count = count_of(s.len(), path)?;
                if s.is_empty() {
                    write_slot(self.buf, at, self.layout, self.base, 0, 0);
                } else {
                    let start = self.cursor;
                    self.buf[start..start + s.len()].copy_from_slice(s.as_bytes());
                    self.buf[start + s.len()] = 0;
                    self.cursor = start + s.len() + 1;
                    write_slot(self.buf, at, self.layout, self.base, start, count);
                }
            }
            ElemKind::Struct(id) => {
                let desc = self.lib.lookup(id)?;
                self.write_struct(desc, value, at, path)?;
            }
        }
        Ok(())
    }
}

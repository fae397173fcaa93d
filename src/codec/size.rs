//! Size calculator: the measure pass that precedes every write.
//!
//! The walk visits members in declaration order and reserves each dynamic
//! payload at the point the member is reached, exactly as the encoder does.

use crate::codec::encoder::{bitfield_bits, enum_bits, scalar_bits};
use crate::codec::wire::{align_up, SIZEOF_HEADER};
use crate::error::{DlError, Result};
use crate::layout::elem_footprint;
use crate::registry::TypeLibrary;
use crate::types::{ElemKind, LayoutKind, Member, MemberKind, TypeDesc, TypeId};
use crate::value::Value;

/// Bytes needed to store `value` as an instance of `type_id`.
///
/// For the packed layout the result includes the instance header.
pub fn measure(
    lib: &TypeLibrary,
    type_id: TypeId,
    value: &Value,
    layout: LayoutKind,
) -> Result<usize> {
    let desc = lib.lookup(type_id)?;
    let mut m = Measure {
        lib,
        layout,
        cursor: desc.size(layout),
    };
    m.struct_members(desc, value, &desc.name)?;
    let total = match layout {
        LayoutKind::Packed => {
            if m.cursor > u32::MAX as usize {
                let actual = format!("{} bytes", m.cursor);
                return Err(DlError::mismatch(&desc.name, "instance below 4 GiB", actual));
            }
            m.cursor + SIZEOF_HEADER
        }
        LayoutKind::Native => m.cursor,
    };
    Ok(total)
}

/// Validate `value` against a single member and return the bytes its dynamic
/// payloads would take when stored on their own.
pub fn measure_member(
    lib: &TypeLibrary,
    member: &Member,
    value: &Value,
    path: &str,
    layout: LayoutKind,
) -> Result<usize> {
    let mut m = Measure { lib, layout, cursor: 0 };
    m.member(member.kind, value, path)?;
    Ok(m.cursor)
}

/// Pair every member of `desc` with its value from `value`, falling back to
/// the member default. Unknown and missing members are a type mismatch.
pub(crate) fn resolve_members<'a>(
    desc: &'a TypeDesc,
    value: &'a Value,
    path: &str,
) -> Result<Vec<&'a Value>> {
    let map = match value {
        Value::Struct(map) => map,
        other => {
            let expected = format!("struct {}", desc.name);
            return Err(DlError::mismatch(path, expected, other.type_name()));
        }
    };
    if let Some(unknown) = map.keys().find(|k| desc.member(k).is_none()) {
        return Err(DlError::mismatch(
            &format!("{}.{}", path, unknown),
            format!("a member of {}", desc.name),
            "unknown member",
        ));
    }
    desc.members
        .iter()
        .map(|member| {
            map.get(&member.name).or(member.default.as_ref()).ok_or_else(|| {
                let path = format!("{}.{}", path, member.name);
                DlError::mismatch(&path, "a value", "missing member")
            })
        })
        .collect()
}

/// The single active member of a union value, given as a struct with one entry.
pub(crate) fn resolve_union<'a>(
    desc: &'a TypeDesc,
    value: &'a Value,
    path: &str,
) -> Result<(&'a Member, &'a Value)> {
    let map = match value {
        Value::Struct(map) => map,
        other => {
            let expected = format!("union {}", desc.name);
            return Err(DlError::mismatch(path, expected, other.type_name()));
        }
    };
    let mut entries = map.iter();
    let (name, v) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => {
            return Err(DlError::mismatch(
                path,
                format!("exactly one member of union {}", desc.name),
                format!("{} members", map.len()),
            ))
        }
    };
    let member = desc.member(name).ok_or_else(|| {
        DlError::mismatch(
            &format!("{}.{}", path, name),
            format!("a member of {}", desc.name),
            "unknown member",
        )
    })?;
    Ok((member, v))
}

pub(crate) fn expect_array<'a>(value: &'a Value, path: &str) -> Result<&'a [Value]> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(DlError::mismatch(path, "array", other.type_name())),
    }
}

pub(crate) fn expect_str<'a>(value: &'a Value, path: &str) -> Result<&'a str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(DlError::mismatch(path, "string", other.type_name())),
    }
}

pub(crate) fn count_of(len: usize, path: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| DlError::mismatch(path, "at most u32::MAX elements", format!("{}", len)))
}

struct Measure<'a> {
    lib: &'a TypeLibrary,
    layout: LayoutKind,
    cursor: usize,
}

impl Measure<'_> {
    fn struct_members(&mut self, desc: &TypeDesc, value: &Value, path: &str) -> Result<()> {
        if desc.is_union {
            let (member, v) = resolve_union(desc, value, path)?;
            return self.member(member.kind, v, &format!("{}.{}", path, member.name));
        }
        let values = resolve_members(desc, value, path)?;
        for (member, v) in desc.members.iter().zip(values) {
            self.member(member.kind, v, &format!("{}.{}", path, member.name))?;
        }
        Ok(())
    }

    fn member(&mut self, kind: MemberKind, value: &Value, path: &str) -> Result<()> {
        match kind {
            MemberKind::Bitfield { bits } => bitfield_bits(bits, value, path).map(|_| ()),
            MemberKind::InlineArray { elem, count } => {
                let items = expect_array(value, path)?;
                if items.len() != count as usize {
                    return Err(DlError::mismatch(
                        path,
                        format!("{} elements", count),
                        format!("{} elements", items.len()),
                    ));
                }
                for (i, item) in items.iter().enumerate() {
                    self.elem(elem, item, &format!("{}[{}]", path, i))?;
                }
                Ok(())
            }
            MemberKind::Array { elem } => {
                let items = expect_array(value, path)?;
                count_of(items.len(), path)?;
                if items.is_empty() {
                    return Ok(());
                }
                let (size, align) = elem_footprint(self.lib, elem, self.layout)?;
                self.cursor = align_up(self.cursor, align) + items.len() * size;
                for (i, item) in items.iter().enumerate() {
                    self.elem(elem, item, &format!("{}[{}]", path, i))?;
                }
                Ok(())
            }
            _ => match kind.as_elem() {
                Some(elem) => self.elem(elem, value, path),
                None => Ok(()),
            },
        }
    }

    fn elem(&mut self, elem: ElemKind, value: &Value, path: &str) -> Result<()> {
        match elem {
            ElemKind::Scalar(k) => scalar_bits(k, value, path).map(|_| ()),
            ElemKind::Enum(id) => enum_bits(self.lib, id, value, path).map(|_| ()),
            ElemKind::String => {
                let s = expect_str(value, path)?;
                count_of(s.len(), path)?;
                if !s.is_empty() {
                    self.cursor += s.len() + 1;
                }
                Ok(())
            }
            ElemKind::Struct(id) => {
                let desc = self.lib.lookup(id)?;
                self.struct_members(desc, value, path)
            }
        }
    }
}

//! Packed instance to text.

use std::fmt::Write;

use crate::codec::decoder;
use crate::codec::encoder::enum_bits;
use crate::codec::size::{expect_array, expect_str, resolve_union};
use crate::context::{Allocator, SystemAllocator};
use crate::error::{DlError, Result};
use crate::registry::TypeLibrary;
use crate::types::{ElemKind, Member, MemberKind, ScalarKind, TypeDesc, TypeId};
use crate::value::Value;

const INDENT: &str = "    ";

/// Render a packed instance of `type_id` as an instance literal.
///
/// Members are written in declaration order, four spaces per level. A union
/// shows only its active member.
pub fn unpack_text(lib: &TypeLibrary, type_id: TypeId, packed: &[u8]) -> Result<String> {
    unpack_text_with(lib, &SystemAllocator, type_id, packed)
}

/// [`unpack_text`] with scratch memory from `alloc`.
pub fn unpack_text_with(
    lib: &TypeLibrary,
    alloc: &dyn Allocator,
    type_id: TypeId,
    packed: &[u8],
) -> Result<String> {
    let value = decoder::decode_with(lib, alloc, type_id, packed)?;
    let desc = lib.lookup(type_id)?;
    let mut out = String::new();
    out.push_str("{\n");
    indent(&mut out, 1);
    write_string(&mut out, &desc.name);
    out.push_str(" : ");
    Printer { lib }.write_struct(&mut out, desc, &value, 1, &desc.name)?;
    out.push_str("\n}\n");
    Ok(out)
}

/// Render `value` as the literal of a member of kind `kind`, nested `level` deep.
pub(crate) fn write_value(
    lib: &TypeLibrary,
    out: &mut String,
    kind: MemberKind,
    value: &Value,
    level: usize,
    path: &str,
) -> Result<()> {
    Printer { lib }.write_member(out, kind, value, level, path)
}

struct Printer<'a> {
    lib: &'a TypeLibrary,
}

impl Printer<'_> {
    fn write_struct(
        &self,
        out: &mut String,
        desc: &TypeDesc,
        value: &Value,
        level: usize,
        path: &str,
    ) -> Result<()> {
        let members: Vec<(&Member, &Value)> = if desc.is_union {
            vec![resolve_union(desc, value, path)?]
        } else {
            desc.members
                .iter()
                .map(|m| {
                    value.get(&m.name).map(|v| (m, v)).ok_or_else(|| {
                        DlError::mismatch(&format!("{}.{}", path, m.name), "a value", "nothing")
                    })
                })
                .collect::<Result<_>>()?
        };
        out.push_str("{\n");
        for (i, (member, v)) in members.iter().enumerate() {
            indent(out, level + 1);
            write_string(out, &member.name);
            out.push_str(" : ");
            let path = format!("{}.{}", path, member.name);
            self.write_member(out, member.kind, v, level + 1, &path)?;
            if i + 1 < members.len() {
                out.push(',');
            }
            out.push('\n');
        }
        indent(out, level);
        out.push('}');
        Ok(())
    }

    fn write_member(
        &self,
        out: &mut String,
        kind: MemberKind,
        value: &Value,
        level: usize,
        path: &str,
    ) -> Result<()> {
        match kind {
            MemberKind::Bitfield { .. } => write_scalar(out, ScalarKind::U64, value, path),
            MemberKind::InlineArray { elem, .. } | MemberKind::Array { elem } => {
                let items = expect_array(value, path)?;
                self.write_array(out, elem, items, level, path)
            }
            _ => match kind.as_elem() {
                Some(elem) => self.write_elem(out, elem, value, level, path),
                None => Ok(()),
            },
        }
    }

    fn write_array(
        &self,
        out: &mut String,
        elem: ElemKind,
        items: &[Value],
        level: usize,
        path: &str,
    ) -> Result<()> {
        if items.is_empty() {
            out.push_str("[]");
            return Ok(());
        }
        if !matches!(elem, ElemKind::Struct(_)) {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                self.write_elem(out, elem, item, level, &format!("{}[{}]", path, i))?;
            }
            out.push(']');
            return Ok(());
        }
        out.push_str("[\n");
        for (i, item) in items.iter().enumerate() {
            indent(out, level + 1);
            self.write_elem(out, elem, item, level + 1, &format!("{}[{}]", path, i))?;
            if i + 1 < items.len() {
                out.push(',');
            }
            out.push('\n');
        }
        indent(out, level);
        out.push(']');
        Ok(())
    }

    fn write_elem(
        &self,
        out: &mut String,
        elem: ElemKind,
        value: &Value,
        level: usize,
        path: &str,
    ) -> Result<()> {
        match elem {
            ElemKind::Scalar(k) => write_scalar(out, k, value, path)?,
            ElemKind::Enum(id) => {
                let bits = enum_bits(self.lib, id, value, path)?;
                let desc = self.lib.lookup_enum(id)?;
                let name = desc
                    .name_of(bits)
                    .ok_or_else(|| DlError::mismatch(path, desc.name.as_str(), bits.to_string()))?;
                write_string(out, name);
            }
            ElemKind::String => write_string(out, expect_str(value, path)?),
            ElemKind::Struct(id) => {
                let desc = self.lib.lookup(id)?;
                self.write_struct(out, desc, value, level, path)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str(INDENT);
    }
}

fn write_scalar(out: &mut String, kind: ScalarKind, value: &Value, path: &str) -> Result<()> {
    match value {
        Value::Float(f) => write_float(out, kind, *f),
        Value::Int(_) | Value::UInt(_) => {
            let _ = write!(out, "{}", value);
        }
        other => return Err(DlError::mismatch(path, kind.name(), other.type_name())),
    }
    Ok(())
}

fn write_float(out: &mut String, kind: ScalarKind, v: f64) {
    if v.is_nan() {
        out.push_str("nan");
    } else if v.is_infinite() {
        out.push_str(if v > 0.0 { "inf" } else { "-inf" });
    } else if kind == ScalarKind::F32 {
        let _ = write!(out, "{:?}", v as f32);
    } else {
        let _ = write!(out, "{:?}", v);
    }
}

/// Quoted string with JSON escapes.
pub(crate) fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

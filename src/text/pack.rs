//! Text to packed instance.
//!
//! The syntax tree is converted into a [`Value`] against the type descriptors,
//! reporting problems with the line they occur on, then stored with the
//! regular packer.

use std::collections::HashMap;

use crate::codec::encoder;
use crate::error::{DlError, Result};
use crate::layout::bit_mask;
use crate::parser::ast::{Node, NodeKind};
use crate::parser::grammar::parse_document;
use crate::registry::TypeLibrary;
use crate::types::{ElemKind, MemberKind, ScalarKind, TypeDesc, TypeId};
use crate::value::Value;

/// Parse an instance literal `{ "Type" : { ... } }` into its type and value.
pub fn parse_instance(lib: &TypeLibrary, text: &str) -> Result<(TypeId, Value)> {
    let doc = parse_document(text)?;
    let entries = doc.as_map().ok_or_else(|| {
        DlError::text(doc.line, format!("expected an object, found {}", doc.describe()))
    })?;
    let [root] = entries else {
        return Err(DlError::text(
            doc.line,
            format!("expected exactly one root type, found {}", entries.len()),
        ));
    };
    let desc = lib
        .find_type_by_name(&root.key)
        .ok_or_else(|| DlError::UnknownType(root.key.clone()))?;
    let value = struct_value(lib, desc, &root.value, &desc.name)?;
    Ok((desc.id, value))
}

/// Pack an instance literal into `out`. An empty `out` only measures.
pub fn pack_text(lib: &TypeLibrary, text: &str, out: &mut [u8]) -> Result<usize> {
    let (type_id, value) = parse_instance(lib, text)?;
    encoder::store(lib, type_id, &value, out)
}

/// Convert a node to the value of a member of kind `kind`.
pub(crate) fn member_value(
    lib: &TypeLibrary,
    kind: MemberKind,
    node: &Node,
    path: &str,
) -> Result<Value> {
    match kind {
        MemberKind::Bitfield { bits } => {
            let v = integer(node, 0, bit_mask(bits) as i128, path)?;
            Ok(Value::UInt(v as u64))
        }
        MemberKind::InlineArray { elem, count } => {
            let items = list(node, path)?;
            if items.len() != count as usize {
                return Err(DlError::text(
                    node.line,
                    format!("'{}' needs {} elements, found {}", path, count, items.len()),
                ));
            }
            elements(lib, elem, items, path)
        }
        MemberKind::Array { elem } => elements(lib, elem, list(node, path)?, path),
        _ => match kind.as_elem() {
            Some(elem) => elem_value(lib, elem, node, path),
            None => Err(DlError::text(node.line, format!("'{}' has no value form", path))),
        },
    }
}

fn elements(lib: &TypeLibrary, elem: ElemKind, items: &[Node], path: &str) -> Result<Value> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| elem_value(lib, elem, item, &format!("{}[{}]", path, i)))
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

fn elem_value(lib: &TypeLibrary, elem: ElemKind, node: &Node, path: &str) -> Result<Value> {
    match elem {
        ElemKind::Scalar(k) if k.is_float() => float(k, node, path).map(Value::Float),
        ElemKind::Scalar(k) => {
            let (lo, hi) = k.int_range();
            let v = integer(node, lo, hi, path)?;
            Ok(if k.is_signed() { Value::Int(v as i64) } else { Value::UInt(v as u64) })
        }
        ElemKind::Enum(id) => {
            let desc = lib.lookup_enum(id)?;
            match &node.kind {
                NodeKind::Str(name) | NodeKind::Ident(name) if desc.value_of(name).is_some() => {
                    Ok(Value::Enum(name.clone()))
                }
                NodeKind::Number(_) => {
                    let v = integer(node, 0, u32::MAX as i128, path)?;
                    desc.name_of(v as u32).map(|n| Value::Enum(n.to_string())).ok_or_else(|| {
                        DlError::text(node.line, format!("{} is not a value of {}", v, desc.name))
                    })
                }
                _ => Err(DlError::text(
                    node.line,
                    format!(
                        "'{}' expects a value of {}, found {}",
                        path,
                        desc.name,
                        describe_node(node)
                    ),
                )),
            }
        }
        ElemKind::String => match &node.kind {
            NodeKind::Str(s) => Ok(Value::Str(s.clone())),
            _ => Err(DlError::text(
                node.line,
                format!("'{}' expects a string, found {}", path, node.describe()),
            )),
        },
        ElemKind::Struct(id) => {
            let desc = lib.lookup(id)?;
            struct_value(lib, desc, node, path)
        }
    }
}

fn struct_value(lib: &TypeLibrary, desc: &TypeDesc, node: &Node, path: &str) -> Result<Value> {
    let entries = node.as_map().ok_or_else(|| {
        DlError::text(node.line, format!("'{}' expects an object, found {}", path, node.describe()))
    })?;
    let mut map = HashMap::with_capacity(desc.members.len());
    for entry in entries {
        let member = desc.member(&entry.key).ok_or_else(|| {
            DlError::text(entry.line, format!("'{}' is not a member of {}", entry.key, desc.name))
        })?;
        if map.contains_key(&member.name) {
            return Err(DlError::text(entry.line, format!("member '{}' is set twice", entry.key)));
        }
        let v = member_value(lib, member.kind, &entry.value, &format!("{}.{}", path, member.name))?;
        map.insert(member.name.clone(), v);
    }
    if desc.is_union {
        if map.len() != 1 {
            return Err(DlError::text(
                node.line,
                format!("union {} needs exactly one member, found {}", desc.name, map.len()),
            ));
        }
        return Ok(Value::Struct(map));
    }
    for member in &desc.members {
        if map.contains_key(&member.name) {
            continue;
        }
        match &member.default {
            Some(default) => {
                map.insert(member.name.clone(), default.clone());
            }
            None => {
                return Err(DlError::text(
                    node.line,
                    format!(
                        "member '{}' of {} is missing and has no default",
                        member.name, desc.name
                    ),
                ))
            }
        }
    }
    Ok(Value::Struct(map))
}

fn list<'n>(node: &'n Node, path: &str) -> Result<&'n [Node]> {
    node.as_list().ok_or_else(|| {
        DlError::text(node.line, format!("'{}' expects an array, found {}", path, node.describe()))
    })
}

fn describe_node(node: &Node) -> String {
    match &node.kind {
        NodeKind::Str(s) | NodeKind::Ident(s) => format!("'{}'", s),
        _ => node.describe().to_string(),
    }
}

/// Integer literal in `[lo, hi]`: decimal, `0x`, `0b`, `true`/`false`, `min`/`max`.
fn integer(node: &Node, lo: i128, hi: i128, path: &str) -> Result<i128> {
    let v = match &node.kind {
        NodeKind::Number(raw) => parse_integer(raw)
            .ok_or_else(|| DlError::text(node.line, format!("'{}' is not an integer", raw)))?,
        NodeKind::Ident(word) => match word.as_str() {
            "true" => 1,
            "false" => 0,
            "min" => lo,
            "max" => hi,
            _ => {
                let message = format!("'{}' expects an integer, found '{}'", path, word);
                return Err(DlError::text(node.line, message));
            }
        },
        _ => {
            return Err(DlError::text(
                node.line,
                format!("'{}' expects an integer, found {}", path, node.describe()),
            ))
        }
    };
    if v < lo || v > hi {
        return Err(DlError::text(
            node.line,
            format!("{} is out of range [{}, {}] for '{}'", v, lo, hi, path),
        ));
    }
    Ok(v)
}

pub(crate) fn parse_integer(raw: &str) -> Option<i128> {
    let (negative, body) = match raw.as_bytes().first()? {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };
    let digits_ok = |s: &str, radix: u32| !s.is_empty() && s.chars().all(|c| c.is_digit(radix));
    let magnitude = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        digits_ok(hex, 16).then(|| u128::from_str_radix(hex, 16).ok())??
    } else if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
        digits_ok(bin, 2).then(|| u128::from_str_radix(bin, 2).ok())??
    } else {
        digits_ok(body, 10).then(|| body.parse::<u128>().ok())??
    };
    let magnitude = i128::try_from(magnitude).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn float(kind: ScalarKind, node: &Node, path: &str) -> Result<f64> {
    let single = kind == ScalarKind::F32;
    match &node.kind {
        NodeKind::Number(raw) => {
            let parsed = if single {
                raw.parse::<f32>().map(|v| v as f64).ok()
            } else {
                raw.parse::<f64>().ok()
            };
            let v = parsed
                .or_else(|| parse_integer(raw).map(|v| v as f64))
                .ok_or_else(|| DlError::text(node.line, format!("'{}' is not a number", raw)))?;
            // infinity is spelled `inf`, a literal that overflows is an error
            if v.is_infinite() {
                return Err(DlError::text(
                    node.line,
                    format!("{} is out of range for '{}' ({})", raw, path, kind.name()),
                ));
            }
            Ok(v)
        }
        NodeKind::Ident(word) => match word.as_str() {
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            "nan" => Ok(f64::NAN),
            "max" if single => Ok(f32::MAX as f64),
            "min" if single => Ok(f32::MIN as f64),
            "max" => Ok(f64::MAX),
            "min" => Ok(f64::MIN),
            _ => Err(DlError::text(
                node.line,
                format!("'{}' expects a number, found '{}'", path, word),
            )),
        },
        _ => Err(DlError::text(
            node.line,
            format!("'{}' expects a number, found {}", path, node.describe()),
        )),
    }
}

//! Text type library loader.
//!
//! ```text
//! {
//!   "module" : "name",
//!   "enums"  : { "color" : { "RED" : 0, "GREEN" : 1 }, "mode" : [ "A", { "B" : 10 }, "C" ] },
//!   "types"  : {
//!     "vec3"  : { "members" : [ { "name" : "x", "type" : "fp32" } ] },
//!     "thing" : { "members" : [
//!         { "name" : "bits", "type" : "bitfield", "bits" : 3 },
//!         { "name" : "more", "type" : "bitfield:5" },
//!         { "name" : "arr",  "type" : "uint32[]" },
//!         { "name" : "inl",  "type" : "vec3[2]" },
//!         { "name" : "s",    "type" : "string", "default" : "hi" } ] },
//!     "either" : { "union" : true, "members" : [
//!         { "name" : "num", "type" : "int64" },
//!         { "name" : "txt", "type" : "string" } ] }
//!   }
//! }
//! ```

use std::collections::HashSet;

use crate::error::{DlError, Result};
use crate::registry::TypeLibrary;
use crate::text::pack::{member_value, parse_integer};
use crate::types::*;
use super::ast::*;
use super::grammar::parse_document;

/// Parse a text type library and merge it into a copy of `lib`.
///
/// Syntax errors are `MalformedText`; invalid definitions are
/// `MalformedTypeLibrary`, dangling references `UnknownType`.
pub fn build_library(lib: &TypeLibrary, text: &str) -> Result<TypeLibrary> {
    let doc = parse_document(text)?;
    let top = doc
        .as_map()
        .ok_or_else(|| malformed(doc.line, "type library must be an object"))?;

    let mut enums = Vec::new();
    let mut type_nodes: &[Entry] = &[];
    for entry in top {
        match entry.key.as_str() {
            "module" => {
                if !matches!(entry.value.kind, NodeKind::Str(_)) {
                    return Err(malformed(entry.line, "module name must be a string"));
                }
            }
            "enums" => {
                let defs = entry
                    .value
                    .as_map()
                    .ok_or_else(|| malformed(entry.line, "'enums' must be an object"))?;
                for def in defs {
                    enums.push(build_enum(def)?);
                }
            }
            "types" => {
                type_nodes = entry
                    .value
                    .as_map()
                    .ok_or_else(|| malformed(entry.line, "'types' must be an object"))?;
            }
            other => return Err(malformed(entry.line, format!("unknown section '{}'", other))),
        }
    }

    let enum_names: HashSet<&str> = enums.iter().map(|e| e.name.as_str()).collect();
    let mut types = Vec::with_capacity(type_nodes.len());
    let mut defaults = Vec::new();
    for def in type_nodes {
        let (desc, type_defaults) = build_type(lib, &enum_names, def)?;
        for (member_index, node) in type_defaults {
            defaults.push((types.len(), member_index, node));
        }
        types.push(desc);
    }

    if !defaults.is_empty() {
        let scratch = lib.overlay(&enums, &types);
        for (type_index, member_index, node) in defaults {
            let desc = &types[type_index];
            let member = &desc.members[member_index];
            let path = format!("{}.{}", desc.name, member.name);
            let value = member_value(&scratch, member.kind, node, &path).map_err(|e| match e {
                DlError::MalformedText { line, message } => {
                    malformed(line, format!("invalid default: {}", message))
                }
                other => other,
            })?;
            types[type_index].members[member_index].default = Some(value);
        }
    }

    lib.merged(enums, types)
}

fn malformed(line: usize, msg: impl Into<String>) -> DlError {
    DlError::MalformedTypeLibrary(format!("line {}: {}", line, msg.into()))
}

fn build_enum(def: &Entry) -> Result<EnumDesc> {
    let mut values: Vec<(String, u32)> = Vec::new();
    let mut push = |name: &str, v: i128, line: usize| -> Result<()> {
        let v = u32::try_from(v).map_err(|_| {
            malformed(line, format!("enum value {} of '{}' does not fit u32", v, name))
        })?;
        if values.iter().any(|(n, _)| n == name) {
            return Err(malformed(line, format!("enum value '{}' declared twice", name)));
        }
        values.push((name.to_string(), v));
        Ok(())
    };

    match &def.value.kind {
        NodeKind::Map(entries) => {
            for e in entries {
                push(&e.key, enum_number(&e.value)?, e.line)?;
            }
        }
        NodeKind::List(items) => {
            let mut next: i128 = 0;
            for item in items {
                match &item.kind {
                    NodeKind::Str(name) | NodeKind::Ident(name) => push(name, next, item.line)?,
                    NodeKind::Map(entries) if entries.len() == 1 => {
                        next = enum_number(&entries[0].value)?;
                        push(&entries[0].key, next, item.line)?;
                    }
                    _ => {
                        let message = "enum entries are names or { name : value }";
                        return Err(malformed(item.line, message));
                    }
                }
                next += 1;
            }
        }
        _ => {
            let message = format!("enum '{}' must be an object or array", def.key);
            return Err(malformed(def.line, message));
        }
    }
    if values.is_empty() {
        return Err(malformed(def.line, format!("enum '{}' has no values", def.key)));
    }
    Ok(EnumDesc {
        id: TypeId::from_name(&def.key),
        name: def.key.clone(),
        values,
    })
}

fn enum_number(node: &Node) -> Result<i128> {
    match &node.kind {
        NodeKind::Number(raw) => {
            parse_integer(raw)
                .ok_or_else(|| malformed(node.line, format!("'{}' is not an integer", raw)))
        }
        _ => Err(malformed(node.line, "enum value must be an integer")),
    }
}

type Defaults<'n> = Vec<(usize, &'n Node)>;

fn build_type<'n>(
    lib: &TypeLibrary,
    enum_names: &HashSet<&str>,
    def: &'n Entry,
) -> Result<(TypeDesc, Defaults<'n>)> {
    let body = def
        .value
        .as_map()
        .ok_or_else(|| malformed(def.line, format!("type '{}' must be an object", def.key)))?;
    let mut member_nodes: Option<&[Node]> = None;
    let mut is_union = false;
    for entry in body {
        match entry.key.as_str() {
            "union" => {
                is_union = match &entry.value.kind {
                    NodeKind::Ident(word) if word == "true" => true,
                    NodeKind::Ident(word) if word == "false" => false,
                    _ => return Err(malformed(entry.line, "'union' must be true or false")),
                };
            }
            "members" => {
                member_nodes = Some(
                    entry
                        .value
                        .as_list()
                        .ok_or_else(|| malformed(entry.line, "'members' must be an array"))?,
                );
            }
            other => {
                let message = format!("unknown type attribute '{}'", other);
                return Err(malformed(entry.line, message));
            }
        }
    }
    let member_nodes = member_nodes
        .ok_or_else(|| malformed(def.line, format!("type '{}' has no members", def.key)))?;

    let mut members = Vec::with_capacity(member_nodes.len());
    let mut defaults = Vec::new();
    for node in member_nodes {
        let (member, default) = build_member(lib, enum_names, node)?;
        if let Some(d) = default {
            defaults.push((members.len(), d));
        }
        members.push(member);
    }
    let desc = if is_union {
        TypeDesc::new_union(&def.key, members)
    } else {
        TypeDesc::new(&def.key, members)
    };
    Ok((desc, defaults))
}

fn build_member<'n>(
    lib: &TypeLibrary,
    enum_names: &HashSet<&str>,
    node: &'n Node,
) -> Result<(Member, Option<&'n Node>)> {
    let attrs = node
        .as_map()
        .ok_or_else(|| malformed(node.line, "member must be an object"))?;
    let mut name = None;
    let mut type_name = None;
    let mut bits = None;
    let mut default = None;
    for attr in attrs {
        match attr.key.as_str() {
            "name" => name = Some(text_attr(attr)?),
            "type" => type_name = Some(text_attr(attr)?),
            "bits" => {
                let n = enum_number(&attr.value)?;
                let width = u8::try_from(n)
                    .map_err(|_| malformed(attr.line, format!("bitfield width {}", n)))?;
                bits = Some(width);
            }
            "default" => default = Some(&attr.value),
            // accepted for compatibility, layout is always computed
            "comment" | "align" => {}
            other => {
                let message = format!("unknown member attribute '{}'", other);
                return Err(malformed(attr.line, message));
            }
        }
    }
    let name = name.ok_or_else(|| malformed(node.line, "member has no name"))?;
    let type_name = type_name
        .ok_or_else(|| malformed(node.line, format!("member '{}' has no type", name)))?;
    let kind = parse_kind(lib, enum_names, type_name, bits, node.line)?;
    Ok((Member::new(name, kind), default))
}

fn text_attr(attr: &Entry) -> Result<&str> {
    match &attr.value.kind {
        NodeKind::Str(s) => Ok(s),
        _ => Err(malformed(attr.line, format!("'{}' must be a string", attr.key))),
    }
}

/// Member kind from a type string: `uint8`, `string`, `bitfield:3`, `vec3[2]`, `color[]`.
fn parse_kind(
    lib: &TypeLibrary,
    enum_names: &HashSet<&str>,
    type_name: &str,
    bits: Option<u8>,
    line: usize,
) -> Result<MemberKind> {
    if let Some(open) = type_name.find('[') {
        let inner = &type_name[..open];
        let rest = type_name[open + 1..]
            .strip_suffix(']')
            .ok_or_else(|| malformed(line, format!("bad array type '{}'", type_name)))?;
        let elem = parse_elem(lib, enum_names, inner, line)?;
        if rest.is_empty() {
            return Ok(MemberKind::Array { elem });
        }
        let count = parse_integer(rest)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| malformed(line, format!("bad array length in '{}'", type_name)))?;
        return Ok(MemberKind::InlineArray { elem, count });
    }

    if type_name == "bitfield" || type_name.starts_with("bitfield:") {
        let width = match type_name.strip_prefix("bitfield:") {
            Some(w) => w.parse::<u8>().ok(),
            None => bits,
        };
        return match width {
            Some(bits @ 1..=64) => Ok(MemberKind::Bitfield { bits }),
            _ => Err(malformed(line, format!("bitfield '{}' needs a width of 1 to 64", type_name))),
        };
    }

    Ok(parse_elem(lib, enum_names, type_name, line)?.into())
}

fn parse_elem(
    lib: &TypeLibrary,
    enum_names: &HashSet<&str>,
    name: &str,
    line: usize,
) -> Result<ElemKind> {
    if name.is_empty() || name.contains(['[', ']', ':']) {
        return Err(malformed(line, format!("bad type name '{}'", name)));
    }
    if name == "string" {
        return Ok(ElemKind::String);
    }
    if let Some(k) = ScalarKind::from_name(name) {
        return Ok(ElemKind::Scalar(k));
    }
    let id = TypeId::from_name(name);
    if enum_names.contains(name) || lib.lookup_enum(id).is_ok() {
        Ok(ElemKind::Enum(id))
    } else {
        Ok(ElemKind::Struct(id))
    }
}

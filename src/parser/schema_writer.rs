//! Text type library writer.
//!
//! Produces a document [`super::schema_builder`] reads back into the same
//! definitions. Enums are written as lists, with an explicit value only where
//! it does not follow the previous one.

use std::fmt::Write;

use crate::error::{DlError, Result};
use crate::registry::TypeLibrary;
use crate::text::unpack::{indent, write_string, write_value};
use crate::types::*;

/// Render every enum and type of `lib` in registration order.
///
/// Text libraries derive ids from names, so a type whose id is not the hash of
/// its name (possible for binary libraries) cannot be written.
pub fn write_library(lib: &TypeLibrary) -> Result<String> {
    let mut out = String::from("{\n");

    indent(&mut out, 1);
    out.push_str("\"enums\" : {");
    for (i, e) in lib.enums().enumerate() {
        check_id(e.id, &e.name)?;
        out.push_str(if i == 0 { "\n" } else { ",\n" });
        indent(&mut out, 2);
        write_string(&mut out, &e.name);
        out.push_str(" : ");
        write_enum_values(&mut out, e);
    }
    close(&mut out, lib.enum_count(), 1, '}');
    out.push_str(",\n");

    indent(&mut out, 1);
    out.push_str("\"types\" : {");
    for (i, t) in lib.types().enumerate() {
        check_id(t.id, &t.name)?;
        out.push_str(if i == 0 { "\n" } else { ",\n" });
        indent(&mut out, 2);
        write_string(&mut out, &t.name);
        out.push_str(" : {\n");
        if t.is_union {
            indent(&mut out, 3);
            out.push_str("\"union\" : true,\n");
        }
        indent(&mut out, 3);
        out.push_str("\"members\" : [\n");
        for (j, m) in t.members.iter().enumerate() {
            indent(&mut out, 4);
            write_member(lib, &mut out, t, m)?;
            if j + 1 < t.members.len() {
                out.push(',');
            }
            out.push('\n');
        }
        indent(&mut out, 3);
        out.push_str("]\n");
        indent(&mut out, 2);
        out.push('}');
    }
    close(&mut out, lib.type_count(), 1, '}');
    out.push_str("\n}\n");
    Ok(out)
}

fn check_id(id: TypeId, name: &str) -> Result<()> {
    if id != TypeId::from_name(name) {
        return Err(DlError::MalformedTypeLibrary(format!(
            "'{}' has id {}, not the id of its name; a text library cannot keep it",
            name, id
        )));
    }
    Ok(())
}

fn close(out: &mut String, count: usize, level: usize, bracket: char) {
    if count > 0 {
        out.push('\n');
        indent(out, level);
    }
    out.push(bracket);
}

fn write_enum_values(out: &mut String, desc: &EnumDesc) {
    out.push('[');
    let mut next = 0i64;
    for (i, (name, v)) in desc.values.iter().enumerate() {
        out.push_str(if i == 0 { " " } else { ", " });
        if *v as i64 == next {
            write_string(out, name);
        } else {
            out.push_str("{ ");
            write_string(out, name);
            let _ = write!(out, " : {} }}", v);
        }
        next = *v as i64 + 1;
    }
    out.push_str(" ]");
}

fn write_member(lib: &TypeLibrary, out: &mut String, desc: &TypeDesc, m: &Member) -> Result<()> {
    out.push_str("{ \"name\" : ");
    write_string(out, &m.name);
    out.push_str(", \"type\" : ");
    write_string(out, &type_string(lib, m.kind)?);
    if let Some(default) = &m.default {
        out.push_str(", \"default\" : ");
        write_value(lib, out, m.kind, default, 4, &format!("{}.{}", desc.name, m.name))?;
    }
    out.push_str(" }");
    Ok(())
}

/// Type string of a member kind: `uint8`, `bitfield:3`, `vec3[2]`, `color[]`.
fn type_string(lib: &TypeLibrary, kind: MemberKind) -> Result<String> {
    Ok(match kind {
        MemberKind::Bitfield { bits } => format!("bitfield:{}", bits),
        MemberKind::InlineArray { elem, count } => format!("{}[{}]", elem_name(lib, elem)?, count),
        MemberKind::Array { elem } => format!("{}[]", elem_name(lib, elem)?),
        kind => match kind.as_elem() {
            Some(elem) => elem_name(lib, elem)?.to_string(),
            None => {
                let message = format!("no type string for {:?}", kind);
                return Err(DlError::MalformedTypeLibrary(message));
            }
        },
    })
}

fn elem_name(lib: &TypeLibrary, elem: ElemKind) -> Result<&str> {
    match elem {
        ElemKind::Scalar(k) => Ok(k.name()),
        ElemKind::String => Ok("string"),
        ElemKind::Enum(id) => Ok(&lib.lookup_enum(id)?.name),
        ElemKind::Struct(id) => Ok(&lib.lookup(id)?.name),
    }
}

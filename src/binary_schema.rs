//! Binary type library format: reader and writer.
//!
//! All integers are little endian:
//! ```text
//! library: magic u32 "DLTL" | version u32 | enum_count u32 | type_count u32 | enum* | type*
//! enum:    id u32 | name str | value_count u32 | (name str | value u32)*
//! type:    id u32 | name str | flags u8 | member_count u32 | member*
//! flags:   bit 0 union, other bits zero
//! member:  name str | kind u8 | kind payload | has_default u8 | value?
//! kind:    0 scalar(code u8) | 1 enum(id u32) | 2 bitfield(bits u8) | 3 string
//!          4 struct(id u32) | 5 inline array(elem, count u32) | 6 array(elem)
//! elem:    0 scalar(code u8) | 1 enum(id u32) | 2 string | 3 struct(id u32)
//! value:   0 int i64 | 1 uint u64 | 2 float f64 | 3 str | 4 enum str
//!          5 array(count u32, value*) | 6 struct(count u32, (str, value)*)
//! str:     len u16 | UTF-8 bytes
//! ```

use std::collections::HashMap;

use crate::codec::wire::*;
use crate::error::{DlError, Result};
use crate::registry::TypeLibrary;
use crate::types::*;
use crate::value::Value;

const TYPE_FLAG_UNION: u8 = 1;

/// Nesting limit for default values.
const MAX_VALUE_DEPTH: usize = 64;

/// Decode a binary type library into raw descriptors, without registering them.
pub fn load_binary(data: &[u8]) -> Result<(Vec<EnumDesc>, Vec<TypeDesc>)> {
    let mut input = Input { data, offset: 0 };

    if input.u32()? != LIBRARY_MAGIC {
        return Err(malformed("bad type library magic"));
    }
    let version = input.u32()?;
    if version != FORMAT_VERSION {
        return Err(malformed(format!("unsupported type library version {}", version)));
    }
    let enum_count = input.u32()? as usize;
    let type_count = input.u32()? as usize;

    // Every entry takes at least a few bytes, so this caps the preallocation.
    let mut enums = Vec::with_capacity(enum_count.min(data.len()));
    for _ in 0..enum_count {
        enums.push(decode_enum(&mut input)?);
    }
    let mut types = Vec::with_capacity(type_count.min(data.len()));
    for _ in 0..type_count {
        types.push(decode_type(&mut input)?);
    }
    if input.offset != data.len() {
        return Err(malformed(format!(
            "{} trailing bytes after the last type",
            data.len() - input.offset
        )));
    }
    Ok((enums, types))
}

/// Serialize every registered enum and type in registration order.
pub fn write_binary(lib: &TypeLibrary) -> Result<Vec<u8>> {
    let mut out = Output::default();
    out.u32(LIBRARY_MAGIC);
    out.u32(FORMAT_VERSION);
    out.u32(lib.enum_count() as u32);
    out.u32(lib.type_count() as u32);

    for e in lib.enums() {
        out.u32(e.id.0);
        out.str(&e.name)?;
        out.u32(e.values.len() as u32);
        for (name, v) in &e.values {
            out.str(name)?;
            out.u32(*v);
        }
    }
    for t in lib.types() {
        out.u32(t.id.0);
        out.str(&t.name)?;
        out.u8(if t.is_union { TYPE_FLAG_UNION } else { 0 });
        out.u32(t.members.len() as u32);
        for m in &t.members {
            out.str(&m.name)?;
            encode_kind(&mut out, m.kind);
            match &m.default {
                Some(v) => {
                    out.u8(1);
                    encode_value(&mut out, v)?;
                }
                None => out.u8(0),
            }
        }
    }
    Ok(out.buf)
}

fn malformed(msg: impl Into<String>) -> DlError {
    DlError::MalformedTypeLibrary(msg.into())
}

// --- Decode helpers ---

struct Input<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Input<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let data: &'a [u8] = self.data;
        let slice = self
            .offset
            .checked_add(n)
            .and_then(|end| data.get(self.offset..end))
            .ok_or_else(|| malformed(format!("truncated at byte {}", self.offset)))?;
        self.offset += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(read_u32_le(self.take(4)?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(read_u64_le(self.take(8)?))
    }

    fn str(&mut self) -> Result<String> {
        let len = read_u16_le(self.take(2)?) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| malformed(format!("invalid UTF-8: {}", e)))
    }
}

fn decode_enum(input: &mut Input) -> Result<EnumDesc> {
    let id = TypeId(input.u32()?);
    let name = input.str()?;
    let count = input.u32()? as usize;
    let mut values = Vec::with_capacity(count.min(input.data.len()));
    for _ in 0..count {
        let vname = input.str()?;
        let v = input.u32()?;
        values.push((vname, v));
    }
    Ok(EnumDesc { id, name, values })
}

fn decode_type(input: &mut Input) -> Result<TypeDesc> {
    let id = TypeId(input.u32()?);
    let name = input.str()?;
    let flags = input.u8()?;
    if flags & !TYPE_FLAG_UNION != 0 {
        return Err(malformed(format!("unknown flags {:#04x} on type '{}'", flags, name)));
    }
    let count = input.u32()? as usize;
    let mut members = Vec::with_capacity(count.min(input.data.len()));
    for _ in 0..count {
        let mname = input.str()?;
        let kind = decode_kind(input)?;
        let mut member = Member::new(&mname, kind);
        match input.u8()? {
            0 => {}
            1 => member.default = Some(decode_value(input, 0)?),
            flag => {
                let message = format!("bad default flag {} on '{}.{}'", flag, name, mname);
                return Err(malformed(message));
            }
        }
        members.push(member);
    }
    let mut desc = TypeDesc::with_id(id, &name, members);
    desc.is_union = flags & TYPE_FLAG_UNION != 0;
    Ok(desc)
}

fn decode_scalar(input: &mut Input) -> Result<ScalarKind> {
    let code = input.u8()?;
    ScalarKind::from_code(code).ok_or_else(|| malformed(format!("unknown scalar code {}", code)))
}

fn decode_elem(input: &mut Input) -> Result<ElemKind> {
    match input.u8()? {
        0 => Ok(ElemKind::Scalar(decode_scalar(input)?)),
        1 => Ok(ElemKind::Enum(TypeId(input.u32()?))),
        2 => Ok(ElemKind::String),
        3 => Ok(ElemKind::Struct(TypeId(input.u32()?))),
        code => Err(malformed(format!("unknown element code {}", code))),
    }
}

fn decode_kind(input: &mut Input) -> Result<MemberKind> {
    match input.u8()? {
        0 => Ok(MemberKind::Scalar(decode_scalar(input)?)),
        1 => Ok(MemberKind::Enum(TypeId(input.u32()?))),
        2 => {
            let bits = input.u8()?;
            if bits == 0 || bits > 64 {
                return Err(malformed(format!("bitfield width {}", bits)));
            }
            Ok(MemberKind::Bitfield { bits })
        }
        3 => Ok(MemberKind::String),
        4 => Ok(MemberKind::Struct(TypeId(input.u32()?))),
        5 => {
            let elem = decode_elem(input)?;
            let count = input.u32()?;
            Ok(MemberKind::InlineArray { elem, count })
        }
        6 => Ok(MemberKind::Array { elem: decode_elem(input)? }),
        code => Err(malformed(format!("unknown member kind {}", code))),
    }
}

fn decode_value(input: &mut Input, depth: usize) -> Result<Value> {
    if depth > MAX_VALUE_DEPTH {
        return Err(malformed("default value nested too deeply"));
    }
    match input.u8()? {
        0 => Ok(Value::Int(input.u64()? as i64)),
        1 => Ok(Value::UInt(input.u64()?)),
        2 => Ok(Value::Float(f64::from_bits(input.u64()?))),
        3 => Ok(Value::Str(input.str()?)),
        4 => Ok(Value::Enum(input.str()?)),
        5 => {
            let count = input.u32()? as usize;
            let mut items = Vec::with_capacity(count.min(input.data.len()));
            for _ in 0..count {
                items.push(decode_value(input, depth + 1)?);
            }
            Ok(Value::Array(items))
        }
        6 => {
            let count = input.u32()? as usize;
            let mut map = HashMap::with_capacity(count.min(input.data.len()));
            for _ in 0..count {
                let key = input.str()?;
                map.insert(key, decode_value(input, depth + 1)?);
            }
            Ok(Value::Struct(map))
        }
        tag => Err(malformed(format!("unknown value tag {}", tag))),
    }
}

// --- Encode helpers ---

#[derive(Default)]
struct Output {
    buf: Vec<u8>,
}

impl Output {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn str(&mut self, s: &str) -> Result<()> {
        let len = u16::try_from(s.len())
            .map_err(|_| malformed(format!("name too long: {} bytes", s.len())))?;
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

fn encode_elem(out: &mut Output, elem: ElemKind) {
    match elem {
        ElemKind::Scalar(k) => {
            out.u8(0);
            out.u8(k.code());
        }
        ElemKind::Enum(id) => {
            out.u8(1);
            out.u32(id.0);
        }
        ElemKind::String => out.u8(2),
        ElemKind::Struct(id) => {
            out.u8(3);
            out.u32(id.0);
        }
    }
}

fn encode_kind(out: &mut Output, kind: MemberKind) {
    match kind {
        MemberKind::Scalar(k) => {
            out.u8(0);
            out.u8(k.code());
        }
        MemberKind::Enum(id) => {
            out.u8(1);
            out.u32(id.0);
        }
        MemberKind::Bitfield { bits } => {
            out.u8(2);
            out.u8(bits);
        }
        MemberKind::String => out.u8(3),
        MemberKind::Struct(id) => {
            out.u8(4);
            out.u32(id.0);
        }
        MemberKind::InlineArray { elem, count } => {
            out.u8(5);
            encode_elem(out, elem);
            out.u32(count);
        }
        MemberKind::Array { elem } => {
            out.u8(6);
            encode_elem(out, elem);
        }
    }
}

fn encode_value(out: &mut Output, value: &Value) -> Result<()> {
    match value {
        Value::Int(v) => {
            out.u8(0);
            out.u64(*v as u64);
        }
        Value::UInt(v) => {
            out.u8(1);
            out.u64(*v);
        }
        Value::Float(v) => {
            out.u8(2);
            out.u64(v.to_bits());
        }
        Value::Str(s) => {
            out.u8(3);
            out.str(s)?;
        }
        Value::Enum(s) => {
            out.u8(4);
            out.str(s)?;
        }
        Value::Array(items) => {
            out.u8(5);
            out.u32(items.len() as u32);
            for item in items {
                encode_value(out, item)?;
            }
        }
        Value::Struct(map) => {
            out.u8(6);
            out.u32(map.len() as u32);
            // sorted for a stable byte image
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                out.str(key)?;
                encode_value(out, &map[key])?;
            }
        }
    }
    Ok(())
}

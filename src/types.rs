use std::fmt;

use crate::value::Value;

/// Identifier of a registered type or enum.
///
/// Ids are derived from the name with a DJB-style hash, offset so that the
/// empty name maps to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Hash a type or enum name into its id.
    pub fn from_name(name: &str) -> TypeId {
        let mut hash: u32 = 5381;
        for b in name.bytes() {
            hash = hash.wrapping_mul(33).wrapping_add(b as u32);
        }
        TypeId(hash.wrapping_sub(5381))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<u32> for TypeId {
    fn from(v: u32) -> Self {
        TypeId(v)
    }
}

/// Primitive numeric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 10] = [
        ScalarKind::I8,
        ScalarKind::I16,
        ScalarKind::I32,
        ScalarKind::I64,
        ScalarKind::U8,
        ScalarKind::U16,
        ScalarKind::U32,
        ScalarKind::U64,
        ScalarKind::F32,
        ScalarKind::F64,
    ];

    /// Storage size in bytes; also the alignment.
    pub fn size(self) -> u32 {
        match self {
            ScalarKind::I8 | ScalarKind::U8 => 1,
            ScalarKind::I16 | ScalarKind::U16 => 2,
            ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32 => 4,
            ScalarKind::I64 | ScalarKind::U64 | ScalarKind::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            ScalarKind::I8 | ScalarKind::I16 | ScalarKind::I32 | ScalarKind::I64
        )
    }

    /// Inclusive integer range of the kind. Floats report the i128 range.
    pub fn int_range(self) -> (i128, i128) {
        match self {
            ScalarKind::I8 => (i8::MIN as i128, i8::MAX as i128),
            ScalarKind::I16 => (i16::MIN as i128, i16::MAX as i128),
            ScalarKind::I32 => (i32::MIN as i128, i32::MAX as i128),
            ScalarKind::I64 => (i64::MIN as i128, i64::MAX as i128),
            ScalarKind::U8 => (0, u8::MAX as i128),
            ScalarKind::U16 => (0, u16::MAX as i128),
            ScalarKind::U32 => (0, u32::MAX as i128),
            ScalarKind::U64 => (0, u64::MAX as i128),
            ScalarKind::F32 | ScalarKind::F64 => (i128::MIN, i128::MAX),
        }
    }

    /// Code used by the binary type library.
    pub fn code(self) -> u8 {
        match self {
            ScalarKind::I8 => 0,
            ScalarKind::I16 => 1,
            ScalarKind::I32 => 2,
            ScalarKind::I64 => 3,
            ScalarKind::U8 => 4,
            ScalarKind::U16 => 5,
            ScalarKind::U32 => 6,
            ScalarKind::U64 => 7,
            ScalarKind::F32 => 8,
            ScalarKind::F64 => 9,
        }
    }

    pub fn from_code(code: u8) -> Option<ScalarKind> {
        ScalarKind::ALL.get(code as usize).copied()
    }

    /// Name used by the text type library.
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::I8 => "int8",
            ScalarKind::I16 => "int16",
            ScalarKind::I32 => "int32",
            ScalarKind::I64 => "int64",
            ScalarKind::U8 => "uint8",
            ScalarKind::U16 => "uint16",
            ScalarKind::U32 => "uint32",
            ScalarKind::U64 => "uint64",
            ScalarKind::F32 => "fp32",
            ScalarKind::F64 => "fp64",
        }
    }

    pub fn from_name(name: &str) -> Option<ScalarKind> {
        match name {
            "float32" => Some(ScalarKind::F32),
            "float64" => Some(ScalarKind::F64),
            _ => ScalarKind::ALL.iter().copied().find(|k| k.name() == name),
        }
    }
}

/// What an array element is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemKind {
    Scalar(ScalarKind),
    Enum(TypeId),
    String,
    Struct(TypeId),
}

/// The kind of a struct member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Scalar(ScalarKind),
    Enum(TypeId),
    /// Packed integer of `bits` width, grouped with neighbouring bitfields.
    Bitfield { bits: u8 },
    String,
    Struct(TypeId),
    /// Fixed-length array stored inside the parent.
    InlineArray { elem: ElemKind, count: u32 },
    /// Variable-length array stored in the variable region.
    Array { elem: ElemKind },
}

impl MemberKind {
    /// Whether the member owns a slot pointing into the variable region.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, MemberKind::String | MemberKind::Array { .. })
    }

    /// Element kind seen by a single element of this member, when it has one.
    pub fn as_elem(&self) -> Option<ElemKind> {
        match *self {
            MemberKind::Scalar(k) => Some(ElemKind::Scalar(k)),
            MemberKind::Enum(id) => Some(ElemKind::Enum(id)),
            MemberKind::String => Some(ElemKind::String),
            MemberKind::Struct(id) => Some(ElemKind::Struct(id)),
            _ => None,
        }
    }
}

impl From<ElemKind> for MemberKind {
    fn from(elem: ElemKind) -> Self {
        match elem {
            ElemKind::Scalar(k) => MemberKind::Scalar(k),
            ElemKind::Enum(id) => MemberKind::Enum(id),
            ElemKind::String => MemberKind::String,
            ElemKind::Struct(id) => MemberKind::Struct(id),
        }
    }
}

/// The two layouts every type is laid out for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutKind {
    /// Wire layout: little endian, 8-byte `(offset, count)` dynamic slots.
    Packed,
    /// In-memory layout: native endian, pointer-sized `(address, count)` slots.
    Native,
}

impl LayoutKind {
    pub const BOTH: [LayoutKind; 2] = [LayoutKind::Packed, LayoutKind::Native];

    pub(crate) fn index(self) -> usize {
        match self {
            LayoutKind::Packed => 0,
            LayoutKind::Native => 1,
        }
    }
}

/// Placement of a bitfield inside its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BitInfo {
    /// Bit position within the group, 0 = least significant.
    pub bit_offset: u8,
    pub bits: u8,
    /// Storage size of the whole group in bytes (1, 2, 4 or 8).
    pub storage: u8,
}

/// A member definition within a struct type.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub kind: MemberKind,
    /// Value used by `store` when the member is absent.
    pub default: Option<Value>,
    /// Byte offset per layout, filled in on registration.
    pub offsets: [u32; 2],
    /// Bit placement, for bitfields only.
    pub bit: Option<BitInfo>,
}

impl Member {
    pub fn new(name: &str, kind: MemberKind) -> Member {
        Member {
            name: name.to_string(),
            kind,
            default: None,
            offsets: [0; 2],
            bit: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Member {
        self.default = Some(default);
        self
    }

    pub fn offset(&self, layout: LayoutKind) -> usize {
        self.offsets[layout.index()] as usize
    }

    /// Compare the declared part of two members, ignoring computed layout.
    pub fn same_definition(&self, other: &Member) -> bool {
        self.name == other.name && self.kind == other.kind && self.default == other.default
    }
}

/// A struct or union type in the type library.
#[derive(Debug, Clone)]
pub struct TypeDesc {
    pub id: TypeId,
    pub name: String,
    /// Members in declaration order.
    pub members: Vec<Member>,
    /// All members share offset 0; a `u32` tag names the active one.
    pub is_union: bool,
    pub sizes: [u32; 2],
    pub aligns: [u32; 2],
    /// Offset of the union tag per layout. Unused for structs.
    pub tag_offsets: [u32; 2],
}

impl TypeDesc {
    /// Create a type whose id is the hash of its name.
    pub fn new(name: &str, members: Vec<Member>) -> TypeDesc {
        TypeDesc::with_id(TypeId::from_name(name), name, members)
    }

    pub fn with_id(id: TypeId, name: &str, members: Vec<Member>) -> TypeDesc {
        TypeDesc {
            id,
            name: name.to_string(),
            members,
            is_union: false,
            sizes: [0; 2],
            aligns: [1; 2],
            tag_offsets: [0; 2],
        }
    }

    /// Create a union whose id is the hash of its name.
    pub fn new_union(name: &str, members: Vec<Member>) -> TypeDesc {
        TypeDesc {
            is_union: true,
            ..TypeDesc::new(name, members)
        }
    }

    pub fn size(&self, layout: LayoutKind) -> usize {
        self.sizes[layout.index()] as usize
    }

    pub fn align(&self, layout: LayoutKind) -> usize {
        self.aligns[layout.index()] as usize
    }

    pub fn tag_offset(&self, layout: LayoutKind) -> usize {
        self.tag_offsets[layout.index()] as usize
    }

    /// Find a member by name.
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Union member selected by a stored tag.
    pub fn member_by_tag(&self, tag: u32) -> Option<&Member> {
        self.members.iter().find(|m| union_tag(&m.name) == tag)
    }

    pub fn same_definition(&self, other: &TypeDesc) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.is_union == other.is_union
            && self.members.len() == other.members.len()
            && self
                .members
                .iter()
                .zip(&other.members)
                .all(|(a, b)| a.same_definition(b))
    }
}

/// Tag stored in a union for its member `name`: the hash of the member name.
pub fn union_tag(name: &str) -> u32 {
    TypeId::from_name(name).0
}

/// An enum in the type library. Stored as `u32`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDesc {
    pub id: TypeId,
    pub name: String,
    pub values: Vec<(String, u32)>,
}

impl EnumDesc {
    pub fn new(name: &str, values: Vec<(&str, u32)>) -> EnumDesc {
        EnumDesc {
            id: TypeId::from_name(name),
            name: name.to_string(),
            values: values.into_iter().map(|(n, v)| (n.to_string(), v)).collect(),
        }
    }

    pub fn value_of(&self, name: &str) -> Option<u32> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    /// First name carrying `value`.
    ///
    /// Aliases share a value, so an alias stored as a name reads back as the
    /// first name declared with that value.
    pub fn name_of(&self, value: u32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }
}

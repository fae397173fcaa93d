//! Type library registry.
//!
//! Holds every registered struct and enum descriptor, keyed by [`TypeId`]. New
//! descriptors are merged into a copy of the library that only replaces the
//! original once every check passed, so a failed load leaves it untouched.

use std::collections::HashMap;

use crate::binary_schema;
use crate::codec::size;
use crate::error::{DlError, Result};
use crate::layout;
use crate::types::{union_tag, ElemKind, EnumDesc, LayoutKind, MemberKind, TypeDesc, TypeId};

/// All registered types and enums.
#[derive(Debug, Clone, Default)]
pub struct TypeLibrary {
    types: HashMap<TypeId, TypeDesc>,
    enums: HashMap<TypeId, EnumDesc>,
    /// Registration order, for iteration and for writing the library back out.
    type_order: Vec<TypeId>,
    enum_order: Vec<TypeId>,
    types_by_name: HashMap<String, TypeId>,
}

impl TypeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a struct type by id.
    pub fn lookup(&self, id: TypeId) -> Result<&TypeDesc> {
        self.types
            .get(&id)
            .ok_or_else(|| DlError::UnknownType(id.to_string()))
    }

    pub fn lookup_enum(&self, id: TypeId) -> Result<&EnumDesc> {
        self.enums
            .get(&id)
            .ok_or_else(|| DlError::UnknownType(format!("enum {}", id)))
    }

    pub fn find_type_by_name(&self, name: &str) -> Option<&TypeDesc> {
        self.types_by_name.get(name).and_then(|id| self.types.get(id))
    }

    pub fn contains(&self, id: TypeId) -> bool {
        self.types.contains_key(&id)
    }

    /// Struct types in registration order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDesc> {
        self.type_order.iter().filter_map(|id| self.types.get(id))
    }

    /// Enums in registration order.
    pub fn enums(&self) -> impl Iterator<Item = &EnumDesc> {
        self.enum_order.iter().filter_map(|id| self.enums.get(id))
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn enum_count(&self) -> usize {
        self.enums.len()
    }

    /// Decode and register a binary type library. On failure nothing is registered.
    pub fn load_binary(&mut self, data: &[u8]) -> Result<()> {
        let (enums, types) = binary_schema::load_binary(data)?;
        self.register(enums, types)
    }

    /// Serialize the library into the binary type library format.
    pub fn write_binary(&self) -> Result<Vec<u8>> {
        binary_schema::write_binary(self)
    }

    /// Register new descriptors atomically.
    pub fn register(&mut self, enums: Vec<EnumDesc>, types: Vec<TypeDesc>) -> Result<()> {
        let merged = self.merged(enums, types)?;
        *self = merged;
        Ok(())
    }

    /// Build a copy of this library with `enums` and `types` added.
    ///
    /// Fails with `IdCollision` when an id is already taken by a different
    /// descriptor, `UnknownType` for dangling references and
    /// `MalformedTypeLibrary` for invalid descriptors or defaults.
    pub fn merged(&self, enums: Vec<EnumDesc>, types: Vec<TypeDesc>) -> Result<TypeLibrary> {
        let mut lib = self.clone();

        for e in enums {
            if let Some(existing) = lib.enums.get(&e.id) {
                if *existing != e {
                    return Err(DlError::IdCollision { id: e.id, name: e.name });
                }
                continue;
            }
            if lib.types.contains_key(&e.id) {
                return Err(DlError::IdCollision { id: e.id, name: e.name });
            }
            lib.enum_order.push(e.id);
            lib.enums.insert(e.id, e);
        }

        let mut pending = Vec::new();
        for t in types {
            if t.members.is_empty() {
                let message = format!("type '{}' has no members", t.name);
                return Err(DlError::MalformedTypeLibrary(message));
            }
            for (i, m) in t.members.iter().enumerate() {
                if t.members[..i].iter().any(|o| o.name == m.name) {
                    return Err(DlError::MalformedTypeLibrary(format!(
                        "member '{}' declared twice in '{}'",
                        m.name, t.name
                    )));
                }
                if let MemberKind::InlineArray { count: 0, .. } = m.kind {
                    return Err(DlError::MalformedTypeLibrary(format!(
                        "inline array '{}' in '{}' has no elements",
                        m.name, t.name
                    )));
                }
            }
            if t.is_union {
                check_union(&t)?;
            }
            if let Some(existing) = lib.types.get(&t.id) {
                if !existing.same_definition(&t) {
                    return Err(DlError::IdCollision { id: t.id, name: t.name });
                }
                continue;
            }
            if lib.enums.contains_key(&t.id) {
                return Err(DlError::IdCollision { id: t.id, name: t.name });
            }
            pending.push(t.id);
            lib.type_order.push(t.id);
            lib.types_by_name.insert(t.name.clone(), t.id);
            lib.types.insert(t.id, t);
        }

        for id in &pending {
            lib.check_references(&lib.types[id])?;
        }
        layout::compute(&mut lib.types, &pending)?;
        for id in &pending {
            lib.check_defaults(&lib.types[id])?;
        }

        tracing::debug!(
            new_types = pending.len(),
            types = lib.types.len(),
            enums = lib.enums.len(),
            "type library merged"
        );
        Ok(lib)
    }

    /// Copy with unvalidated descriptors added for name and member lookups only.
    /// Nothing in it is laid out; it must not be used to store or load.
    pub(crate) fn overlay(&self, enums: &[EnumDesc], types: &[TypeDesc]) -> TypeLibrary {
        let mut lib = self.clone();
        for e in enums {
            lib.enums.entry(e.id).or_insert_with(|| e.clone());
        }
        for t in types {
            lib.types.entry(t.id).or_insert_with(|| t.clone());
        }
        lib
    }

    fn check_references(&self, desc: &TypeDesc) -> Result<()> {
        for m in &desc.members {
            let elem = match m.kind {
                MemberKind::InlineArray { elem, .. } | MemberKind::Array { elem } => Some(elem),
                ref kind => kind.as_elem(),
            };
            match elem {
                Some(ElemKind::Struct(id)) if !self.types.contains_key(&id) => {
                    return Err(DlError::UnknownType(format!(
                        "{} referenced by '{}.{}'",
                        id, desc.name, m.name
                    )));
                }
                Some(ElemKind::Enum(id)) if !self.enums.contains_key(&id) => {
                    return Err(DlError::UnknownType(format!(
                        "enum {} referenced by '{}.{}'",
                        id, desc.name, m.name
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_defaults(&self, desc: &TypeDesc) -> Result<()> {
        for m in &desc.members {
            if let Some(default) = &m.default {
                let path = format!("{}.{}", desc.name, m.name);
                size::measure_member(self, m, default, &path, LayoutKind::Packed).map_err(|e| {
                    DlError::MalformedTypeLibrary(format!("invalid default for '{}': {}", path, e))
                })?;
            }
        }
        Ok(())
    }
}

/// Union members carry no defaults and must have distinct tags.
fn check_union(desc: &TypeDesc) -> Result<()> {
    for (i, m) in desc.members.iter().enumerate() {
        if m.default.is_some() {
            return Err(DlError::MalformedTypeLibrary(format!(
                "union member '{}.{}' cannot have a default",
                desc.name, m.name
            )));
        }
        let tag = union_tag(&m.name);
        if let Some(other) = desc.members[..i].iter().find(|o| union_tag(&o.name) == tag) {
            return Err(DlError::MalformedTypeLibrary(format!(
                "union '{}' members '{}' and '{}' share tag {:#x}",
                desc.name, other.name, m.name, tag
            )));
        }
    }
    Ok(())
}

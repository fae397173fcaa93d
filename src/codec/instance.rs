//! Read access to loaded, in-memory instances.

use crate::context::SystemAllocator;
use crate::error::{DlError, Result};
use crate::registry::TypeLibrary;
use crate::types::{union_tag, LayoutKind, TypeDesc, TypeId};
use crate::value::Value;

use super::decoder::Reader;

/// A borrowed view of an instance in the in-memory layout.
///
/// Dynamic slots hold absolute addresses into the buffer the instance was
/// loaded into. The view turns them back into offsets and bounds-checks them,
/// so it must be created over that same buffer, at the same address.
#[derive(Debug, Clone, Copy)]
pub struct InstanceRef<'a> {
    lib: &'a TypeLibrary,
    desc: &'a TypeDesc,
    buf: &'a [u8],
}

impl<'a> InstanceRef<'a> {
    pub fn new(lib: &'a TypeLibrary, type_id: TypeId, buf: &'a [u8]) -> Result<InstanceRef<'a>> {
        let desc = lib.lookup(type_id)?;
        if buf.len() < desc.size(LayoutKind::Native) {
            return Err(DlError::BufferTooSmall {
                need: desc.size(LayoutKind::Native),
                have: buf.len(),
            });
        }
        Ok(InstanceRef { lib, desc, buf })
    }

    pub fn type_desc(&self) -> &'a TypeDesc {
        self.desc
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.buf
    }

    /// Read a single member. On a union only the active member can be read.
    pub fn get(&self, member: &str) -> Result<Value> {
        let m = self.desc.member(member).ok_or_else(|| {
            DlError::mismatch(
                &format!("{}.{}", self.desc.name, member),
                format!("a member of {}", self.desc.name),
                "unknown member",
            )
        })?;
        let path = format!("{}.{}", self.desc.name, m.name);
        let mut reader = self.reader()?;
        if self.desc.is_union && reader.union_tag(self.desc, 0)? != union_tag(&m.name) {
            return Err(DlError::mismatch(&path, "the active union member", "inactive member"));
        }
        reader.read_member(m, m.offset(LayoutKind::Native), &path)
    }

    /// Read the whole instance.
    pub fn to_value(&self) -> Result<Value> {
        self.reader()?.read_struct(self.desc, 0, &self.desc.name)
    }

    fn reader(&self) -> Result<Reader<'a>> {
        Reader::new(
            self.lib,
            LayoutKind::Native,
            self.buf,
            self.buf.as_ptr() as usize,
            self.desc,
            &SystemAllocator,
        )
    }
}

/// An in-memory instance that owns its buffer.
///
/// The buffer lives on the heap, so moving the `LoadedInstance` keeps the
/// addresses stored inside it valid.
#[derive(Debug)]
pub struct LoadedInstance {
    type_id: TypeId,
    buf: Vec<u8>,
}

impl LoadedInstance {
    pub(crate) fn new(type_id: TypeId, buf: Vec<u8>) -> LoadedInstance {
        LoadedInstance { type_id, buf }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// View the instance through `lib`, which must hold its type.
    pub fn view<'a>(&'a self, lib: &'a TypeLibrary) -> Result<InstanceRef<'a>> {
        InstanceRef::new(lib, self.type_id, &self.buf)
    }
}

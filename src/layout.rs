//! Layout engine: member offsets, bitfield packing and type sizes for both layouts.

use std::collections::{HashMap, HashSet};

use crate::codec::wire::{align_up, slot_footprint};
use crate::error::{DlError, Result};
use crate::registry::TypeLibrary;
use crate::types::{BitInfo, ElemKind, LayoutKind, MemberKind, TypeDesc, TypeId};

/// Widest bitfield group.
pub const MAX_GROUP_BITS: u32 = 64;

#[derive(Debug, Clone, Copy)]
struct Footprint {
    sizes: [u32; 2],
    aligns: [u32; 2],
    tag_offsets: [u32; 2],
}

struct TypeLayout {
    offsets: Vec<[u32; 2]>,
    bits: Vec<Option<BitInfo>>,
    footprint: Footprint,
}

/// Compute layout for every type in `pending`. Types outside `pending` are
/// assumed to be laid out already.
pub(crate) fn compute(types: &mut HashMap<TypeId, TypeDesc>, pending: &[TypeId]) -> Result<()> {
    let mut engine = Engine {
        types,
        pending: pending.iter().copied().collect(),
        done: HashMap::new(),
        visiting: HashSet::new(),
    };
    for id in pending {
        engine.visit(*id)?;
    }
    let done = engine.done;
    for (id, layout) in done {
        if let Some(desc) = types.get_mut(&id) {
            for (i, member) in desc.members.iter_mut().enumerate() {
                member.offsets = layout.offsets[i];
                member.bit = layout.bits[i];
            }
            desc.sizes = layout.footprint.sizes;
            desc.aligns = layout.footprint.aligns;
            desc.tag_offsets = layout.footprint.tag_offsets;
        }
    }
    Ok(())
}

struct Engine<'a> {
    types: &'a HashMap<TypeId, TypeDesc>,
    pending: HashSet<TypeId>,
    done: HashMap<TypeId, TypeLayout>,
    visiting: HashSet<TypeId>,
}

impl Engine<'_> {
    fn visit(&mut self, id: TypeId) -> Result<Footprint> {
        if let Some(layout) = self.done.get(&id) {
            return Ok(layout.footprint);
        }
        let desc = self
            .types
            .get(&id)
            .ok_or_else(|| DlError::UnknownType(id.to_string()))?;
        if !self.pending.contains(&id) {
            return Ok(Footprint {
                sizes: desc.sizes,
                aligns: desc.aligns,
                tag_offsets: desc.tag_offsets,
            });
        }
        if !self.visiting.insert(id) {
            return Err(DlError::MalformedTypeLibrary(format!(
                "type '{}' contains itself inline",
                desc.name
            )));
        }

        let mut offsets = vec![[0u32; 2]; desc.members.len()];
        let (bits, footprint) = if desc.is_union {
            (vec![None; desc.members.len()], self.union_footprint(desc)?)
        } else {
            let bits = assign_bits(desc)?;
            let footprint = self.struct_footprint(desc, &bits, &mut offsets)?;
            (bits, footprint)
        };

        self.visiting.remove(&id);
        self.done.insert(id, TypeLayout { offsets, bits, footprint });
        Ok(footprint)
    }

    fn struct_footprint(
        &mut self,
        desc: &TypeDesc,
        bits: &[Option<BitInfo>],
        offsets: &mut [[u32; 2]],
    ) -> Result<Footprint> {
        let mut footprint = Footprint { sizes: [0; 2], aligns: [1; 2], tag_offsets: [0; 2] };
        for layout in LayoutKind::BOTH {
            let li = layout.index();
            let mut cursor = 0usize;
            let mut max_align = 1usize;
            let mut i = 0;
            while i < desc.members.len() {
                if let Some(info) = bits[i] {
                    // whole group shares one storage unit
                    let storage = info.storage as usize;
                    let at = align_up(cursor, storage);
                    let mut j = i;
                    while j < desc.members.len() && continues_group(bits, i, j) {
                        offsets[j][li] = at as u32;
                        j += 1;
                    }
                    cursor = at + storage;
                    max_align = max_align.max(storage);
                    i = j;
                    continue;
                }
                let (size, align) = self.member_footprint(&desc.members[i].kind, layout)?;
                let at = align_up(cursor, align);
                offsets[i][li] = at as u32;
                cursor = at + size;
                max_align = max_align.max(align);
                i += 1;
            }
            footprint.sizes[li] = checked_size(desc, align_up(cursor, max_align))?;
            footprint.aligns[li] = max_align as u32;
        }
        Ok(footprint)
    }

    /// Members overlap at offset 0; the tag follows the largest of them.
    fn union_footprint(&mut self, desc: &TypeDesc) -> Result<Footprint> {
        let mut footprint = Footprint { sizes: [0; 2], aligns: [1; 2], tag_offsets: [0; 2] };
        for layout in LayoutKind::BOTH {
            let li = layout.index();
            let mut largest = 0usize;
            let mut max_align = 4usize;
            for member in &desc.members {
                if let MemberKind::Bitfield { .. } = member.kind {
                    return Err(DlError::MalformedTypeLibrary(format!(
                        "union '{}' cannot hold bitfield '{}'",
                        desc.name, member.name
                    )));
                }
                let (size, align) = self.member_footprint(&member.kind, layout)?;
                largest = largest.max(size);
                max_align = max_align.max(align);
            }
            let tag_at = align_up(largest, 4);
            footprint.tag_offsets[li] = checked_size(desc, tag_at)?;
            footprint.sizes[li] = checked_size(desc, align_up(tag_at + 4, max_align))?;
            footprint.aligns[li] = max_align as u32;
        }
        Ok(footprint)
    }

    fn member_footprint(
        &mut self,
        kind: &MemberKind,
        layout: LayoutKind,
    ) -> Result<(usize, usize)> {
        match *kind {
            MemberKind::InlineArray { elem, count } => {
                let (size, align) = self.elem_footprint(elem, layout)?;
                let stride = align_up(size, align);
                let total = stride.checked_mul(count as usize).ok_or_else(|| {
                    DlError::MalformedTypeLibrary("inline array is too large".into())
                })?;
                Ok((total, align))
            }
            MemberKind::Array { .. } | MemberKind::String => Ok(slot_footprint(layout)),
            MemberKind::Bitfield { .. } => Err(DlError::MalformedTypeLibrary(
                "bitfield outside of a group".into(),
            )),
            _ => match kind.as_elem() {
                Some(elem) => self.elem_footprint(elem, layout),
                None => Err(DlError::MalformedTypeLibrary("member kind has no footprint".into())),
            },
        }
    }

    fn elem_footprint(&mut self, elem: ElemKind, layout: LayoutKind) -> Result<(usize, usize)> {
        let li = layout.index();
        match elem {
            ElemKind::Scalar(k) => Ok((k.size() as usize, k.size() as usize)),
            ElemKind::Enum(_) => Ok((4, 4)),
            ElemKind::String => Ok(slot_footprint(layout)),
            ElemKind::Struct(id) => {
                let fp = self.visit(id)?;
                Ok((fp.sizes[li] as usize, fp.aligns[li] as usize))
            }
        }
    }
}

/// Whether member `j` still belongs to the bitfield group that starts at `i`.
fn continues_group(bits: &[Option<BitInfo>], i: usize, j: usize) -> bool {
    match bits[j] {
        Some(info) => j == i || info.bit_offset != 0,
        None => false,
    }
}

fn checked_size(desc: &TypeDesc, size: usize) -> Result<u32> {
    u32::try_from(size)
        .map_err(|_| DlError::MalformedTypeLibrary(format!("type '{}' is too large", desc.name)))
}

/// Assign bit positions to every bitfield member. The storage of each group is
/// filled into all of its members; a group always starts at bit offset 0.
fn assign_bits(desc: &TypeDesc) -> Result<Vec<Option<BitInfo>>> {
    let mut out: Vec<Option<BitInfo>> = vec![None; desc.members.len()];
    let mut group: Vec<usize> = Vec::new();
    let mut cursor: u32 = 0;

    fn close(out: &mut [Option<BitInfo>], group: &mut Vec<usize>, used: u32) {
        let bytes = used.div_ceil(8);
        let storage = match bytes {
            0..=1 => 1,
            2 => 2,
            3..=4 => 4,
            _ => 8,
        };
        for &i in group.iter() {
            if let Some(info) = out[i].as_mut() {
                info.storage = storage;
            }
        }
        group.clear();
    }

    for (i, member) in desc.members.iter().enumerate() {
        let MemberKind::Bitfield { bits } = member.kind else {
            if !group.is_empty() {
                close(&mut out, &mut group, cursor);
            }
            continue;
        };
        let width = bits as u32;
        if width == 0 || width > MAX_GROUP_BITS {
            return Err(DlError::MalformedTypeLibrary(format!(
                "bitfield '{}' in '{}' has width {}",
                member.name, desc.name, width
            )));
        }
        if group.is_empty() {
            cursor = 0;
        }
        let straddles = cursor % 8 != 0 && cursor / 8 != (cursor + width - 1) / 8;
        let mut start = if straddles { align_up(cursor as usize, 8) as u32 } else { cursor };
        if start + width > MAX_GROUP_BITS {
            close(&mut out, &mut group, cursor);
            start = 0;
        }
        out[i] = Some(BitInfo { bit_offset: start as u8, bits, storage: 0 });
        group.push(i);
        cursor = start + width;
    }
    if !group.is_empty() {
        close(&mut out, &mut group, cursor);
    }
    Ok(out)
}

/// Size and alignment of one array element of a registered library.
/// Element sizes are already multiples of their alignment, so size is the stride.
pub fn elem_footprint(
    lib: &TypeLibrary,
    elem: ElemKind,
    layout: LayoutKind,
) -> Result<(usize, usize)> {
    match elem {
        ElemKind::Scalar(k) => Ok((k.size() as usize, k.size() as usize)),
        ElemKind::Enum(_) => Ok((4, 4)),
        ElemKind::String => Ok(slot_footprint(layout)),
        ElemKind::Struct(id) => {
            let desc = lib.lookup(id)?;
            Ok((desc.size(layout), desc.align(layout)))
        }
    }
}

/// Mask of the low `bits` bits.
#[inline]
pub fn bit_mask(bits: u8) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

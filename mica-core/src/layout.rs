//! Bit-layout (ABI) computation.
//!
//! [`layout_of`] converts a resolved type handle into its concrete
//! bit-level shape for a given native pointer width. It is pure and
//! deterministic: the same handle and pointer width always produce a
//! bit-for-bit identical layout.

use crate::types::{Prim, ScopeArena, TypeDef, TypeRef};

/// Category a layout falls into; drives the interpreter's typed
/// arithmetic dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    /// No data layout (function types).
    None,
    Unsigned,
    Signed,
    Float,
    Pointer,
    Aggregate,
}

/// Concrete bit-level shape of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub kind: LayoutKind,
    pub bits: u32,
    pub align_bits: u32,
    /// Sub-layouts with bit offsets; only non-empty for aggregates.
    pub fields: Vec<FieldLayout>,
}

/// One aggregate field placed at a bit offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub offset_bits: u32,
    pub layout: Layout,
}

impl Layout {
    pub fn none() -> Layout {
        Layout {
            kind: LayoutKind::None,
            bits: 0,
            align_bits: 0,
            fields: Vec::new(),
        }
    }

    pub fn scalar(kind: LayoutKind, bits: u32) -> Layout {
        Layout {
            kind,
            bits,
            align_bits: bits,
            fields: Vec::new(),
        }
    }

    pub fn size_bytes(&self) -> u32 {
        self.bits / 8
    }

    pub fn align_bytes(&self) -> u32 {
        (self.align_bits / 8).max(1)
    }

    /// Short descriptor used by the instruction dump, e.g. `u32`,
    /// `ptr64`, `agg64`.
    pub fn describe(&self) -> String {
        match self.kind {
            LayoutKind::None => "none".to_string(),
            LayoutKind::Unsigned => format!("u{}", self.bits),
            LayoutKind::Signed => format!("s{}", self.bits),
            LayoutKind::Float => format!("f{}", self.bits),
            LayoutKind::Pointer => format!("ptr{}", self.bits),
            LayoutKind::Aggregate => format!("agg{}", self.bits),
        }
    }

    /// Byte offset of aggregate field `index`.
    pub fn field_offset_bytes(&self, index: usize) -> u32 {
        self.fields[index].offset_bits / 8
    }
}

/// Compute the layout of `ty` for a target whose pointers are
/// `pointer_bits` wide.
pub fn layout_of(ty: &TypeRef, scopes: &ScopeArena, pointer_bits: u32) -> Layout {
    if ty.indirection > 0 {
        return Layout::scalar(LayoutKind::Pointer, pointer_bits);
    }
    match scopes.type_def(ty) {
        TypeDef::Prim(prim) => prim_layout(*prim, pointer_bits),
        TypeDef::Func { .. } => Layout::none(),
        TypeDef::Struct { fields, .. } => {
            let mut offset = 0u32;
            let mut align = 8u32;
            let mut placed = Vec::with_capacity(fields.len());
            for (_, field_ty) in fields {
                let field = layout_of(field_ty, scopes, pointer_bits);
                let field_align = field.align_bits.max(8);
                offset = round_up(offset, field_align);
                align = align.max(field_align);
                placed.push(FieldLayout {
                    offset_bits: offset,
                    layout: field.clone(),
                });
                offset += field.bits;
            }
            // Total size rounds up to the aggregate's own alignment so
            // that arrays of it pack correctly.
            Layout {
                kind: LayoutKind::Aggregate,
                bits: round_up(offset, align),
                align_bits: align,
                fields: placed,
            }
        }
    }
}

fn prim_layout(prim: Prim, pointer_bits: u32) -> Layout {
    use LayoutKind::*;
    match prim {
        Prim::U8 => Layout::scalar(Unsigned, 8),
        Prim::U16 => Layout::scalar(Unsigned, 16),
        Prim::U32 => Layout::scalar(Unsigned, 32),
        Prim::U64 => Layout::scalar(Unsigned, 64),
        Prim::S8 => Layout::scalar(Signed, 8),
        Prim::S16 => Layout::scalar(Signed, 16),
        Prim::S32 => Layout::scalar(Signed, 32),
        Prim::S64 => Layout::scalar(Signed, 64),
        Prim::F32 => Layout::scalar(Float, 32),
        Prim::F64 => Layout::scalar(Float, 64),
        Prim::Int => Layout::scalar(Signed, pointer_bits),
        Prim::Uint => Layout::scalar(Unsigned, pointer_bits),
        Prim::Bool => Layout::scalar(Unsigned, 8),
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Prim, ScopeArena, TypeDef};

    fn struct_of(arena: &mut ScopeArena, fields: &[(&str, Prim)]) -> TypeRef {
        let fields = fields
            .iter()
            .map(|(name, prim)| (name.to_string(), arena.prim(*prim)))
            .collect();
        arena.add_type(
            ScopeArena::ROOT,
            Some("T"),
            TypeDef::Struct {
                name: "T".to_string(),
                fields,
            },
        )
    }

    #[test]
    fn machine_widths_follow_the_pointer_width() {
        let arena = ScopeArena::new();
        let int = layout_of(&arena.prim(Prim::Int), &arena, 64);
        assert_eq!((int.kind, int.bits), (LayoutKind::Signed, 64));
        let uint = layout_of(&arena.prim(Prim::Uint), &arena, 32);
        assert_eq!((uint.kind, uint.bits), (LayoutKind::Unsigned, 32));
    }

    #[test]
    fn pointers_take_the_platform_width_regardless_of_pointee() {
        let arena = ScopeArena::new();
        let p = arena.prim(Prim::U8).pointer_to();
        let layout = layout_of(&p, &arena, 64);
        assert_eq!((layout.kind, layout.bits), (LayoutKind::Pointer, 64));
    }

    #[test]
    fn two_s32_fields_pack_into_64_bits() {
        // data Point(x s32, y s32) on a 64-bit target.
        let mut arena = ScopeArena::new();
        let point = struct_of(&mut arena, &[("x", Prim::S32), ("y", Prim::S32)]);
        let layout = layout_of(&point, &arena, 64);
        assert_eq!(layout.kind, LayoutKind::Aggregate);
        assert_eq!(layout.bits, 64);
        assert_eq!(layout.align_bits, 32);
        assert_eq!(layout.fields[0].offset_bits, 0);
        assert_eq!(layout.fields[1].offset_bits, 32);
    }

    #[test]
    fn fields_are_padded_to_their_own_alignment() {
        let mut arena = ScopeArena::new();
        let t = struct_of(&mut arena, &[("a", Prim::U8), ("b", Prim::U32), ("c", Prim::U8)]);
        let layout = layout_of(&t, &arena, 64);
        assert_eq!(layout.fields[0].offset_bits, 0);
        assert_eq!(layout.fields[1].offset_bits, 32);
        assert_eq!(layout.fields[2].offset_bits, 64);
        // Tail padding rounds the total up to the max field alignment.
        assert_eq!(layout.bits, 96);
        assert_eq!(layout.align_bits, 32);
    }

    #[test]
    fn field_offsets_never_overlap_and_respect_alignment() {
        let mut arena = ScopeArena::new();
        let t = struct_of(
            &mut arena,
            &[("a", Prim::U8), ("b", Prim::U64), ("c", Prim::U16), ("d", Prim::U32)],
        );
        let layout = layout_of(&t, &arena, 64);
        for pair in layout.fields.windows(2) {
            let end = pair[0].offset_bits + pair[0].layout.bits;
            assert!(pair[1].offset_bits >= end);
            assert_eq!(pair[1].offset_bits % pair[1].layout.align_bits, 0);
        }
    }

    #[test]
    fn layout_of_is_deterministic() {
        let mut arena = ScopeArena::new();
        let t = struct_of(&mut arena, &[("a", Prim::U8), ("b", Prim::F64)]);
        assert_eq!(layout_of(&t, &arena, 64), layout_of(&t, &arena, 64));
    }

    #[test]
    fn function_types_have_no_data_layout() {
        let mut arena = ScopeArena::new();
        let f = arena.add_type(
            ScopeArena::ROOT,
            None,
            TypeDef::Func {
                params: vec![],
                ret: None,
            },
        );
        assert_eq!(layout_of(&f, &arena, 64).kind, LayoutKind::None);
    }
}

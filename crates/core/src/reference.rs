//! The polymorphic reference model (spec.md §3.4/§4.3).
//!
//! A `REF` names any other cell in the arena by absolute cell index. This module only
//! does the address arithmetic and region classification; lifetime discipline (a REF
//! is only valid while its target is reachable) is the surface compiler's
//! responsibility, per spec.md §3.4 — the core does not detect use-after-invalidation.

use crate::arena::{Arena, Region, CELL_BYTES};
use crate::cell::{Cell, Decoded, Tag};
use crate::error::VmError;

/// A REF value: an absolute cell index into the arena, carried inside a tagged `Cell`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ref(pub usize);

/// Build a REF cell pointing at `abs_cell`. Fails if the index doesn't fit the 16-bit
/// payload (spec.md §4.2's declared range for `REF`: absolute cell index within total
/// arena cells).
pub fn make_ref(abs_cell: usize) -> Result<Cell, VmError> {
    if abs_cell > crate::cell::MAX_VALUE16 as usize {
        return Err(VmError::OutOfBounds { addr: abs_cell });
    }
    Ok(Cell::encode(Tag::Ref, abs_cell as u16, false))
}

/// Extract the absolute cell index from a REF cell.
pub fn abs_cell(r: Cell) -> Result<usize, VmError> {
    match r.decode() {
        Decoded::Boxed {
            tag: Tag::Ref,
            value,
            ..
        } => Ok(value as usize),
        _ => Err(VmError::InvalidTag { bits: r.to_bits() }),
    }
}

/// The byte address of a REF's target (cells are [`CELL_BYTES`] bytes apiece).
pub fn abs_byte(r: Cell) -> Result<usize, VmError> {
    abs_cell(r).map(|c| c * CELL_BYTES)
}

/// Which region a REF's target falls in.
pub fn region_of(arena: &Arena, r: Cell) -> Result<Region, VmError> {
    let cell = abs_cell(r)?;
    arena
        .region_of(cell)
        .ok_or(VmError::OutOfBounds { addr: cell })
}

/// Read through a REF: one cell at its target address.
pub fn read_through(arena: &Arena, r: Cell) -> Result<Cell, VmError> {
    let cell = abs_cell(r)?;
    arena.read_cell(cell)
}

/// Write through a REF: one cell at its target address.
pub fn write_through(arena: &mut Arena, r: Cell, v: Cell) -> Result<(), VmError> {
    let cell = abs_cell(r)?;
    arena.write_cell(cell, v)
}

/// `make_ref(bp + slot)`, used by the locals protocol (spec.md §4.9's `VarRef`). Fails
/// if `bp + slot` falls outside the return-stack region.
pub fn var_ref(arena: &Arena, bp: usize, slot: u16) -> Result<Cell, VmError> {
    let target = bp + slot as usize;
    match arena.region_of(target) {
        Some(Region::ReturnStack) => make_ref(target),
        _ => Err(VmError::OutOfBounds { addr: target }),
    }
}

/// Dereference a REF, collapsing one level if the target is itself a REF (used during
/// list-bounds resolution, spec.md §3.4: "dereferencing a REF whose target is itself a
/// REF collapses one level").
pub fn collapse_one(arena: &Arena, r: Cell) -> Result<Cell, VmError> {
    let target = read_through(arena, r)?;
    if target.is_ref() {
        read_through(arena, target)
    } else {
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Layout;

    fn arena() -> Arena {
        Arena::new(Layout::new(8, 8, 8), 16)
    }

    #[test]
    fn make_ref_and_abs_cell_roundtrip() {
        let r = make_ref(5).unwrap();
        assert!(r.is_ref());
        assert_eq!(abs_cell(r).unwrap(), 5);
    }

    #[test]
    fn read_through_matches_read_cell() {
        let mut a = arena();
        let v = Cell::from_f32(9.0);
        a.write_cell(3, v).unwrap();
        let r = make_ref(3).unwrap();
        assert_eq!(read_through(&a, r).unwrap(), a.read_cell(3).unwrap());
    }

    #[test]
    fn write_through_updates_target() {
        let mut a = arena();
        let r = make_ref(4).unwrap();
        write_through(&mut a, r, Cell::from_f32(42.0)).unwrap();
        assert_eq!(a.read_cell(4).unwrap(), Cell::from_f32(42.0));
    }

    #[test]
    fn region_classification_through_ref() {
        let a = arena();
        let r = make_ref(0).unwrap();
        assert_eq!(region_of(&a, r).unwrap(), Region::Global);
        let r2 = make_ref(8).unwrap();
        assert_eq!(region_of(&a, r2).unwrap(), Region::DataStack);
    }

    #[test]
    fn var_ref_within_return_stack() {
        let a = arena();
        let bp = a.layout().return_stack_base;
        let r = var_ref(&a, bp, 2).unwrap();
        assert_eq!(abs_cell(r).unwrap(), bp + 2);
    }

    #[test]
    fn var_ref_outside_return_stack_fails() {
        let a = arena();
        assert!(var_ref(&a, 0, 0).is_err());
    }

    #[test]
    fn collapse_one_level_of_ref_to_ref() {
        let mut a = arena();
        a.write_cell(0, Cell::from_f32(7.0)).unwrap();
        let inner = make_ref(0).unwrap();
        a.write_cell(1, inner).unwrap();
        let outer = make_ref(1).unwrap();
        let collapsed = collapse_one(&a, outer).unwrap();
        assert_eq!(collapsed, Cell::from_f32(7.0));
    }

    #[test]
    fn non_ref_cell_rejected() {
        let not_a_ref = Cell::from_f32(1.0);
        assert!(abs_cell(not_a_ref).is_err());
    }
}

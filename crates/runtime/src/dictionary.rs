//! Dictionary: linked chain of 3-slot entry LISTs on the global heap (spec.md
//! §3.5/§4.8). No teacher analog — acyclic back-reference discipline follows the
//! design note in spec.md §9.
//!
//! Entry payload, in logical (element-index) order matching the stack-native list
//! convention (element 0 nearest the header): `[prevRef, payloadTagged, nameTagged]`.
//! Physically, from lowest address to highest: `nameTagged`, `payloadTagged`,
//! `prevRef`, then the `LIST:3` header at the highest address.

use tacit_core::{abs_cell, make_ref, Cell, Decoded, Tag, VmError};

use crate::vm::Vm;

impl Vm {
    /// Intern `name`, push a 3-slot entry LIST onto the global heap, and update `head`
    /// to the new entry's header cell.
    pub fn define(&mut self, name: &str, payload: Cell) -> Result<(), VmError> {
        let top = self.arena.layout().global_base + self.arena.layout().global_cells;
        if self.gp + 4 > top {
            return Err(VmError::GlobalHeapExhausted);
        }
        let name_idx = self.digest.intern(name);
        let name_tagged = Cell::encode(Tag::String, name_idx as u16, false);
        let prev_ref = if self.head == 0 {
            Cell::nil()
        } else {
            make_ref(self.head)?
        };
        let header = Cell::encode(Tag::List, 3, false);

        self.arena.write_cell(self.gp, name_tagged)?;
        self.arena.write_cell(self.gp + 1, payload)?;
        self.arena.write_cell(self.gp + 2, prev_ref)?;
        self.arena.write_cell(self.gp + 3, header)?;

        self.head = self.gp + 3;
        self.gp += 4;
        Ok(())
    }

    /// Walk the chain from `head`, returning the payload of the first entry whose
    /// name matches and whose name isn't hidden. Returns `Cell::nil()` if nothing
    /// matches.
    pub fn lookup(&self, name: &str) -> Result<Cell, VmError> {
        let name_idx = match self.digest.strings_index(name) {
            Some(i) => i,
            None => return Ok(Cell::nil()),
        };
        let mut cur = self.head;
        while cur != 0 {
            let header = self.arena.read_cell(cur)?;
            if !header.is_list() {
                return Err(VmError::ListHeaderExpected);
            }
            let base = cur - 3;
            let name_tagged = self.arena.read_cell(base)?;
            let payload = self.arena.read_cell(base + 1)?;
            let prev_ref = self.arena.read_cell(base + 2)?;

            if let Decoded::Boxed {
                tag: Tag::String,
                value,
                meta: hidden,
            } = name_tagged.decode()
            {
                if value as u32 == name_idx && !hidden {
                    return Ok(payload);
                }
            }

            cur = if prev_ref.is_nil() {
                0
            } else {
                abs_cell(prev_ref)?
            };
        }
        Ok(Cell::nil())
    }

    /// Returns the current global-heap cursor, to be restored later by `forget`.
    pub fn mark(&self) -> usize {
        self.gp
    }

    /// Rewind `gp` to `mark_pos` and set `head` to whatever entry's header sits at
    /// `gp - 1` (or `0` if the heap is now empty). Fails if `mark_pos` isn't in
    /// `[0, gp]`.
    pub fn forget(&mut self, mark_pos: usize) -> Result<(), VmError> {
        let _span = tracing::trace_span!("forget", mark_pos).entered();
        if mark_pos > self.gp {
            return Err(VmError::ForgetMarkInvalid);
        }
        self.gp = mark_pos;
        self.head = if self.gp == self.arena.layout().global_base {
            0
        } else {
            self.gp - 1
        };
        Ok(())
    }

    /// Flip the hidden-meta bit on the head entry's name cell, making it invisible to
    /// `lookup` — used so a function's own name can't resolve while its body compiles.
    pub fn hide_head(&mut self) -> Result<(), VmError> {
        self.set_head_hidden(true)
    }

    pub fn unhide_head(&mut self) -> Result<(), VmError> {
        self.set_head_hidden(false)
    }

    fn set_head_hidden(&mut self, hidden: bool) -> Result<(), VmError> {
        if self.head == 0 {
            return Ok(());
        }
        let name_addr = self.head - 3;
        let name_tagged = self.arena.read_cell(name_addr)?;
        let value = match name_tagged.decode() {
            Decoded::Boxed {
                tag: Tag::String,
                value,
                ..
            } => value,
            _ => return Err(VmError::ListHeaderExpected),
        };
        self.arena
            .write_cell(name_addr, Cell::encode(Tag::String, value, hidden))
    }
}

/// A sentinel-free accessor that avoids interning a *new* digest entry on lookup
/// misses: `lookup` must only match already-interned names, never create one.
trait DigestLookup {
    fn strings_index(&self, name: &str) -> Option<u32>;
}

impl DigestLookup for tacit_core::Digest {
    fn strings_index(&self, name: &str) -> Option<u32> {
        // Digest only exposes intern (mutating) and get (by index); reconstruct a
        // read-only index lookup by scanning, since the table is expected to be small
        // relative to lookup frequency in this scope (no teacher-scale program sizes
        // are in view here).
        for i in 0..self.len() as u32 {
            if self.get(i).ok() == Some(name) {
                return Some(i);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{create_vm, VmConfig};

    #[test]
    fn define_then_lookup_finds_payload() {
        let mut vm = create_vm(VmConfig::default());
        let payload = Cell::encode(Tag::Code, 100, false);
        vm.define("foo", payload).unwrap();
        assert_eq!(vm.lookup("foo").unwrap(), payload);
    }

    #[test]
    fn lookup_unknown_name_returns_nil() {
        let vm = create_vm(VmConfig::default());
        assert!(vm.lookup("nope").unwrap().is_nil());
    }

    #[test]
    fn later_definition_shadows_earlier_same_name() {
        let mut vm = create_vm(VmConfig::default());
        vm.define("x", Cell::encode(Tag::Local, 0, false)).unwrap();
        vm.define("x", Cell::encode(Tag::Local, 1, false)).unwrap();
        assert_eq!(vm.lookup("x").unwrap(), Cell::encode(Tag::Local, 1, false));
    }

    #[test]
    fn mark_and_forget_restore_gp_and_head() {
        let mut vm = create_vm(VmConfig::default());
        vm.define("a", Cell::encode(Tag::Code, 1, false)).unwrap();
        let mark = vm.mark();
        let head_before = vm.head();
        vm.define("b", Cell::encode(Tag::Code, 2, false)).unwrap();
        vm.define("c", Cell::encode(Tag::Code, 3, false)).unwrap();
        vm.forget(mark).unwrap();
        assert_eq!(vm.gp(), mark);
        assert_eq!(vm.head(), head_before);
        assert!(vm.lookup("b").unwrap().is_nil());
        assert_eq!(vm.lookup("a").unwrap(), Cell::encode(Tag::Code, 1, false));
    }

    #[test]
    fn forget_to_empty_resets_head_to_zero() {
        let mut vm = create_vm(VmConfig::default());
        let mark = vm.mark();
        vm.define("a", Cell::encode(Tag::Code, 1, false)).unwrap();
        vm.forget(mark).unwrap();
        assert_eq!(vm.head(), 0);
    }

    #[test]
    fn forget_invalid_mark_fails() {
        let mut vm = create_vm(VmConfig::default());
        vm.define("a", Cell::encode(Tag::Code, 1, false)).unwrap();
        assert!(matches!(
            vm.forget(vm.gp() + 10),
            Err(VmError::ForgetMarkInvalid)
        ));
    }

    #[test]
    fn hide_head_makes_entry_invisible_to_lookup() {
        let mut vm = create_vm(VmConfig::default());
        vm.define("rec", Cell::encode(Tag::Code, 1, false)).unwrap();
        vm.hide_head().unwrap();
        assert!(vm.lookup("rec").unwrap().is_nil());
        vm.unhide_head().unwrap();
        assert_eq!(vm.lookup("rec").unwrap(), Cell::encode(Tag::Code, 1, false));
    }

    #[test]
    fn chain_is_acyclic_by_construction() {
        let mut vm = create_vm(VmConfig::default());
        for i in 0..5 {
            vm.define(&format!("n{i}"), Cell::from_f32(i as f32)).unwrap();
        }
        let mut cur = vm.head();
        let mut seen = std::collections::HashSet::new();
        let mut steps = 0;
        while cur != 0 {
            assert!(seen.insert(cur), "cycle detected");
            let base = cur - 3;
            let prev_ref = vm.arena().read_cell(base + 2).unwrap();
            cur = if prev_ref.is_nil() {
                0
            } else {
                abs_cell(prev_ref).unwrap()
            };
            steps += 1;
            assert!(steps <= 10);
        }
    }
}

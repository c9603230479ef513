//! Local-variable frame protocol: Reserve/InitVar/VarRef/Fetch/Store (spec.md
//! §3.6/§4.9). No teacher analog — the teacher compiles to native closures with
//! captured environments (`closures.rs`) instead of a `bp`/`rsp` frame, so only the
//! bounds-checked-accessor discipline of `stack.rs` carries over; the frame logic
//! itself is new.

use tacit_core::{abs_cell, var_ref, Cell, Sentinel, VmError};

use crate::list::list_length;
use crate::vm::Vm;

impl Vm {
    /// `Reserve N`: advance `rsp` by `n` cells, filling them with the `Uninit`
    /// sentinel so a debug-mode read of an un-initialized slot is distinguishable from
    /// a real value.
    pub fn reserve(&mut self, n: u16) -> Result<(), VmError> {
        let n = n as usize;
        let top = self.arena().layout().return_stack_base + self.arena().layout().return_stack_cells;
        if self.rsp + n > top {
            return Err(VmError::ReturnStackOverflow);
        }
        for i in 0..n {
            self.arena_mut()
                .write_cell(self.rsp + i, Cell::sentinel(Sentinel::Uninit))?;
        }
        self.rsp += n;
        Ok(())
    }

    /// `InitVar slot`: pop one cell from the data stack and write it into `bp + slot`.
    /// If the popped value is a LIST header, this is a compound initialization and
    /// follows the `transfer_to_rstack` path instead (spec.md §4.9): the whole list
    /// (payload + header) moves from the data stack into the frame, preserving the
    /// stack-native layout.
    pub fn init_var(&mut self, slot: u16) -> Result<(), VmError> {
        let top = self.peek(0)?;
        if top.is_list() {
            self.init_var_compound(slot)
        } else {
            let v = self.pop()?;
            self.arena_mut().write_cell(self.bp + slot as usize, v)
        }
    }

    /// The compound half of `InitVar`: pop the list (payload + header) off the data
    /// stack and copy its span directly into the frame at `bp + slot`, preserving cell
    /// order (so the header lands at the top of its span inside the frame too, exactly
    /// as it sat at TOS on the data stack).
    fn init_var_compound(&mut self, slot: u16) -> Result<(), VmError> {
        let header = self.peek(0)?;
        let n = list_length(header)?;
        self.ensure_depth(n + 1, "init_var_compound")?;
        let src_base = self.sp() - (n + 1);
        let dst_base = self.bp + slot as usize;
        self.arena_mut().copy_cells(src_base, dst_base, n + 1)?;
        self.sp -= n + 1;
        Ok(())
    }

    /// `VarRef slot`: push `make_ref(bp + slot)`.
    pub fn var_ref(&mut self, slot: u16) -> Result<(), VmError> {
        let r = var_ref(self.arena(), self.bp, slot)?;
        self.push(r)
    }

    /// `Fetch`: pop a REF and push a cell-copy of its target. If the target is a LIST
    /// header, the whole list is materialized onto the data stack (payload cells, then
    /// header) rather than just the header cell — per spec.md §4.9, callers who want
    /// only the header should not use `Fetch` on a compound local.
    pub fn fetch(&mut self) -> Result<(), VmError> {
        let r = self.pop()?;
        let target_addr = abs_cell(r)?;
        let target = self.arena().read_cell(target_addr)?;
        if target.is_list() {
            self.transfer_list_to_stack(target_addr, target)
        } else {
            self.push(target)
        }
    }

    fn transfer_list_to_stack(&mut self, header_addr: usize, header: Cell) -> Result<(), VmError> {
        let n = list_length(header)?;
        let base_addr = header_addr
            .checked_sub(n)
            .ok_or(VmError::ListPayloadShort)?;
        let top = self.arena().layout().data_stack_base + self.arena().layout().data_stack_cells;
        if self.sp() + n + 1 > top {
            return Err(VmError::StackOverflow);
        }
        let dst = self.sp();
        self.arena_mut().copy_cells(base_addr, dst, n + 1)?;
        self.sp += n + 1;
        Ok(())
    }

    /// `Store`: pop a REF and a value cell, and write the value into the target. Only
    /// valid for scalar targets; compound (LIST) targets must go through
    /// [`Vm::store_compound`] instead (spec.md §4.9: "the caller uses a dedicated
    /// update path").
    pub fn store(&mut self) -> Result<(), VmError> {
        let r = self.pop()?;
        let v = self.pop()?;
        let target_addr = abs_cell(r)?;
        self.arena_mut().write_cell(target_addr, v)
    }

    /// `StoreCompound slot`: pop a LIST (payload + header) off the data stack and copy
    /// it in place over the compound local at `bp + slot`, without moving `rsp`.
    /// Requires the existing value at that slot to be a LIST with the same slot count
    /// (spec.md §4.9's "same outer tag, same slot count"); otherwise
    /// `IncompatibleAssignment`.
    pub fn store_compound(&mut self, slot: u16) -> Result<(), VmError> {
        let header = self.peek(0)?;
        let new_n = list_length(header)?;
        self.ensure_depth(new_n + 1, "store_compound")?;
        let dst_base = self.bp + slot as usize;
        let dst_header_addr = dst_base + new_n;
        let existing_header = self.arena().read_cell(dst_header_addr)?;
        if !existing_header.is_list() || list_length(existing_header)? != new_n {
            return Err(VmError::IncompatibleAssignment);
        }
        let src_base = self.sp() - (new_n + 1);
        self.arena_mut().copy_cells(src_base, dst_base, new_n + 1)?;
        self.sp -= new_n + 1;
        Ok(())
    }
}

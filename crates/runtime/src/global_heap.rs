//! Global heap: bump allocation into the global region (spec.md §4.6).
//!
//! No deallocation lives here — space is reclaimed only through the dictionary's
//! `mark`/`forget` bracket (`dictionary.rs`), which rewinds `gp` directly.

use tacit_core::{make_ref, Cell, VmError};

use crate::vm::Vm;

/// What `gpush_list` needs to copy a stack-native LIST onto the global heap: the
/// header cell itself, the absolute cell index of the payload's base (its lowest
/// address), and how many payload cells to copy.
pub struct ListSource {
    pub header: Cell,
    pub base_cell: usize,
    pub n: usize,
}

impl Vm {
    /// Copy one cell to `gp` and advance it. Returns a REF to the written cell.
    pub fn gpush(&mut self, v: Cell) -> Result<Cell, VmError> {
        let top = self.arena.layout().global_base + self.arena.layout().global_cells;
        if self.gp >= top {
            return Err(VmError::GlobalHeapExhausted);
        }
        self.arena.write_cell(self.gp, v)?;
        let r = make_ref(self.gp)?;
        self.gp += 1;
        Ok(r)
    }

    /// Copy `n` payload cells (read from `source.base_cell..source.base_cell + n`,
    /// lowest address first) followed by the header, onto the global heap. Returns a
    /// REF to the header cell. Advances `gp` by `n + 1`.
    pub fn gpush_list(&mut self, source: &ListSource) -> Result<Cell, VmError> {
        let top = self.arena.layout().global_base + self.arena.layout().global_cells;
        if self.gp + source.n + 1 > top {
            return Err(VmError::GlobalHeapExhausted);
        }
        for i in 0..source.n {
            let v = self.arena.read_cell(source.base_cell + i)?;
            self.arena.write_cell(self.gp + i, v)?;
        }
        self.arena.write_cell(self.gp + source.n, source.header)?;
        let header_cell = self.gp + source.n;
        let r = make_ref(header_cell)?;
        self.gp += source.n + 1;
        Ok(r)
    }
}

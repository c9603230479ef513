//! VM state: registers, arena, digest, dictionary head, running flag (spec.md §2, §5).
//!
//! A `VM` is a plain value; nothing here is process-wide. `create_vm` and `reset_vm`
//! never touch module-level state, per spec.md §9's "Global mutable state" design
//! note — any "default VM" convenience belongs to a host or test harness, not to this
//! crate.

use tacit_core::{Arena, Digest, Layout};

/// Sizes the host picks when constructing a VM. Intentionally a plain struct with no
/// file-format behind it — spec.md §6.3 places persistent state entirely out of scope,
/// so there's nothing here for a `serde`/`toml` config layer to round-trip.
#[derive(Debug, Clone, Copy)]
pub struct VmConfig {
    pub global_cells: usize,
    pub data_stack_cells: usize,
    pub return_stack_cells: usize,
    pub code_bytes: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            global_cells: 4096,
            data_stack_cells: 1024,
            return_stack_cells: 1024,
            code_bytes: 64 * 1024,
        }
    }
}

/// The Tacit VM: one arena, one digest, one set of registers.
///
/// Registers are absolute cell indices (`sp`, `rsp`, `bp`, `gp`) or a byte offset into
/// the code segment (`ip`), exactly as spec.md §3.1/§3.6 describes them. `head` is the
/// dictionary's head-entry cell index, or `0` for an empty dictionary (spec.md §3.5).
pub struct Vm {
    pub(crate) arena: Arena,
    pub(crate) digest: Digest,
    /// Data stack cursor: absolute cell index one past the current TOS.
    pub(crate) sp: usize,
    /// Return stack cursor: absolute cell index one past the current top.
    pub(crate) rsp: usize,
    /// Current frame pointer: absolute cell index into the return stack region.
    pub(crate) bp: usize,
    /// Global heap cursor: absolute cell index one past the last allocated cell.
    pub(crate) gp: usize,
    /// Instruction pointer: byte offset into the code segment.
    pub ip: usize,
    /// Dictionary head: absolute cell index of the most recent entry's header, or `0`.
    pub(crate) head: usize,
    pub running: bool,
}

impl Vm {
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn digest_mut(&mut self) -> &mut Digest {
        &mut self.digest
    }

    pub fn sp(&self) -> usize {
        self.sp
    }

    pub fn rsp(&self) -> usize {
        self.rsp
    }

    pub fn bp(&self) -> usize {
        self.bp
    }

    pub fn gp(&self) -> usize {
        self.gp
    }

    pub fn head(&self) -> usize {
        self.head
    }

    /// Check the invariants spec.md §3.1 and §4.8 call out explicitly: each region
    /// cursor sits within its region's bounds, `bp <= rsp`, and `head` is either `0` or
    /// names a valid 3-slot LIST header. Called after every opcode in debug builds
    /// (spec.md §5: "Debug mode runs `ensure_invariants()` after each opcode"); release
    /// builds rely on the bounds checks already built into `push`/`rpush`/`gpush` at
    /// each stack-boundary operation instead of paying for this on every step.
    pub fn ensure_invariants(&self) -> Result<(), tacit_core::VmError> {
        use tacit_core::VmError;

        let l = self.arena.layout();
        if self.sp < l.data_stack_base || self.sp > l.data_stack_base + l.data_stack_cells {
            return Err(VmError::InvariantViolation {
                detail: format!("sp {} outside data stack region", self.sp),
            });
        }
        if self.rsp < l.return_stack_base || self.rsp > l.return_stack_base + l.return_stack_cells
        {
            return Err(VmError::InvariantViolation {
                detail: format!("rsp {} outside return stack region", self.rsp),
            });
        }
        if self.gp < l.global_base || self.gp > l.global_base + l.global_cells {
            return Err(VmError::InvariantViolation {
                detail: format!("gp {} outside global region", self.gp),
            });
        }
        if self.bp > self.rsp {
            return Err(VmError::InvariantViolation {
                detail: format!("bp {} exceeds rsp {}", self.bp, self.rsp),
            });
        }
        if self.bp < l.return_stack_base || self.bp > l.return_stack_base + l.return_stack_cells {
            return Err(VmError::InvariantViolation {
                detail: format!("bp {} outside return stack region", self.bp),
            });
        }
        if self.head != 0 {
            let header = self.arena.read_cell(self.head)?;
            if crate::list::list_length(header) != Ok(3) {
                return Err(VmError::InvariantViolation {
                    detail: format!("head {} is not a 3-slot LIST header", self.head),
                });
            }
        }
        Ok(())
    }
}

/// Construct a fresh VM with the given configuration. Per spec.md §5, multiple VMs may
/// be created and used independently; nothing here is shared across instances.
pub fn create_vm(config: VmConfig) -> Vm {
    let layout = Layout::new(
        config.global_cells,
        config.data_stack_cells,
        config.return_stack_cells,
    );
    let arena = Arena::new(layout, config.code_bytes);
    Vm {
        sp: arena.layout().data_stack_base,
        rsp: arena.layout().return_stack_base,
        bp: arena.layout().return_stack_base,
        gp: arena.layout().global_base,
        ip: 0,
        head: 0,
        running: false,
        arena,
        digest: Digest::new(),
    }
}

/// Reset `vm` to its just-constructed state, keeping the arena's allocated capacity but
/// rewinding every register and clearing the digest and dictionary. Used by test
/// harnesses that want a clean VM without reallocating the arena.
pub fn reset_vm(vm: &mut Vm) {
    let layout = *vm.arena.layout();
    vm.sp = layout.data_stack_base;
    vm.rsp = layout.return_stack_base;
    vm.bp = layout.return_stack_base;
    vm.gp = layout.global_base;
    vm.ip = 0;
    vm.head = 0;
    vm.running = false;
    vm.digest = Digest::new();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_vm_initializes_registers_to_region_bases() {
        let vm = create_vm(VmConfig::default());
        assert_eq!(vm.sp(), vm.arena().layout().data_stack_base);
        assert_eq!(vm.rsp(), vm.arena().layout().return_stack_base);
        assert_eq!(vm.bp(), vm.arena().layout().return_stack_base);
        assert_eq!(vm.gp(), vm.arena().layout().global_base);
        assert_eq!(vm.head(), 0);
        assert!(!vm.running);
    }

    #[test]
    fn independent_vms_do_not_share_state() {
        let mut a = create_vm(VmConfig::default());
        let b = create_vm(VmConfig::default());
        a.gp += 1;
        assert_ne!(a.gp(), b.gp());
    }

    #[test]
    fn reset_vm_restores_initial_registers() {
        let mut vm = create_vm(VmConfig::default());
        vm.sp += 10;
        vm.gp += 5;
        vm.head = 7;
        vm.running = true;
        reset_vm(&mut vm);
        assert_eq!(vm.sp(), vm.arena().layout().data_stack_base);
        assert_eq!(vm.gp(), vm.arena().layout().global_base);
        assert_eq!(vm.head(), 0);
        assert!(!vm.running);
    }

    #[test]
    fn ensure_invariants_passes_on_fresh_vm() {
        let vm = create_vm(VmConfig::default());
        vm.ensure_invariants().unwrap();
    }

    #[test]
    fn ensure_invariants_catches_bp_past_rsp() {
        let mut vm = create_vm(VmConfig::default());
        vm.bp = vm.rsp() + 1;
        assert!(matches!(
            vm.ensure_invariants(),
            Err(tacit_core::VmError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn ensure_invariants_checks_head_is_a_valid_entry() {
        let mut vm = create_vm(VmConfig::default());
        vm.define("x", tacit_core::Cell::from_f32(1.0)).unwrap();
        vm.ensure_invariants().unwrap();
        vm.head = vm.arena().layout().global_base; // points at a non-header cell
        assert!(matches!(
            vm.ensure_invariants(),
            Err(tacit_core::VmError::InvariantViolation { .. })
        ));
    }
}

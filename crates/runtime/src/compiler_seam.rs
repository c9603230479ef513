//! The parser-facing code-emission seam (spec.md §4.12). Exposed to the surface
//! compiler, never to the running program: nothing here touches `ip`, `sp`, or any
//! other execution register, only the code segment's own emission cursor `cp`.
//!
//! No teacher analog — the teacher's `crates/compiler` is a full LLVM-IR codegen
//! pipeline with no bytecode-emission seam of this shape; this is deliberately scoped
//! to the tiny API spec.md §4.12 actually names, not a reproduction of that pipeline.

use tacit_core::VmError;

use crate::opcodes::Opcode;
use crate::vm::Vm;

/// Per-function-body bookkeeping for `emit_reserve_if_needed`/`exit_function`: the
/// patch slot for the `Reserve` operand (recorded the first time a local is used) and
/// the running count of locals allocated so far.
struct FunctionCtx {
    reserve_patch: Option<usize>,
    local_count: u16,
}

/// A compile-time cursor into the same code segment the interpreter later executes,
/// independent of the VM's own `ip`. Borrows the `Vm` mutably for the duration of
/// compilation; a host constructs one, emits a whole program or function body, then
/// drops it before calling `execute`.
pub struct Compiler<'vm> {
    vm: &'vm mut Vm,
    cp: usize,
    function_stack: Vec<FunctionCtx>,
}

impl<'vm> Compiler<'vm> {
    pub fn new(vm: &'vm mut Vm) -> Compiler<'vm> {
        Compiler {
            vm,
            cp: 0,
            function_stack: Vec::new(),
        }
    }

    /// Resume emitting at an already-advanced cursor (e.g. after the host reserved the
    /// first bytes of the code segment for something else).
    pub fn at(vm: &'vm mut Vm, cp: usize) -> Compiler<'vm> {
        Compiler {
            vm,
            cp,
            function_stack: Vec::new(),
        }
    }

    /// Current code-pointer position, for recording patch addresses.
    pub fn here(&self) -> usize {
        self.cp
    }

    pub fn emit_opcode(&mut self, op: Opcode) -> Result<(), VmError> {
        self.vm.arena_mut().write_u8(self.cp, op as u8)?;
        self.cp += 1;
        Ok(())
    }

    /// Emit a raw builtin opcode byte (values below [`Opcode::FIRST_CONTROL`]).
    pub fn emit_builtin(&mut self, id: u8) -> Result<(), VmError> {
        self.vm.arena_mut().write_u8(self.cp, id)?;
        self.cp += 1;
        Ok(())
    }

    pub fn emit_u16(&mut self, v: u16) -> Result<(), VmError> {
        self.vm.arena_mut().write_u16(self.cp, v)?;
        self.cp += 2;
        Ok(())
    }

    pub fn emit_i16(&mut self, v: i16) -> Result<(), VmError> {
        self.emit_u16(v as u16)
    }

    pub fn emit_float32(&mut self, v: f32) -> Result<(), VmError> {
        self.vm.arena_mut().write_f32(self.cp, v)?;
        self.cp += 4;
        Ok(())
    }

    pub fn patch_u16(&mut self, at: usize, v: u16) -> Result<(), VmError> {
        self.vm.arena_mut().write_u16(at, v)
    }

    /// Patch a branch operand at `at` so it jumps to `target` (both absolute code
    /// offsets). The offset is relative to the byte immediately after the 2-byte
    /// operand, matching every branch-family opcode in spec.md §6.1. Fails rather than
    /// silently wrapping if `target` is further than `i16` can reach from `at` — a
    /// wrapped offset would patch in a jump to the wrong address instead of the
    /// intended one.
    pub fn patch_branch_to(&mut self, at: usize, target: usize) -> Result<(), VmError> {
        let offset = target as isize - (at as isize + 2);
        let offset: i16 = offset
            .try_into()
            .map_err(|_| VmError::OutOfBounds { addr: target })?;
        self.patch_u16(at, offset as u16)
    }

    /// Emit a branch-family opcode (`Branch`/`IfFalseBranch`/`Call`/`EndOf`) with a
    /// placeholder operand, returning the operand's address for later patching.
    pub fn emit_branch_placeholder(&mut self, op: Opcode) -> Result<usize, VmError> {
        self.emit_opcode(op)?;
        let at = self.here();
        self.emit_i16(0)?;
        Ok(at)
    }

    pub fn enter_function(&mut self) {
        self.function_stack.push(FunctionCtx {
            reserve_patch: None,
            local_count: 0,
        });
    }

    /// Emit `Reserve <placeholder>` the first time a function body needs a local slot;
    /// subsequent calls within the same body are no-ops. The placeholder is patched
    /// with the final local count by `exit_function`.
    pub fn emit_reserve_if_needed(&mut self) -> Result<(), VmError> {
        let needs = matches!(
            self.function_stack.last(),
            Some(ctx) if ctx.reserve_patch.is_none()
        );
        if needs {
            self.emit_opcode(Opcode::Reserve)?;
            let at = self.here();
            self.emit_u16(0)?;
            self.function_stack.last_mut().unwrap().reserve_patch = Some(at);
        }
        Ok(())
    }

    /// Allocate the next local slot number in the current function body.
    pub fn alloc_local_slot(&mut self) -> u16 {
        let ctx = self
            .function_stack
            .last_mut()
            .expect("alloc_local_slot called outside a function body");
        let slot = ctx.local_count;
        ctx.local_count += 1;
        slot
    }

    pub fn exit_function(&mut self) -> Result<(), VmError> {
        let ctx = self
            .function_stack
            .pop()
            .expect("exit_function without a matching enter_function");
        if let Some(at) = ctx.reserve_patch {
            self.patch_u16(at, ctx.local_count)?;
        }
        Ok(())
    }
}

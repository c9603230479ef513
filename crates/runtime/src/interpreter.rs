//! The fetch-decode-execute loop (spec.md §4.11) and the minimal builtin verb set
//! (spec.md §6.1/§8). No teacher analog for the loop itself (the teacher never
//! interprets bytecode — it compiles straight to native code via `inkwell`); the
//! `tracing::trace_span!` instrumentation around `execute`/call-frame transitions
//! follows the teacher's convention in `scheduler.rs` of wrapping its own dispatch
//! loop in a span.

use tacit_core::{Cell, Decoded, Tag, VmError};

use crate::opcodes::{decode_code, Builtin, CodeRef, Opcode};
use crate::vm::Vm;

/// Run the program starting at `start_addr` until an `Exit` at the outermost frame
/// clears `running`. Each opcode is dispatched in `step`; any error aborts the loop and
/// is handed back to the caller with `vm.ip` left at the failing instruction.
pub fn execute(vm: &mut Vm, start_addr: usize) -> Result<(), VmError> {
    vm.ip = start_addr;
    vm.running = true;
    let _span = tracing::trace_span!("execute", start_addr).entered();
    while vm.running {
        step(vm)?;
        if cfg!(debug_assertions) {
            vm.ensure_invariants()?;
        }
    }
    Ok(())
}

fn step(vm: &mut Vm) -> Result<(), VmError> {
    let op_byte = vm.arena().read_u8(vm.ip)?;
    vm.ip += 1;

    if op_byte < Opcode::FIRST_CONTROL {
        return dispatch_builtin(vm, Builtin::from_byte(op_byte)?);
    }

    match Opcode::from_byte(op_byte)? {
        Opcode::Nop => Ok(()),
        Opcode::LiteralNumber => {
            let v = vm.arena().read_f32(vm.ip)?;
            vm.ip += 4;
            vm.push(Cell::from_f32(v))
        }
        Opcode::Branch => {
            let offset = vm.arena().read_i16(vm.ip)?;
            vm.ip += 2;
            branch(vm, offset)
        }
        Opcode::IfFalseBranch => {
            let offset = vm.arena().read_i16(vm.ip)?;
            vm.ip += 2;
            let c = vm.pop()?;
            if c.is_falsy() {
                branch(vm, offset)
            } else {
                Ok(())
            }
        }
        Opcode::Call => {
            let offset = vm.arena().read_i16(vm.ip)?;
            vm.ip += 2;
            let call_target = (vm.ip as isize + offset as isize) as usize;
            let return_ip = vm.ip;
            let _span = tracing::trace_span!("call", call_target).entered();
            call_frame(vm, return_ip)?;
            vm.ip = call_target;
            Ok(())
        }
        Opcode::Eval => eval(vm),
        Opcode::Exit => {
            let _span = tracing::trace_span!("exit_frame").entered();
            exit_frame(vm)
        }
        Opcode::Reserve => {
            let n = vm.arena().read_u16(vm.ip)?;
            vm.ip += 2;
            vm.reserve(n)
        }
        Opcode::InitVar => {
            let slot = vm.arena().read_u16(vm.ip)?;
            vm.ip += 2;
            vm.init_var(slot)
        }
        Opcode::VarRef => {
            let slot = vm.arena().read_u16(vm.ip)?;
            vm.ip += 2;
            vm.var_ref(slot)
        }
        Opcode::Fetch => vm.fetch(),
        Opcode::Store => vm.store(),
        Opcode::Drop => vm.pop().map(|_| ()),
        Opcode::EndOf => {
            let offset = vm.arena().read_i16(vm.ip)?;
            vm.ip += 2;
            branch(vm, offset)
        }
        Opcode::EndCase => vm.pop().map(|_| ()),
        Opcode::StoreCompound => {
            let slot = vm.arena().read_u16(vm.ip)?;
            vm.ip += 2;
            vm.store_compound(slot)
        }
    }
}

/// Jump relative to the instruction pointer as it stands immediately after the 16-bit
/// operand, per every branch-family opcode's wire format (spec.md §6.1).
fn branch(vm: &mut Vm, offset: i16) -> Result<(), VmError> {
    vm.ip = (vm.ip as isize + offset as isize) as usize;
    Ok(())
}

/// `Eval`: pop one cell. A `CODE` cell naming a builtin dispatches directly with no
/// frame; one naming user code performs a call-equivalent (push a frame, jump).
/// Anything else is inert and is simply pushed back (spec.md §4.11).
fn eval(vm: &mut Vm) -> Result<(), VmError> {
    let v = vm.pop()?;
    if !v.is_tag(Tag::Code) {
        return vm.push(v);
    }
    match decode_code(v)? {
        CodeRef::Builtin(id) => dispatch_builtin(vm, Builtin::from_id(id)?),
        CodeRef::User(addr) => {
            let return_ip = vm.ip;
            call_frame(vm, return_ip)?;
            vm.ip = addr;
            Ok(())
        }
    }
}

/// Push a call frame: return address, then saved `bp` (stored relative to the
/// return-stack base, per spec.md §4.9), and set `bp := rsp`. Overflow on either push
/// surfaces as `ReturnStackOverflow`.
fn call_frame(vm: &mut Vm, return_ip: usize) -> Result<(), VmError> {
    let base = vm.arena().layout().return_stack_base;
    vm.rpush(Cell::from_f32(return_ip as f32))?;
    let bp_rel = (vm.bp() - base) as f32;
    vm.rpush(Cell::from_f32(bp_rel))?;
    vm.bp = vm.rsp();
    Ok(())
}

/// `Exit`: collapse locals (`rsp := bp`); if that lands exactly at the return-stack
/// base there's no caller frame to restore, so the program terminates. Otherwise pop
/// the saved `bp`/return address and resume there (spec.md §4.9/§4.11).
fn exit_frame(vm: &mut Vm) -> Result<(), VmError> {
    let base = vm.arena().layout().return_stack_base;
    vm.rsp = vm.bp();
    if vm.rsp == base {
        vm.running = false;
        return Ok(());
    }
    let saved_bp_rel = vm.rpop()?;
    let return_ip = vm.rpop()?;
    vm.bp = base + cell_as_usize(saved_bp_rel)?;
    vm.ip = cell_as_usize(return_ip)?;
    Ok(())
}

fn cell_as_usize(c: Cell) -> Result<usize, VmError> {
    match c.decode() {
        Decoded::Number(n) => Ok(n as usize),
        _ => Err(VmError::InvalidTag { bits: c.to_bits() }),
    }
}

fn as_f32(c: Cell) -> Result<f32, VmError> {
    match c.decode() {
        Decoded::Number(n) => Ok(n),
        _ => Err(VmError::InvalidTag { bits: c.to_bits() }),
    }
}

fn as_u16(c: Cell) -> Result<u16, VmError> {
    Ok(as_f32(c)? as u16)
}

fn binop(vm: &mut Vm, f: impl Fn(f32, f32) -> f32) -> Result<(), VmError> {
    let b = vm.pop()?;
    let a = vm.pop()?;
    vm.push(Cell::from_f32(f(as_f32(a)?, as_f32(b)?)))
}

/// Dispatch one of the builtin verbs this core ships (spec.md §8's worked scenarios);
/// the full arithmetic/comparison/I-O surface is out of scope (spec.md §1).
fn dispatch_builtin(vm: &mut Vm, b: Builtin) -> Result<(), VmError> {
    match b {
        Builtin::Add => binop(vm, |a, b| a + b),
        Builtin::Sub => binop(vm, |a, b| a - b),
        Builtin::Mul => binop(vm, |a, b| a * b),
        Builtin::Div => binop(vm, |a, b| a / b),
        Builtin::Eq => {
            let b = vm.pop()?;
            let a = vm.pop()?;
            vm.push(if a == b { Cell::from_f32(1.0) } else { Cell::nil() })
        }
        Builtin::Dup => {
            let v = vm.peek(0)?;
            vm.push(v)
        }
        Builtin::Swap => {
            let a = vm.pop()?;
            let b = vm.pop()?;
            vm.push(a)?;
            vm.push(b)
        }
        Builtin::BufferNew => {
            let cap = as_u16(vm.pop()?)?;
            vm.buffer(cap)
        }
        Builtin::BufferWrite => {
            let buf = vm.pop()?;
            let v = vm.pop()?;
            vm.ring_write(buf, v)
        }
        Builtin::BufferRead => {
            let buf = vm.pop()?;
            let v = vm.ring_read(buf)?;
            vm.push(v)
        }
        Builtin::BufferUnread => {
            let buf = vm.pop()?;
            let v = vm.pop()?;
            vm.ring_unread(buf, v)
        }
        Builtin::BufferUnwrite => {
            let buf = vm.pop()?;
            let v = vm.ring_unwrite(buf)?;
            vm.push(v)
        }
    }
}

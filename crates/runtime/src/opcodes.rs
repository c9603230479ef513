//! The bytecode wire format (spec.md §6.1): opcode byte assignment, operand shapes,
//! and the `Tag::Code` value-range split between builtins and user code (spec.md
//! §3.2/§9's second open question, resolved here in favor of "one tag, range split").
//!
//! No teacher analog (the teacher compiles to LLVM IR, never to a byte-addressed
//! instruction stream) — byte assignment and the builtin/user split are new, grounded
//! only in spec.md's own wire-format table.

use tacit_core::{Cell, Decoded, Tag, VmError, MAX_VALUE16};

/// Every `Tag::Code` value below this threshold names a builtin (by id); every value
/// at or above it names a user-code byte address, offset by the threshold so the two
/// spaces never collide within the 16-bit payload (spec.md §3.2: "built-ins share this
/// tag with value < a reserved threshold, user code above it").
pub const BUILTIN_CODE_THRESHOLD: u16 = 1024;

/// A decoded `Tag::Code` value: either a builtin id or a user-code byte address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeRef {
    Builtin(u16),
    User(usize),
}

/// Build a `CODE` cell naming a builtin.
pub fn encode_builtin(id: Builtin) -> Cell {
    Cell::encode(Tag::Code, id as u16, false)
}

/// Build a `CODE` cell naming a user-code address. Fails if the address doesn't fit
/// below `0xFFFF` once offset by [`BUILTIN_CODE_THRESHOLD`].
pub fn encode_user_code(addr: usize) -> Result<Cell, VmError> {
    let v = BUILTIN_CODE_THRESHOLD as usize + addr;
    if v > MAX_VALUE16 as usize {
        return Err(VmError::OutOfBounds { addr });
    }
    Ok(Cell::encode(Tag::Code, v as u16, false))
}

/// Split a `CODE` cell's value into builtin-or-user-address.
pub fn decode_code(cell: Cell) -> Result<CodeRef, VmError> {
    match cell.decode() {
        Decoded::Boxed {
            tag: Tag::Code,
            value,
            ..
        } => {
            if value < BUILTIN_CODE_THRESHOLD {
                Ok(CodeRef::Builtin(value))
            } else {
                Ok(CodeRef::User((value - BUILTIN_CODE_THRESHOLD) as usize))
            }
        }
        _ => Err(VmError::InvalidTag { bits: cell.to_bits() }),
    }
}

/// One-byte opcodes read by the interpreter's fetch-decode loop. Byte values below
/// [`Opcode::FIRST_CONTROL`] are reserved for builtin verbs (spec.md §6.1: "Opcode byte
/// 0..MAX_BUILTIN is reserved for builtins; higher values are user opcodes or
/// control-flow markers"); [`Builtin`] enumerates the ones this core ships with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Nop = 32,
    LiteralNumber = 33,
    Branch = 34,
    IfFalseBranch = 35,
    Call = 36,
    Eval = 37,
    Exit = 38,
    Reserve = 39,
    InitVar = 40,
    VarRef = 41,
    Fetch = 42,
    Store = 43,
    Drop = 44,
    EndOf = 45,
    EndCase = 46,
    StoreCompound = 47,
}

impl Opcode {
    /// Byte values `0..FIRST_CONTROL` are builtins; this value and above are the
    /// control-flow/frame opcodes enumerated here.
    pub const FIRST_CONTROL: u8 = 32;

    pub fn from_byte(b: u8) -> Result<Opcode, VmError> {
        match b {
            32 => Ok(Opcode::Nop),
            33 => Ok(Opcode::LiteralNumber),
            34 => Ok(Opcode::Branch),
            35 => Ok(Opcode::IfFalseBranch),
            36 => Ok(Opcode::Call),
            37 => Ok(Opcode::Eval),
            38 => Ok(Opcode::Exit),
            39 => Ok(Opcode::Reserve),
            40 => Ok(Opcode::InitVar),
            41 => Ok(Opcode::VarRef),
            42 => Ok(Opcode::Fetch),
            43 => Ok(Opcode::Store),
            44 => Ok(Opcode::Drop),
            45 => Ok(Opcode::EndOf),
            46 => Ok(Opcode::EndCase),
            47 => Ok(Opcode::StoreCompound),
            _ => Err(VmError::InvalidOpcode { value: b }),
        }
    }
}

/// The builtin verb set this core ships with: enough to exercise arithmetic,
/// comparisons for `case`/`of`, stack hygiene, and the ring buffer from bytecode, per
/// spec.md §8's worked scenarios. The full arithmetic/comparison/I/O surface is
/// explicitly out of scope (spec.md §1) — this is deliberately the minimal set spec.md
/// §8's own testable scenarios require, not a reproduction of the teacher's
/// `arithmetic.rs`/`cond.rs`/`float_ops.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Builtin {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    Eq = 4,
    Dup = 5,
    Swap = 6,
    BufferNew = 7,
    BufferWrite = 8,
    BufferRead = 9,
    BufferUnread = 10,
    BufferUnwrite = 11,
}

impl Builtin {
    pub fn from_byte(b: u8) -> Result<Builtin, VmError> {
        match b {
            0 => Ok(Builtin::Add),
            1 => Ok(Builtin::Sub),
            2 => Ok(Builtin::Mul),
            3 => Ok(Builtin::Div),
            4 => Ok(Builtin::Eq),
            5 => Ok(Builtin::Dup),
            6 => Ok(Builtin::Swap),
            7 => Ok(Builtin::BufferNew),
            8 => Ok(Builtin::BufferWrite),
            9 => Ok(Builtin::BufferRead),
            10 => Ok(Builtin::BufferUnread),
            11 => Ok(Builtin::BufferUnwrite),
            _ => Err(VmError::InvalidOpcode { value: b }),
        }
    }

    pub fn from_id(id: u16) -> Result<Builtin, VmError> {
        if id > u8::MAX as u16 {
            return Err(VmError::InvalidOpcode { value: 0xFF });
        }
        Builtin::from_byte(id as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_code_roundtrip() {
        let c = encode_builtin(Builtin::Add);
        assert_eq!(decode_code(c).unwrap(), CodeRef::Builtin(Builtin::Add as u16));
    }

    #[test]
    fn user_code_roundtrip() {
        let c = encode_user_code(1234).unwrap();
        assert_eq!(decode_code(c).unwrap(), CodeRef::User(1234));
    }

    #[test]
    fn user_code_threshold_boundary() {
        let c = encode_user_code(0).unwrap();
        assert_eq!(decode_code(c).unwrap(), CodeRef::User(0));
    }

    #[test]
    fn opcode_byte_roundtrip() {
        for b in Opcode::FIRST_CONTROL..=47 {
            let op = Opcode::from_byte(b).unwrap();
            assert_eq!(op as u8, b);
        }
    }

    #[test]
    fn invalid_opcode_byte_fails() {
        assert!(matches!(
            Opcode::from_byte(200),
            Err(VmError::InvalidOpcode { value: 200 })
        ));
    }

    #[test]
    fn invalid_builtin_byte_fails() {
        assert!(Builtin::from_byte(255).is_err());
    }
}

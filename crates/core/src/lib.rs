//! Tagged-value representation, memory arena, reference model, and string digest for
//! the Tacit VM.
//!
//! This crate owns the data model only — it knows nothing about opcodes, call frames,
//! or dictionaries. See `tacit-runtime` for the interpreter that sits on top of it.
//!
//! # Modules
//!
//! - `error`: the closed error taxonomy shared by both crates.
//! - `cell`: NaN-boxed 32-bit tagged value codec.
//! - `arena`: the unified memory arena (global / data-stack / return-stack regions
//!   plus a separately addressed code segment).
//! - `reference`: the single absolute-cell-index `REF` model.
//! - `digest`: append-only string intern table.

pub mod arena;
pub mod cell;
pub mod digest;
pub mod error;
pub mod reference;

pub use arena::{Arena, Layout, Region, CELL_BYTES};
pub use cell::{Cell, Decoded, Sentinel, Tag, CANONICAL_NAN, MAX_VALUE16};
pub use digest::Digest;
pub use error::{StackSnapshot, VmError};
pub use reference::{abs_byte, abs_cell, collapse_one, make_ref, read_through, region_of, var_ref, write_through, Ref};

//! Translation of a `(memory, offset, length)` triple into a raw host
//! pointer, for *host-originated* explicit accesses (imports, embedder
//! APIs) that must raise a clean trap rather than crash the process.
//!
//! Compiled wasm code never goes through this path: it computes
//! `base + index + static_offset` directly and relies on the guard region
//! plus a signal handler (an external collaborator) to turn an
//! out-of-reservation access into a trap. This module exists for the
//! accessors that *can't* rely on a signal handler being installed, such as
//! a host function copying bytes into or out of a memory.

use crate::memory::MemoryInstance;
use std::fmt;

/// A synchronous, catchable failure distinct from a host crash.
///
/// This is the in-process analogue of "raising a trap to the host": rather
/// than modeling it with unwinding or an actual signal, the idiomatic Rust
/// shape is a typed `Err` that propagates through the normal `Result`
/// machinery. A host embedding this crate across an FFI boundary is
/// expected to translate a returned `Trap` into whatever its own exception
/// mechanism is (out of scope for this core).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trap {
    /// What kind of trap this is.
    pub code: TrapCode,
}

/// The reason a [`Trap`] was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCode {
    /// A `(offset, length)` range fell outside a memory's reservation.
    HeapOutOfBounds,
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            TrapCode::HeapOutOfBounds => write!(f, "wasm trap: out of bounds memory access"),
        }
    }
}

impl std::error::Error for Trap {}

/// Validate a host-originated access of `length` bytes at `offset` into
/// `memory`, returning a raw pointer to the start of the range on success.
///
/// Validation is against the **reservation** (`memory.end_offset()`), not
/// `memory.num_pages() * 65536`: this is what lets compiled code elide
/// explicit bounds checks and rely on guard-page traps instead, so this
/// helper must agree with that contract rather than being stricter. A range
/// that lands past the committed pages but still inside the reservation is
/// accepted here and will fault later via the host's memory protection when
/// actually dereferenced.
///
/// `offset` is saturated to `end_offset` before use, so pointer arithmetic
/// never walks past the reservation even when computing the (rejected)
/// start address.
pub fn validated_range(
    memory: &MemoryInstance,
    offset: u64,
    length: u64,
) -> Result<*mut u8, Trap> {
    let end_offset = memory.end_offset();
    let start_offset = offset.min(end_offset);

    let end = match start_offset.checked_add(length) {
        Some(end) => end,
        None => {
            return Err(Trap {
                code: TrapCode::HeapOutOfBounds,
            })
        }
    };
    if end > end_offset {
        return Err(Trap {
            code: TrapCode::HeapOutOfBounds,
        });
    }

    // SAFETY: `start_offset` is `<= end_offset <= memory.end_offset()`, so
    // the resulting pointer lands within `memory`'s reservation.
    Ok(unsafe { memory.base_ptr().add(start_offset as usize) })
}

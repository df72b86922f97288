//! Virtual-memory-backed linear memory management for a WebAssembly
//! runtime.
//!
//! This crate owns the virtual-address reservations backing each module's
//! linear memory, grows and shrinks their committed footprint in
//! WebAssembly-page units, validates host-initiated memory accesses, and
//! tracks global ownership so that a fault on an arbitrary host address can
//! be attributed to (or exonerated from) runtime-managed memory.
//!
//! # The layout contract
//!
//! Each [`MemoryInstance`] reserves a large, contiguous address range with a
//! trailing guard region; only a small prefix is committed; [`grow`] and
//! [`shrink`] mutate that prefix in place and never move the base address.
//! Compiled code is free to compute `base + index + static_offset` for any
//! 32-bit `index` and `static_offset` and either land inside committed
//! memory, or land in the reservation/guard region and fault — it never
//! needs to bounds-check against `num_pages` itself. That's the whole point
//! of the reservation being multi-gigabyte: every address reachable from a
//! 32-bit index plus a 32-bit offset has to land somewhere inside it.
//!
//! # What this crate does not do
//!
//! There is no allocator or heap layered on top of linear memory, no
//! compaction (WebAssembly memories never move), no sparse/discontiguous
//! memories, and no shared-memory atomics protocol. The instruction
//! decoder, compiler, module instantiation pipeline, exception mechanism,
//! and the actual host platform primitives are collaborators: this crate
//! calls into a small platform shim ([`platform`]) and expects a signal
//! handler (or equivalent) to be installed by something else, consulting
//! [`registry::is_address_owned_by_memory`] to decide whether a fault
//! belongs to this crate's memories.
//!
//! [`grow`]: MemoryInstance::grow
//! [`shrink`]: MemoryInstance::shrink

mod compartment;
mod config;
mod error;
mod memory;
mod memory_type;
mod page;
mod platform;
mod registry;
mod validate;

pub use compartment::Compartment;
pub use config::MemoryConfig;
pub use error::{MemoryError, Result};
pub use memory::{MemoryInstance, VMMemoryDefinition};
pub use memory_type::MemoryType;
pub use registry::is_address_owned_by_memory;
pub use validate::{validated_range, Trap, TrapCode};

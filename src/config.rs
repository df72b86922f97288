//! Embedder-tunable knobs for the linear memory manager.
//!
//! There is no file format and no hot reload: an embedder builds one of
//! these in code, once, and passes it to every `create_memory` call, the
//! same way the rest of this lineage threads a `Config` through instead of
//! reading environment at the point of use.

/// The size of one WebAssembly page, in bytes (2^16).
pub const WASM_PAGE_SIZE: u64 = 0x10000;

/// Default reservation size on 64-bit hosts: 8 GiB (2^33 bytes), enough for
/// every byte address reachable by a 32-bit index plus a 32-bit static
/// offset without overflowing.
pub const DEFAULT_RESERVATION_64BIT: u64 = 8 * 1024 * 1024 * 1024;

/// Default reservation size on 32-bit hosts, where an 8 GiB reservation is
/// not representable. Compiled code on such hosts must mask the 32-bit
/// index instead of relying on the guard region alone (see `MemoryConfig::allow_32bit_hosts`).
pub const DEFAULT_RESERVATION_32BIT: u64 = 4 * 1024 * 1024 * 1024;

/// Configuration controlling how [`crate::memory::MemoryInstance`]
/// reservations are sized.
///
/// Constructed once by the embedder; every field is immutable after
/// construction. `MemoryConfig::default()` reproduces the reservation
/// policy implied by the core design with no explicit tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Reservation size, in bytes, used when `std::mem::size_of::<usize>() == 8`.
    pub reservation_bytes_64bit: u64,
    /// Reservation size, in bytes, used when `std::mem::size_of::<usize>() == 4`.
    pub reservation_bytes_32bit: u64,
    /// Number of trailing host pages reserved as an always-decommitted guard
    /// region, to catch misaligned accesses that probe one page past
    /// `end_offset`.
    pub guard_pages: u32,
    /// Whether `create_memory` may proceed on a 32-bit host using the
    /// reduced reservation (losing the bounds-check-elision guarantee for
    /// compiled code, which must mask its 32-bit index instead), or must
    /// refuse outright.
    pub allow_32bit_hosts: bool,
}

impl MemoryConfig {
    /// Returns the reservation size, in bytes, appropriate for the current
    /// host pointer width.
    pub fn reservation_bytes(&self) -> u64 {
        if cfg!(target_pointer_width = "64") {
            self.reservation_bytes_64bit
        } else {
            self.reservation_bytes_32bit
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            reservation_bytes_64bit: DEFAULT_RESERVATION_64BIT,
            reservation_bytes_32bit: DEFAULT_RESERVATION_32BIT,
            guard_pages: 1,
            allow_32bit_hosts: true,
        }
    }
}

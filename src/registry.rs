//! Process-wide registry of live linear memories, used to answer "does this
//! host address belong to any linear memory?" for signal-handler fault
//! attribution.
//!
//! A flat `Vec` under a single mutex is all this needs: the fault path that
//! calls [`is_address_owned_by_memory`] is already on the slow path of a
//! hardware trap, so an `O(n)` scan over the (typically small) set of live
//! memories is not a correctness concern. An interval tree would be a valid
//! optimization but is not required by anything in this module.

use once_cell::sync::Lazy;
use std::sync::Mutex;

/// One live memory's reservation range, as registered by
/// [`crate::memory::MemoryInstance::create`] and removed by its `Drop` impl.
#[derive(Debug, Clone, Copy)]
struct Registration {
    base: usize,
    end_offset: usize,
}

impl Registration {
    fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.base + self.end_offset
    }

    fn overlaps(&self, other: &Registration) -> bool {
        self.base < other.base + other.end_offset && other.base < self.base + self.end_offset
    }
}

static REGISTRY: Lazy<Mutex<Vec<Registration>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Registers `[base, base + end_offset)` as belonging to a live memory.
///
/// # Panics
///
/// Panics (via `debug_assert`) if the new range overlaps an already-live
/// range: no two live memories' reservations may overlap, and a violation
/// here means a caller reused a `base_address` the registry still
/// considers live.
pub(crate) fn register(base: *mut u8, end_offset: usize) {
    let new = Registration {
        base: base as usize,
        end_offset,
    };
    let mut registry = REGISTRY.lock().unwrap();
    debug_assert!(
        registry.iter().all(|existing| !existing.overlaps(&new)),
        "registering a memory reservation that overlaps a live one"
    );
    registry.push(new);
}

/// Removes the registration for the reservation based at `base`. No-op if
/// `base` was never registered (tolerates rollback paths that free a
/// reservation before it was ever registered).
pub(crate) fn deregister(base: *mut u8) {
    let base = base as usize;
    let mut registry = REGISTRY.lock().unwrap();
    if let Some(index) = registry.iter().position(|r| r.base == base) {
        registry.swap_remove(index);
    }
}

/// Returns `true` iff `addr` falls inside the reservation of some
/// currently-live linear memory (guard pages excluded, per the core's
/// attribution policy).
///
/// This is the operation a signal handler calls to decide whether a host
/// fault should be translated into a WebAssembly access-violation trap or
/// rethrown as a host crash. Installing and invoking an actual signal
/// handler is an external collaborator's responsibility; this function only
/// answers the membership question.
pub fn is_address_owned_by_memory(addr: *const u8) -> bool {
    let addr = addr as usize;
    let registry = REGISTRY.lock().unwrap();
    registry.iter().any(|r| r.contains(addr))
}

#[cfg(test)]
pub(crate) fn registered_count_for_test() -> usize {
    REGISTRY.lock().unwrap().len()
}

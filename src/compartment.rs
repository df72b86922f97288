//! Per-compartment indexed slot table binding dense ids to memories, and the
//! parallel `memory_bases` side array generated code reads without locking.
//!
//! A `Compartment` is a fixed-capacity isolation domain: it owns a set of
//! memories and publishes their base addresses so that compiled code baked
//! with a particular id can resolve it to a live `MemoryInstance` without
//! taking a lock on every access.

use crate::error::{MemoryError, Result};
use crate::memory::MemoryInstance;
use log::debug;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Mutex;

struct Slots {
    entries: Vec<Option<Box<MemoryInstance>>>,
}

/// An isolation domain owning a fixed-capacity table of linear memories.
///
/// The id slot table and the `memory_bases` array are guarded separately:
/// the slot table (and the *writes* to `memory_bases`) sit behind a mutex,
/// held only for id assignment/insertion/removal, while *reads* of
/// `memory_bases` are lock-free atomic loads — this is what lets a compiled
/// memory access read its base pointer without ever taking the
/// compartment's mutex.
pub struct Compartment {
    mutex: Mutex<Slots>,
    /// Raw base-address array, published without locking. `null` means "no
    /// memory bound at this id" (either never assigned, or torn down).
    memory_bases: Vec<AtomicPtr<u8>>,
}

impl Compartment {
    /// Create a compartment with room for up to `max_memories` linear
    /// memories. This is the `max_id` bound `slots.add` is specified
    /// against.
    pub fn new(max_memories: u32) -> Self {
        Compartment {
            mutex: Mutex::new(Slots {
                entries: (0..max_memories).map(|_| None).collect(),
            }),
            memory_bases: (0..max_memories)
                .map(|_| AtomicPtr::new(ptr::null_mut()))
                .collect(),
        }
    }

    /// Bind `memory` at the lowest free id, publish its base address, and
    /// return the assigned id.
    pub fn add(&self, mut memory: MemoryInstance) -> Result<u32> {
        let mut slots = self.mutex.lock().unwrap();
        let id = slots
            .entries
            .iter()
            .position(Option::is_none)
            .ok_or(MemoryError::IdExhausted)? as u32;

        memory.set_id(id);
        let base = memory.base_ptr();
        slots.entries[id as usize] = Some(Box::new(memory));
        // Publish the base *after* the slot holds the memory and *before*
        // any caller can observe `id` as bound, so a lock-free reader of
        // `memory_bases` never sees a base for an id it hasn't been told is
        // live yet.
        self.memory_bases[id as usize].store(base, Ordering::Release);
        debug!("compartment: bound memory id={id} base={base:p}");
        Ok(id)
    }

    /// Bind `memory` at exactly `id`, failing if `id` is out of range. Used
    /// by `clone_memory` to preserve the id a cloned compartment's compiled
    /// code was baked with.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already occupied: a caller asking to rebind a live
    /// id without first removing it is a bug in the collaborator driving the
    /// clone, not a recoverable runtime condition.
    pub fn insert_at(&self, id: u32, mut memory: MemoryInstance) -> Result<()> {
        let mut slots = self.mutex.lock().unwrap();
        let idx = id as usize;
        let slot = slots
            .entries
            .get_mut(idx)
            .ok_or(MemoryError::IdExhausted)?;
        assert!(slot.is_none(), "memory slot id {id} is already occupied");

        memory.set_id(id);
        let base = memory.base_ptr();
        *slot = Some(Box::new(memory));
        self.memory_bases[idx].store(base, Ordering::Release);
        debug!("compartment: bound memory id={id} base={base:p} (insert_at)");
        Ok(())
    }

    /// Remove and return the memory bound at `id`, nulling its
    /// `memory_bases` entry first. `None` if nothing was bound there.
    ///
    /// Dropping the returned `MemoryInstance` tears it down (decommits its
    /// pages, releases its reservation, and deregisters it globally); the
    /// caller is expected to have already quiesced any compiled code that
    /// might still read this id before calling this.
    pub fn remove(&self, id: u32) -> Option<Box<MemoryInstance>> {
        let mut slots = self.mutex.lock().unwrap();
        let idx = id as usize;
        let slot = slots.entries.get_mut(idx)?;
        let removed = slot.take();
        if removed.is_some() {
            self.memory_bases[idx].store(ptr::null_mut(), Ordering::Release);
            debug!("compartment: unbound memory id={id}");
        }
        removed
    }

    /// Lock-free read of the base address published for `id`, the
    /// operation generated code actually performs. `null` if nothing is
    /// bound there.
    pub fn base_address(&self, id: u32) -> Option<*mut u8> {
        self.memory_bases.get(id as usize).map(|p| p.load(Ordering::Acquire))
    }

    /// Run `f` against the memory bound at `id`, if any.
    pub fn with_memory<R>(&self, id: u32, f: impl FnOnce(&MemoryInstance) -> R) -> Option<R> {
        let slots = self.mutex.lock().unwrap();
        slots.entries.get(id as usize)?.as_deref().map(f)
    }

    /// Run `f` against the memory bound at `id`, if any, with mutable
    /// access (used for `grow`/`shrink`/`unmap_pages`).
    pub fn with_memory_mut<R>(
        &self,
        id: u32,
        f: impl FnOnce(&mut MemoryInstance) -> R,
    ) -> Option<R> {
        let mut slots = self.mutex.lock().unwrap();
        slots.entries.get_mut(id as usize)?.as_deref_mut().map(f)
    }

    /// Number of memory slots this compartment was created with.
    pub fn capacity(&self) -> u32 {
        self.memory_bases.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::memory_type::MemoryType;

    fn test_config() -> MemoryConfig {
        let page = crate::page::host_page_size() as u64;
        MemoryConfig {
            reservation_bytes_64bit: page * 16,
            reservation_bytes_32bit: page * 16,
            guard_pages: 1,
            allow_32bit_hosts: true,
        }
    }

    #[test]
    fn add_assigns_lowest_free_id_and_publishes_base() {
        let compartment = Compartment::new(4);
        let mem = MemoryInstance::create(MemoryType::new(1, 4), &test_config()).unwrap();
        let base = mem.base_ptr();
        let id = compartment.add(mem).unwrap();
        assert_eq!(id, 0);
        assert_eq!(compartment.base_address(id), Some(base));
    }

    #[test]
    fn remove_nulls_the_base_and_tears_down() {
        let compartment = Compartment::new(4);
        let mem = MemoryInstance::create(MemoryType::new(1, 4), &test_config()).unwrap();
        let base = mem.base_ptr();
        let id = compartment.add(mem).unwrap();

        let removed = compartment.remove(id).unwrap();
        assert_eq!(compartment.base_address(id), Some(ptr::null_mut()));
        assert!(crate::registry::is_address_owned_by_memory(base));
        drop(removed);
        assert!(!crate::registry::is_address_owned_by_memory(base));
    }

    #[test]
    fn clone_binds_at_the_same_id() {
        let c1 = Compartment::new(8);
        let c2 = Compartment::new(8);

        // Occupy ids 0..6 in c1 so the source memory lands on id 7, the way
        // a populated source compartment would.
        for _ in 0..7 {
            let filler = MemoryInstance::create(MemoryType::new(1, 4), &test_config()).unwrap();
            c1.add(filler).unwrap();
        }
        let source = MemoryInstance::create(MemoryType::new(1, 4), &test_config()).unwrap();
        let source_id = c1.add(source).unwrap();
        assert_eq!(source_id, 7);

        let clone = c1
            .with_memory(source_id, |m| m.try_clone())
            .unwrap()
            .unwrap();
        let clone_base = clone.base_ptr();
        c2.insert_at(source_id, clone).unwrap();
        assert_eq!(c2.base_address(source_id), Some(clone_base));
    }

    #[test]
    #[should_panic(expected = "already occupied")]
    fn insert_at_panics_on_an_already_occupied_id() {
        let compartment = Compartment::new(1);
        let first = MemoryInstance::create(MemoryType::new(1, 4), &test_config()).unwrap();
        compartment.insert_at(0, first).unwrap();

        let second = MemoryInstance::create(MemoryType::new(1, 4), &test_config()).unwrap();
        let _ = compartment.insert_at(0, second);
    }

    #[test]
    fn id_exhaustion_is_reported() {
        let compartment = Compartment::new(1);
        let first = MemoryInstance::create(MemoryType::new(1, 4), &test_config()).unwrap();
        compartment.add(first).unwrap();

        let second = MemoryInstance::create(MemoryType::new(1, 4), &test_config()).unwrap();
        let err = compartment.add(second).unwrap_err();
        assert!(matches!(err, MemoryError::IdExhausted));
    }
}

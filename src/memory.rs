//! `MemoryInstance` is the core of the linear memory manager: a single
//! WebAssembly linear memory backed by a fixed virtual-address reservation
//! whose base address never moves once `create` returns.

use crate::config::{MemoryConfig, WASM_PAGE_SIZE};
use crate::error::{MemoryError, Result};
use crate::memory_type::MemoryType;
use crate::platform::Reservation;
use crate::registry;
use log::{debug, trace};
use more_asserts::{assert_ge, assert_le};

/// The three states a memory instance passes through. `Uninitialized` is
/// never observable outside of construction: `MemoryInstance::create` only
/// ever returns an instance already in `Live`, or an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Live,
    Torn,
}

/// A raw view of a memory's base pointer and current length, in the shape
/// compiled code reads directly without going through any of this crate's
/// safe accessors. Field order and layout are part of the ABI contract with
/// a code generator, hence `#[repr(C)]`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VMMemoryDefinition {
    /// The stable base address of the reservation.
    pub base: *mut u8,
    /// The current accessible size, in bytes (`num_pages * 65536`).
    pub current_length: usize,
}

/// A single WebAssembly linear memory: its type, its virtual-memory
/// reservation, and its currently committed page count.
///
/// `base_address` is fixed for the lifetime of the instance: `grow`/`shrink`
/// only ever commit or decommit pages within the existing reservation, they
/// never reallocate.
#[derive(Debug)]
pub struct MemoryInstance {
    ty: MemoryType,
    reservation: Reservation,
    /// Reservation size in bytes, excluding the guard region.
    end_offset: u64,
    /// Size of the trailing guard region, in bytes.
    guard_bytes: u64,
    num_pages: u32,
    /// Assigned by the owning `Compartment` after `create` returns; absent
    /// until then.
    id: Option<u32>,
    state: State,
}

impl MemoryInstance {
    /// Reserve address space for a memory of type `ty` and commit its
    /// initial `min_pages`. On any failure the reservation (if made) is
    /// released and no global state is mutated.
    pub fn create(ty: MemoryType, config: &MemoryConfig) -> Result<Self> {
        assert_le!(ty.min_pages(), ty.max_pages());
        assert!(
            config.allow_32bit_hosts || cfg!(target_pointer_width = "64"),
            "this MemoryConfig forbids 32-bit hosts"
        );

        let reservation_bytes = config.reservation_bytes();
        let guard_bytes = config.guard_pages as u64 * crate::page::host_page_size() as u64;
        let total_bytes = reservation_bytes
            .checked_add(guard_bytes)
            .ok_or(MemoryError::Reservation {
                bytes: reservation_bytes,
            })?;
        let total_usize = usize::try_from(total_bytes).map_err(|_| MemoryError::Reservation {
            bytes: total_bytes,
        })?;

        let reservation = Reservation::new(total_usize).map_err(|_| MemoryError::Reservation {
            bytes: total_bytes,
        })?;

        let mut instance = MemoryInstance {
            ty,
            reservation,
            end_offset: reservation_bytes,
            guard_bytes,
            num_pages: 0,
            id: None,
            state: State::Live,
        };

        // Any failure here drops `instance`, which releases the reservation
        // without touching the global registry (nothing was registered
        // yet). This is the "undo: free the reservation" rollback path.
        instance.grow_internal(ty.min_pages())?;

        registry::register(instance.reservation.as_ptr(), instance.end_offset as usize);
        debug!(
            "create_memory: base={:p} min_pages={} max_pages={} reservation_bytes={}",
            instance.reservation.as_ptr(),
            ty.min_pages(),
            ty.max_pages(),
            reservation_bytes
        );
        Ok(instance)
    }

    /// Create a fresh memory matching this one's type and committed page
    /// count, at a distinct reservation and base address. Does not copy
    /// byte contents: copying linear memory data is a collaborator concern
    /// (the instantiation layer), not this core.
    pub fn try_clone(&self) -> Result<Self> {
        let total = self.end_offset + self.guard_bytes;
        let total_usize =
            usize::try_from(total).map_err(|_| MemoryError::Reservation { bytes: total })?;
        let reservation =
            Reservation::new(total_usize).map_err(|_| MemoryError::Reservation { bytes: total })?;

        let mut clone = MemoryInstance {
            ty: self.ty,
            reservation,
            end_offset: self.end_offset,
            guard_bytes: self.guard_bytes,
            num_pages: 0,
            id: None,
            state: State::Live,
        };
        if self.num_pages > 0 {
            clone.grow_internal(self.num_pages)?;
        }

        registry::register(clone.reservation.as_ptr(), clone.end_offset as usize);
        debug!(
            "clone_memory: source_base={:p} clone_base={:p} num_pages={}",
            self.reservation.as_ptr(),
            clone.reservation.as_ptr(),
            clone.num_pages
        );
        Ok(clone)
    }

    /// Grow the memory in place by `n` WebAssembly pages. Returns the page
    /// count from just before the grow. `n == 0` is a legal no-op.
    pub fn grow(&mut self, n: u32) -> Result<u32> {
        if n == 0 {
            return Ok(self.num_pages);
        }
        let previous = self.grow_internal(n)?;
        trace!(
            "grow_memory: base={:p} {} -> {} page(s)",
            self.reservation.as_ptr(),
            previous,
            self.num_pages
        );
        Ok(previous)
    }

    fn grow_internal(&mut self, n: u32) -> Result<u32> {
        if n > self.ty.max_pages() {
            return Err(MemoryError::SizeBound {
                requested: n as u64,
                limit: self.ty.max_pages(),
            });
        }
        if self.num_pages > self.ty.max_pages() - n {
            return Err(MemoryError::SizeBound {
                requested: self.num_pages as u64 + n as u64,
                limit: self.ty.max_pages(),
            });
        }

        let offset = self.num_pages as u64 * WASM_PAGE_SIZE;
        let len = n as u64 * WASM_PAGE_SIZE;
        self.reservation
            .commit(offset as usize, len as usize)
            .map_err(|_| MemoryError::Commit {
                offset,
                pages: n as u64,
            })?;

        let previous = self.num_pages;
        self.num_pages += n;
        Ok(previous)
    }

    /// Shrink the memory in place by `n` WebAssembly pages. Returns the page
    /// count from just before the shrink. `n == 0` is a legal no-op.
    ///
    /// `num_pages` is decremented *before* the vacated pages are decommitted
    /// so that no other thread can observe the pages as still committed but
    /// logically freed.
    pub fn shrink(&mut self, n: u32) -> Result<u32> {
        if n == 0 {
            return Ok(self.num_pages);
        }
        if n > self.num_pages {
            return Err(MemoryError::SizeBound {
                requested: 0,
                limit: self.ty.min_pages(),
            });
        }
        let new_pages = self.num_pages - n;
        if new_pages < self.ty.min_pages() {
            return Err(MemoryError::SizeBound {
                requested: new_pages as u64,
                limit: self.ty.min_pages(),
            });
        }

        let previous = self.num_pages;
        self.num_pages = new_pages;

        let offset = new_pages as u64 * WASM_PAGE_SIZE;
        let len = n as u64 * WASM_PAGE_SIZE;
        self.reservation
            .decommit(offset as usize, len as usize)
            .map_err(|_| MemoryError::Decommit {
                offset,
                pages: n as u64,
            })?;

        trace!(
            "shrink_memory: base={:p} {} -> {} page(s)",
            self.reservation.as_ptr(),
            previous,
            self.num_pages
        );
        Ok(previous)
    }

    /// Decommit a contiguous run of already-committed pages without
    /// changing `num_pages`. Used by collaborators that logically zero a
    /// range and want to release its physical backing.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`, `page_index >= num_pages`, or
    /// `page_index + n > num_pages`. These are caller preconditions, not
    /// recoverable errors: a validated wasm module and a correct
    /// collaborator can never trigger them.
    pub fn unmap_pages(&mut self, page_index: u32, n: u32) {
        assert!(n > 0, "unmap_memory_pages: n must be non-zero");
        assert!(
            page_index < self.num_pages,
            "unmap_memory_pages: page_index {page_index} out of bounds ({} committed)",
            self.num_pages
        );
        // `page_index + n` is allowed to equal `num_pages`: unmapping through
        // the last committed page is valid, it just can't run past it.
        assert_le!(page_index + n, self.num_pages);

        let offset = page_index as u64 * WASM_PAGE_SIZE;
        let len = n as u64 * WASM_PAGE_SIZE;
        self.reservation
            .unmap_pages(offset as usize, len as usize)
            .expect("unmap_pages: host decommit of an already-committed range failed");
    }

    /// The memory's immutable min/max type.
    pub fn ty(&self) -> MemoryType {
        self.ty
    }

    /// The current committed page count.
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// The stable base address of the reservation.
    pub fn base_ptr(&self) -> *mut u8 {
        self.reservation.as_ptr()
    }

    /// The reservation size in bytes, excluding the guard region. This is
    /// the bound `ValidatedRange` checks against, not `num_pages * 65536`.
    pub fn end_offset(&self) -> u64 {
        self.end_offset
    }

    /// The compartment-local id assigned to this memory, if it has been
    /// bound into a compartment's slot table yet.
    pub fn id(&self) -> Option<u32> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: u32) {
        assert!(self.id.is_none(), "memory id assigned more than once");
        self.id = Some(id);
    }

    /// Whether this instance is still in the `Live` state.
    pub fn is_live(&self) -> bool {
        self.state == State::Live
    }

    /// A raw `VMMemoryDefinition` exposing the base pointer and current
    /// length, in the shape compiled code reads directly.
    pub fn vmmemory(&self) -> VMMemoryDefinition {
        VMMemoryDefinition {
            base: self.reservation.as_ptr(),
            current_length: (self.num_pages as u64 * WASM_PAGE_SIZE) as usize,
        }
    }
}

impl Drop for MemoryInstance {
    fn drop(&mut self) {
        if self.state != State::Live {
            return;
        }
        let committed_bytes = self.num_pages as u64 * WASM_PAGE_SIZE;
        if committed_bytes > 0 {
            let _ = self
                .reservation
                .decommit(0, committed_bytes as usize);
        }
        registry::deregister(self.reservation.as_ptr());
        self.state = State::Torn;
        debug!("destroy_memory: base={:p}", self.reservation.as_ptr());
    }
}

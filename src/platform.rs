//! Low-level abstraction for reserving, committing, decommitting, and
//! releasing host virtual memory.
//!
//! This is the only module in the crate that talks to the operating system
//! directly. Everything above it works in terms of [`Reservation`] and
//! never touches `libc`/`rustix`/`windows-sys` itself.

use std::io;
use std::ptr::NonNull;

/// Round `size` up to the nearest multiple of `page_size`. `page_size` must
/// be a power of two.
fn round_up_to_page_size(size: usize, page_size: usize) -> usize {
    (size + (page_size - 1)) & !(page_size - 1)
}

/// Returns the host's native page size, in bytes. Queried once and cached by
/// callers that need it repeatedly (see `crate::page`).
pub fn host_page_size() -> usize {
    #[cfg(unix)]
    {
        rustix::param::page_size()
    }
    #[cfg(target_os = "windows")]
    {
        use std::mem::MaybeUninit;
        use windows_sys::Win32::System::SystemInformation::GetSystemInfo;
        unsafe {
            let mut info = MaybeUninit::zeroed().assume_init();
            GetSystemInfo(&mut info);
            info.dwPageSize as usize
        }
    }
}

/// A contiguous span of reserved (but not necessarily committed) virtual
/// address space.
///
/// The base address never changes for the lifetime of a `Reservation`:
/// growing and shrinking the accessible prefix is done in place via
/// [`Reservation::commit`] / [`Reservation::decommit`], never by
/// reallocating. Dropping a `Reservation` releases the entire address
/// range back to the host.
#[derive(Debug)]
pub struct Reservation {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: `Reservation` owns a span of address space exclusively; the raw
// pointer it carries is not aliased by anything that would make sharing it
// across threads unsound.
unsafe impl Send for Reservation {}
unsafe impl Sync for Reservation {}

impl Reservation {
    /// Reserve `len` bytes of address space with no backing store. `len` is
    /// rounded up to a host page-size multiple.
    pub fn new(len: usize) -> io::Result<Self> {
        let page_size = host_page_size();
        let len = round_up_to_page_size(len, page_size);
        if len == 0 {
            return Ok(Reservation {
                base: NonNull::dangling(),
                len: 0,
            });
        }

        #[cfg(unix)]
        {
            use rustix::mm::{mmap_anonymous, MapFlags, ProtFlags};
            let ptr = unsafe {
                mmap_anonymous(
                    std::ptr::null_mut(),
                    len,
                    ProtFlags::empty(),
                    MapFlags::PRIVATE,
                )
            }
            .map_err(io::Error::from)?;
            Ok(Reservation {
                base: NonNull::new(ptr as *mut u8).expect("mmap returned null on success"),
                len,
            })
        }
        #[cfg(target_os = "windows")]
        {
            use windows_sys::Win32::System::Memory::{VirtualAlloc, MEM_RESERVE, PAGE_NOACCESS};
            let ptr = unsafe { VirtualAlloc(std::ptr::null_mut(), len, MEM_RESERVE, PAGE_NOACCESS) };
            let base = NonNull::new(ptr as *mut u8)
                .ok_or_else(io::Error::last_os_error)?;
            Ok(Reservation { base, len })
        }
    }

    /// The base address of the reservation. Stable for the reservation's
    /// entire lifetime.
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// The size of the reservation, in bytes (including any guard region).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Make `[offset, offset + len)` readable and writable. Both must be
    /// host page-size multiples and must describe a range within the
    /// reservation.
    pub fn commit(&self, offset: usize, len: usize) -> io::Result<()> {
        if len == 0 {
            return Ok(());
        }
        debug_assert!(offset + len <= self.len);
        let addr = unsafe { self.base.as_ptr().add(offset) };

        #[cfg(unix)]
        {
            use rustix::mm::{mprotect, MprotectFlags};
            unsafe { mprotect(addr as *mut _, len, MprotectFlags::READ | MprotectFlags::WRITE) }
                .map_err(io::Error::from)
        }
        #[cfg(target_os = "windows")]
        {
            use windows_sys::Win32::System::Memory::{VirtualAlloc, MEM_COMMIT, PAGE_READWRITE};
            let ptr = unsafe { VirtualAlloc(addr as *mut _, len, MEM_COMMIT, PAGE_READWRITE) };
            if ptr.is_null() {
                Err(io::Error::last_os_error())
            } else {
                Ok(())
            }
        }
    }

    /// Release the backing store of `[offset, offset + len)` and guarantee
    /// that subsequent accesses to it trap until re-committed. Used for
    /// `Shrink`, where the freed range must behave exactly like guard pages.
    pub fn decommit(&self, offset: usize, len: usize) -> io::Result<()> {
        if len == 0 {
            return Ok(());
        }
        debug_assert!(offset + len <= self.len);
        let addr = unsafe { self.base.as_ptr().add(offset) };

        #[cfg(unix)]
        {
            use rustix::mm::{madvise, mprotect, Advice, MprotectFlags};
            unsafe { mprotect(addr as *mut _, len, MprotectFlags::empty()) }
                .map_err(io::Error::from)?;
            // Best effort: let the kernel drop the physical backing now
            // rather than waiting for reclaim. Not required for correctness
            // since the `mprotect` above already makes the range trap.
            let _ = unsafe { madvise(addr as *mut _, len, Advice::LinuxDontNeed) };
            Ok(())
        }
        #[cfg(target_os = "windows")]
        {
            use windows_sys::Win32::System::Memory::{VirtualFree, MEM_DECOMMIT};
            let ok = unsafe { VirtualFree(addr as *mut _, len, MEM_DECOMMIT) };
            if ok == 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(())
            }
        }
    }

    /// Release the backing store of `[offset, offset + len)` without
    /// forcing subsequent accesses to trap. Used for `UnmapPages`, an
    /// explicit collaborator-driven decommit where a later write may
    /// transparently re-fault the pages in, depending on the platform (see
    /// crate-level docs).
    pub fn unmap_pages(&self, offset: usize, len: usize) -> io::Result<()> {
        if len == 0 {
            return Ok(());
        }
        debug_assert!(offset + len <= self.len);
        let addr = unsafe { self.base.as_ptr().add(offset) };

        #[cfg(unix)]
        {
            use rustix::mm::{madvise, Advice};
            // On Linux this lazily re-zeros the range on next touch without
            // a fault, matching the "transparent" branch of the documented
            // platform-dependent contract.
            unsafe { madvise(addr as *mut _, len, Advice::LinuxDontNeed) }.map_err(io::Error::from)
        }
        #[cfg(target_os = "windows")]
        {
            // Windows has no non-trapping decommit primitive, so this falls
            // back to the same trapping behavior as `decommit`.
            self.decommit(offset, len)
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        #[cfg(unix)]
        {
            use rustix::mm::munmap;
            let r = unsafe { munmap(self.base.as_ptr() as *mut _, self.len) };
            debug_assert!(r.is_ok(), "munmap failed: {:?}", r);
        }
        #[cfg(target_os = "windows")]
        {
            use windows_sys::Win32::System::Memory::{VirtualFree, MEM_RELEASE};
            let r = unsafe { VirtualFree(self.base.as_ptr() as *mut _, 0, MEM_RELEASE) };
            debug_assert!(r != 0, "VirtualFree failed: {}", io::Error::last_os_error());
        }
    }
}

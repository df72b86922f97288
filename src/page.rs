//! WebAssembly-page / host-page unit reconciliation.

use crate::config::WASM_PAGE_SIZE;
use once_cell::sync::OnceCell;

static HOST_PAGE_SIZE: OnceCell<usize> = OnceCell::new();

/// The host's native page size, in bytes. Queried once via the platform
/// shim and cached for the remainder of the process, since it cannot change
/// at runtime.
///
/// # Panics
///
/// Panics if the host page size exceeds the WebAssembly page size, or does
/// not evenly divide it: every commit/decommit request is sized in whole
/// WebAssembly pages, and a host whose page granularity doesn't divide that
/// evenly could be asked to commit a non-page-aligned byte range.
pub fn host_page_size() -> usize {
    *HOST_PAGE_SIZE.get_or_init(|| {
        let size = crate::platform::host_page_size();
        assert!(
            size as u64 <= WASM_PAGE_SIZE,
            "host page size ({size}) exceeds the WebAssembly page size ({WASM_PAGE_SIZE})"
        );
        assert!(
            (WASM_PAGE_SIZE as usize) % size == 0,
            "WebAssembly page size is not a multiple of the host page size ({size})"
        );
        size
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_page_size_divides_the_wasm_page_size() {
        let host = host_page_size();
        assert_eq!((WASM_PAGE_SIZE as usize) % host, 0);
    }
}

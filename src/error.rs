//! Error taxonomy for the linear memory manager.
//!
//! Reservation/commit/bound/id-exhaustion failures are all recoverable from
//! the caller's perspective and are therefore represented as a typed enum
//! rather than panics. Precondition violations (negative/overflowing unmap
//! ranges, duplicate clone ids) are assertions: they indicate a bug in a
//! collaborator that already validated its inputs.

use thiserror::Error;

/// Errors returned by the fallible operations of the linear memory manager.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The host refused to reserve the requested span of virtual address
    /// space (out of address space, or the request overflowed `usize`).
    #[error("failed to reserve {bytes} byte(s) of virtual address space")]
    Reservation {
        /// The size of the reservation that was attempted, in bytes.
        bytes: u64,
    },

    /// The host refused to commit backing store for an already-reserved
    /// range (out of physical memory or swap).
    #[error("failed to commit {pages} host page(s) at reservation offset {offset}")]
    Commit {
        /// Byte offset of the commit request within the reservation.
        offset: u64,
        /// Number of host pages requested.
        pages: u64,
    },

    /// A grow or shrink request would take `num_pages` outside
    /// `[min_pages, max_pages]`.
    #[error("operation would violate memory bounds (requested {requested} page(s), limit {limit} page(s))")]
    SizeBound {
        /// The page count the operation would have produced.
        requested: u64,
        /// The bound that was violated (`max_pages` for grow, `min_pages` for shrink).
        limit: u32,
    },

    /// The host refused to decommit an already-committed range (should not
    /// happen in practice; surfaced rather than panicking so a caller can
    /// decide how to react to a misbehaving host).
    #[error("failed to decommit {pages} host page(s) at reservation offset {offset}")]
    Decommit {
        /// Byte offset of the decommit request within the reservation.
        offset: u64,
        /// Number of host pages requested.
        pages: u64,
    },

    /// The owning compartment's id slot table has no free ids left.
    #[error("compartment has no free memory slot ids left")]
    IdExhausted,
}

/// Result alias for fallible operations in this crate's public API.
pub type Result<T> = std::result::Result<T, MemoryError>;

//! Topology Tables
//!
//! The child table is a fixed-capacity arena addressed by generation-checked
//! [`ChildIndex`] handles, so a handle held across a removal can never reach
//! the child that reuses the slot. The router table covers the 63-entry
//! router ID namespace together with the Router-ID Sequence that versions
//! allocation changes across the partition.

mod child_table;
mod router_table;

use thiserror::Error;

pub use child_table::{ChildIndex, ChildTable, DEFAULT_MAX_CHILD_ADDRESSES};
pub use router_table::{DEFAULT_ROUTER_ID_REUSE_DELAY_MS, RouterTable, sequence_is_newer};

/// Errors from child and router table operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("table full: max {capacity} entries")]
    NoBufs { capacity: usize },

    #[error("router id {0} already allocated")]
    Already(u8),

    #[error("router id {0} out of range")]
    InvalidRouterId(u8),

    #[error("router id {0} not allocated")]
    NotAllocated(u8),

    #[error("stale child index")]
    StaleIndex,
}

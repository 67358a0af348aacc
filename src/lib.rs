//! # Seurat - Managed Shared Memory Segments
//!
//! Seurat provides named-object shared memory segments: a region of memory
//! backed by a named OS shared-memory store in which cooperating processes
//! create, look up, and destroy typed objects by name. The region's
//! internal layout is managed by a pluggable allocation algorithm and a
//! pluggable name index, both living inside the region itself.
//!
//! ## Features
//!
//! - **Named segments**: create / open-or-create / open-only by name
//! - **Three mapping modes**: read-write, read-only, copy-on-write
//! - **Named typed objects**: construct, find, destroy arrays of `T`
//! - **Pluggable strategies**: compile-time allocator and index selection
//! - **Whole-segment resize**: grow and shrink-to-fit without a live handle
//! - **Move-only handles**: explicit swap/take ownership transfer
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │          ManagedSegment (facade)                 │
//! ├──────────────────────────────────────────────────┤
//! │  SegmentManager  │  placement, named-object ops  │
//! ├──────────────────┴───────────────────────────────┤
//! │  in-segment state                                │
//! │  header │ allocator arena │ name index │ objects │
//! ├──────────────────────────────────────────────────┤
//! │  SharedMemoryObject + MappedRegion (device)      │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use seurat::{ManagedSharedMemory, Result};
//!
//! fn main() -> Result<()> {
//!     let segment = ManagedSharedMemory::create_only("telemetry", 64 * 1024)?;
//!     segment.construct::<u64>("frame_counter", 1, 0)?;
//!
//!     // any process can open the segment and find the object by name
//!     let reader = ManagedSharedMemory::open_read_only("telemetry")?;
//!     let (counter, count) = reader.find::<u64>("frame_counter").unwrap();
//!     assert_eq!(count, 1);
//!     assert_eq!(unsafe { counter.as_ref() }, &0);
//!     Ok(())
//! }
//! ```

pub mod alloc;
pub mod device;
pub mod error;
pub mod index;
pub mod segment;
pub mod sync;

// Main API re-exports
pub use alloc::{AllocationAlgorithm, BestFit, MAX_ALLOC_ALIGN};
pub use device::{AccessMode, MappedRegion, SharedMemoryObject};
pub use error::{Result, SeuratError};
pub use index::{IndexEntry, IndexPolicy, ListIndex};
pub use segment::{
    ManagedSegment, ManagedSharedMemory, NamedObjectInfo, SegmentManager, SegmentStats,
};
pub use sync::RawSpinLock;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

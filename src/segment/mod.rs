//! Managed segment core: header layout, manager placement, and the facade

pub mod header;
pub mod managed;
pub mod manager;

pub use header::{SegmentHeader, FORMAT_VERSION, HEADER_SIZE, SEGMENT_MAGIC};
pub use managed::{ManagedSegment, ManagedSharedMemory, NamedObjectInfo, SegmentStats};
pub use manager::SegmentManager;

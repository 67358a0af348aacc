//! Backing-store device: named OS shared memory and its mappings

pub mod mapping;
pub mod shm;

pub use mapping::{AccessMode, MappedRegion};
pub use shm::SharedMemoryObject;

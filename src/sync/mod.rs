//! Synchronization primitives for cross-process coordination
//!
//! Everything here is designed to live *inside* a shared memory segment:
//! single-word state, no process-local pointers, no OS handles. Every
//! process that maps the segment synchronizes on the same cache line.

pub mod spinlock;

pub use spinlock::{RawSpinLock, SpinGuard};

//! Cross-process spin lock embedded in shared memory

use std::sync::atomic::{AtomicU32, Ordering};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// Number of busy spins before yielding the CPU to the scheduler
const SPINS_BEFORE_YIELD: u32 = 128;

/// A single-word spin lock that can live inside a shared memory segment.
///
/// The lock state is one `AtomicU32`, so any process that maps the segment
/// contends on the same word. There is no owner tracking and no poisoning:
/// a process that dies while holding the lock leaves it held (the same
/// caveat the underlying platform's anonymous shared memory carries).
#[repr(transparent)]
#[derive(Debug)]
pub struct RawSpinLock {
    state: AtomicU32,
}

impl RawSpinLock {
    /// Create a new unlocked spin lock
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
        }
    }

    /// Acquire the lock, spinning until it becomes available
    pub fn lock(&self) -> SpinGuard<'_> {
        let mut spins = 0u32;
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            while self.state.load(Ordering::Relaxed) == LOCKED {
                spins += 1;
                if spins >= SPINS_BEFORE_YIELD {
                    spins = 0;
                    std::thread::yield_now();
                } else {
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Try to acquire the lock without spinning
    pub fn try_lock(&self) -> Option<SpinGuard<'_>> {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinGuard { lock: self })
    }

    /// Check whether the lock is currently held by anyone
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) == LOCKED
    }

    fn unlock(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by [`RawSpinLock::lock`]; releases on drop
#[derive(Debug)]
pub struct SpinGuard<'a> {
    lock: &'a RawSpinLock,
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_lock_unlock() {
        let lock = RawSpinLock::new();
        assert!(!lock.is_locked());
        {
            let _guard = lock.lock();
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_try_lock_contended() {
        let lock = RawSpinLock::new();
        let guard = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_mutual_exclusion() {
        let lock = Arc::new(RawSpinLock::new());
        let counter = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    let _guard = lock.lock();
                    let v = counter.load(Ordering::Relaxed);
                    counter.store(v + 1, Ordering::Relaxed);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 4000);
    }
}

//! Concurrency tests: multiple handles, one segment
//!
//! Threads stand in for processes here; every handle maps the same store,
//! so the in-segment lock is exercised exactly as it would be across
//! address spaces.

use std::sync::atomic::{AtomicU32, Ordering};

use seurat::{ManagedSharedMemory, SeuratError, SharedMemoryObject};

static NAME_SEQ: AtomicU32 = AtomicU32::new(0);

fn unique_name(tag: &str) -> String {
    format!(
        "seurat_ct_{}_{}_{}",
        std::process::id(),
        NAME_SEQ.fetch_add(1, Ordering::Relaxed),
        tag
    )
}

struct Cleanup(String);

impl Drop for Cleanup {
    fn drop(&mut self) {
        let _ = SharedMemoryObject::remove(&self.0);
    }
}

const WRITERS: usize = 4;
const OBJECTS_PER_WRITER: usize = 32;

#[test]
fn test_concurrent_constructs_lose_nothing() {
    let name = unique_name("fanout");
    let _cleanup = Cleanup(name.clone());

    let segment = ManagedSharedMemory::create_only(&name, 256 * 1024).unwrap();

    std::thread::scope(|scope| {
        for writer in 0..WRITERS {
            let name = name.as_str();
            scope.spawn(move || {
                let handle = ManagedSharedMemory::open_only(name).unwrap();
                for i in 0..OBJECTS_PER_WRITER {
                    let object = format!("obj_{}_{}", writer, i);
                    let value = (writer * 1000 + i) as u64;
                    handle.construct::<u64>(&object, 1, value).unwrap();
                }
            });
        }
    });

    // every insert survived the interleaving
    assert_eq!(segment.num_named_objects(), WRITERS * OBJECTS_PER_WRITER);
    for writer in 0..WRITERS {
        for i in 0..OBJECTS_PER_WRITER {
            let object = format!("obj_{}_{}", writer, i);
            let (ptr, count) = segment.find::<u64>(&object).unwrap();
            assert_eq!(count, 1);
            assert_eq!(unsafe { *ptr.as_ref() }, (writer * 1000 + i) as u64);
        }
    }
}

#[test]
fn test_duplicate_name_race_admits_exactly_one() {
    let name = unique_name("race");
    let _cleanup = Cleanup(name.clone());

    let segment = ManagedSharedMemory::create_only(&name, 64 * 1024).unwrap();
    let winners = AtomicU32::new(0);

    std::thread::scope(|scope| {
        for _ in 0..WRITERS {
            let name = name.as_str();
            let winners = &winners;
            scope.spawn(move || {
                let handle = ManagedSharedMemory::open_only(name).unwrap();
                match handle.construct::<u64>("contested", 1, 1) {
                    Ok(_) => {
                        winners.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(SeuratError::ObjectExists { .. }) => {}
                    Err(other) => panic!("unexpected error: {}", other),
                }
            });
        }
    });

    assert_eq!(winners.load(Ordering::Relaxed), 1);
    assert_eq!(segment.num_named_objects(), 1);
}

#[test]
fn test_finds_stay_consistent_under_churn() {
    let name = unique_name("churn");
    let _cleanup = Cleanup(name.clone());

    let segment = ManagedSharedMemory::create_only(&name, 256 * 1024).unwrap();
    segment.construct::<u64>("stable", 1, 0xDEAD_BEEF).unwrap();

    std::thread::scope(|scope| {
        // writers churn the index with short-lived objects
        for writer in 0..2 {
            let name = name.as_str();
            scope.spawn(move || {
                let handle = ManagedSharedMemory::open_only(name).unwrap();
                for i in 0..200 {
                    let object = format!("churn_{}_{}", writer, i);
                    handle.construct::<u32>(&object, 4, i as u32).unwrap();
                    assert!(handle.destroy(&object));
                }
            });
        }
        // readers must observe the stable object on every lookup
        for _ in 0..2 {
            let name = name.as_str();
            scope.spawn(move || {
                let handle = ManagedSharedMemory::open_only(name).unwrap();
                for _ in 0..500 {
                    let (ptr, count) = handle.find::<u64>("stable").unwrap();
                    assert_eq!(count, 1);
                    assert_eq!(unsafe { *ptr.as_ref() }, 0xDEAD_BEEF);
                }
            });
        }
    });

    assert_eq!(segment.num_named_objects(), 1);
}

#[test]
fn test_read_only_lookups_proceed_alongside_writers() {
    let name = unique_name("ro_churn");
    let _cleanup = Cleanup(name.clone());

    let segment = ManagedSharedMemory::create_only(&name, 256 * 1024).unwrap();
    segment.construct::<u64>("anchor", 1, 7).unwrap();

    std::thread::scope(|scope| {
        {
            // insert-only churn: fresh index nodes are published with a
            // release store and none are reclaimed, which is what keeps the
            // reader's lockless walk sound
            let name = name.as_str();
            scope.spawn(move || {
                let writer = ManagedSharedMemory::open_only(name).unwrap();
                for i in 0..200 {
                    let object = format!("w_{}", i);
                    writer.construct::<u32>(&object, 1, i as u32).unwrap();
                }
            });
        }
        {
            // the read-only path takes no lock, so it cannot deadlock
            // against the writer no matter how the schedules interleave
            let name = name.as_str();
            scope.spawn(move || {
                let reader = ManagedSharedMemory::open_read_only(name).unwrap();
                for _ in 0..500 {
                    let (ptr, _) = reader.find::<u64>("anchor").unwrap();
                    assert_eq!(unsafe { *ptr.as_ref() }, 7);
                }
            });
        }
    });
}

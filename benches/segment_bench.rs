use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use seurat::{ManagedSharedMemory, SharedMemoryObject};

fn bench_name(tag: &str) -> String {
    format!("seurat_bench_{}_{}", std::process::id(), tag)
}

fn benchmark_construct_destroy(c: &mut Criterion) {
    let mut group = c.benchmark_group("ManagedSegment");

    for count in [1usize, 16, 256].iter() {
        group.bench_with_input(
            BenchmarkId::new("construct_destroy", count),
            count,
            |b, &count| {
                let name = bench_name("construct");
                let _ = SharedMemoryObject::remove(&name);
                let segment = ManagedSharedMemory::create_only(&name, 1024 * 1024).unwrap();

                b.iter(|| {
                    segment.construct::<u64>("bench_obj", count, 0).unwrap();
                    assert!(segment.destroy("bench_obj"));
                });

                drop(segment);
                let _ = SharedMemoryObject::remove(&name);
            },
        );
    }

    group.finish();
}

fn benchmark_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("ManagedSegment");

    for population in [4usize, 64].iter() {
        group.bench_with_input(
            BenchmarkId::new("find_hit", population),
            population,
            |b, &population| {
                let name = bench_name("find");
                let _ = SharedMemoryObject::remove(&name);
                let segment = ManagedSharedMemory::create_only(&name, 1024 * 1024).unwrap();
                for i in 0..population {
                    segment
                        .construct::<u64>(&format!("obj_{}", i), 1, i as u64)
                        .unwrap();
                }

                // the oldest object sits at the end of the index walk
                b.iter(|| {
                    let (ptr, count) = segment.find::<u64>("obj_0").unwrap();
                    assert_eq!(count, 1);
                    ptr
                });

                drop(segment);
                let _ = SharedMemoryObject::remove(&name);
            },
        );
    }

    group.bench_function("find_miss", |b| {
        let name = bench_name("miss");
        let _ = SharedMemoryObject::remove(&name);
        let segment = ManagedSharedMemory::create_only(&name, 1024 * 1024).unwrap();
        for i in 0..64 {
            segment
                .construct::<u64>(&format!("obj_{}", i), 1, i as u64)
                .unwrap();
        }

        b.iter(|| segment.find::<u64>("absent"));

        drop(segment);
        let _ = SharedMemoryObject::remove(&name);
    });

    group.finish();
}

criterion_group!(benches, benchmark_construct_destroy, benchmark_find);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use pagepool::buffer::replacer::LruReplacer;
use pagepool::container::hash::ExtendibleHash;
use pagepool::storage::MemoryDiskManager;
use pagepool::{BufferPoolManager, PageId};

fn bench_lru(c: &mut Criterion) {
    c.bench_function("lru_insert_victim_1k", |b| {
        let replacer = LruReplacer::new();
        b.iter(|| {
            for i in 0..1000u32 {
                replacer.insert(i);
            }
            while let Some(v) = replacer.victim() {
                black_box(v);
            }
        })
    });
}

fn bench_extendible_hash(c: &mut Criterion) {
    c.bench_function("hash_insert_10k", |b| {
        b.iter_batched(
            || ExtendibleHash::<u64, u64>::new(16),
            |table| {
                for k in 0..10_000u64 {
                    table.insert(k, k);
                }
                table
            },
            BatchSize::SmallInput,
        )
    });

    let table = ExtendibleHash::<u64, u64>::new(16);
    for k in 0..10_000u64 {
        table.insert(k, k);
    }
    c.bench_function("hash_find_10k", |b| {
        b.iter(|| {
            for k in 0..10_000u64 {
                black_box(table.find(&k));
            }
        })
    });
}

fn bench_buffer_pool(c: &mut Criterion) {
    let bpm = BufferPoolManager::new(64, MemoryDiskManager::new());
    let pages: Vec<PageId> = (0..256)
        .map(|_| {
            bpm.new_page_guarded()
                .unwrap()
                .expect("pool has room")
                .page_id()
        })
        .collect();

    c.bench_function("fetch_unpin_resident", |b| {
        let pid = pages[pages.len() - 1];
        b.iter(|| {
            bpm.fetch_page(black_box(pid)).unwrap().expect("resident");
            bpm.unpin_page(pid, false);
        })
    });

    // 256 pages through 64 frames: mostly misses with dirty write-back
    c.bench_function("fetch_unpin_cycle_256_over_64", |b| {
        b.iter(|| {
            for &pid in &pages {
                let mut guard = bpm.fetch_page_write(pid).unwrap().expect("frame free");
                guard.as_mut_slice()[0] = guard.as_slice()[0].wrapping_add(1);
            }
        })
    });
}

criterion_group!(benches, bench_lru, bench_extendible_hash, bench_buffer_pool);
criterion_main!(benches);

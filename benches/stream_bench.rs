use cfbstream::chain::ChainResolver;
use cfbstream::stream::DocumentStream;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const SECTOR: usize = 512;
const SIZE:   usize = 1024 * 1024;

/// 1 MiB laid out in 512-byte sectors in reverse order.
fn scattered() -> (Vec<u8>, Vec<u32>) {
    let count = SIZE / SECTOR;
    let mut storage = vec![0u8; SIZE];
    for (i, b) in storage.iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    let blocks = (0..count as u32).rev().collect();
    (storage, blocks)
}

fn bench_reads(c: &mut Criterion) {
    let (storage, blocks) = scattered();
    let open = || DocumentStream::open(
        ChainResolver::new(&storage, 0, SECTOR, blocks.clone(), SIZE as u64),
        SIZE as u64,
    );

    c.bench_function("read_byte_1mb", |b| {
        b.iter(|| {
            let mut s = open();
            let mut sum = 0u64;
            while let Some(v) = s.read_byte().unwrap() {
                sum += v as u64;
            }
            black_box(sum)
        })
    });

    c.bench_function("read_buffer_1mb_4k_chunks", |b| {
        let mut buf = vec![0u8; 4096];
        b.iter(|| {
            let mut s = open();
            while let Some(n) = s.read_buffer(&mut buf, 0, 4096).unwrap() {
                black_box(&buf[..n]);
            }
        })
    });

    c.bench_function("read_fully_1mb", |b| {
        let mut buf = vec![0u8; SIZE];
        b.iter(|| {
            let mut s = open();
            s.read_fully(&mut buf, 0, SIZE).unwrap();
            black_box(&buf);
        })
    });
}

fn bench_typed(c: &mut Criterion) {
    let (storage, blocks) = scattered();

    // Offset 3 puts one u64 in every 64 across a sector boundary.
    c.bench_function("read_u64_1mb_unaligned", |b| {
        b.iter(|| {
            let mut s = DocumentStream::open(
                ChainResolver::new(&storage, 0, SECTOR, blocks.clone(), SIZE as u64),
                SIZE as u64,
            );
            s.skip(3).unwrap();
            let mut acc = 0u64;
            while s.available().unwrap() >= 8 {
                acc ^= s.read_u64().unwrap();
            }
            black_box(acc)
        })
    });
}

criterion_group!(benches, bench_reads, bench_typed);
criterion_main!(benches);

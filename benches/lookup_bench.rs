use arhpak::codec::{Codec, ZstdCodec};
use arhpak::Archive;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

#[path = "../tests/common/mod.rs"]
mod common;

fn names(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("/common/dir_{:02}/file_{i:05}.bdat", i % 37))
        .collect()
}

fn open_archive(count: usize) -> (TempDir, Archive, Vec<String>) {
    let names = names(count);
    let payload = vec![42u8; 4096];
    let builder = names
        .iter()
        .fold(common::ArchiveBuilder::new(), |b, n| b.compressed(n, &payload));
    let dir = TempDir::new().unwrap();
    let (arh, ard) = builder.write_to(dir.path());
    let ar = Archive::open(arh, ard).unwrap();
    (dir, ar, names)
}

fn bench_lookup(c: &mut Criterion) {
    let (_dir, ar, names) = open_archive(5000);

    c.bench_function("trie_lookup_5000_entries", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % names.len();
            ar.lookup(black_box(&names[i])).unwrap()
        })
    });

    c.bench_function("glob_scan_5000_entries", |b| {
        b.iter(|| ar.find_by_pattern(black_box("/common/dir_1?/*.bdat")).unwrap().len())
    });
}

fn bench_read(c: &mut Criterion) {
    let (_dir, ar, names) = open_archive(64);
    let entry = ar.lookup(&names[7]).unwrap().unwrap().clone();

    c.bench_function("read_compressed_4k", |b| b.iter(|| ar.read(black_box(&entry)).unwrap()));
}

fn bench_replace_compress(c: &mut Criterion) {
    let data = vec![0u8; 1024 * 1024];
    let zstd = ZstdCodec;

    c.bench_function("zstd_compress_1mb_max_level", |b| {
        b.iter(|| zstd.compress(black_box(&data), zstd.max_level()))
    });
}

criterion_group!(benches, bench_lookup, bench_read, bench_replace_compress);
criterion_main!(benches);

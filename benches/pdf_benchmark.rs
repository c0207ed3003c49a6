//! Performance benchmarks for PDF image tools
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{Rgb, RgbImage};
use pdf_image_tools::pdf;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write `count` gradient JPEGs of `width` x `height` pixels
fn write_images(dir: &Path, count: usize, width: u32, height: u32) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let image = RgbImage::from_fn(width, height, |x, y| {
                Rgb([(x % 256) as u8, (y % 256) as u8, (i * 40 % 256) as u8])
            });
            let path = dir.join(format!("image_{:03}.jpg", i));
            image.save(&path).expect("Failed to write image");
            path
        })
        .collect()
}

/// A PDF with `pages` pages of 612x792 pt (letter), built from images
fn write_document(dir: &Path, pages: usize) -> PathBuf {
    let images = write_images(dir, pages, 1224, 1584);
    let path = dir.join(format!("document_{}.pdf", pages));
    pdf::merge(&images, &path, 144.0).expect("Failed to build fixture");
    path
}

/// Fresh output path per iteration, since outputs are never overwritten
fn output_path(dir: &Path, counter: &mut usize) -> PathBuf {
    *counter += 1;
    dir.join(format!("out_{}.pdf", counter))
}

/// Benchmark page rasterization at several resolutions
fn bench_rasterization(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let document = write_document(dir.path(), 4);

    let mut group = c.benchmark_group("rasterization");
    group.sample_size(10);
    group.throughput(Throughput::Elements(4));

    for dpi in [72.0_f32, 144.0, 300.0] {
        group.bench_with_input(BenchmarkId::new("extract_4pages", dpi as u32), &dpi, |b, &dpi| {
            b.iter(|| {
                let assets = pdf::extract(black_box(&document), dpi).unwrap();
                black_box(assets.len());
            });
        });
    }

    group.finish();
}

/// Benchmark image-to-PDF assembly for growing batches
fn bench_assembly(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let images = write_images(dir.path(), 20, 800, 600);
    let mut counter = 0;

    let mut group = c.benchmark_group("assembly");
    group.sample_size(10);

    for count in [1, 5, 20] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::new("merge", format!("{}_images", count)),
            &count,
            |b, &count| {
                b.iter(|| {
                    let output = output_path(dir.path(), &mut counter);
                    pdf::merge(black_box(&images[..count]), &output, 144.0).unwrap();
                    std::fs::remove_file(&output).unwrap();
                });
            },
        );
    }

    group.finish();
}

/// Benchmark lossless structural optimization
fn bench_lossless(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let document = write_document(dir.path(), 8);
    let size = std::fs::metadata(&document).unwrap().len();
    let mut counter = 0;

    let mut group = c.benchmark_group("lossless");
    group.sample_size(10);
    group.throughput(Throughput::Bytes(size));

    group.bench_function("optimize_8pages", |b| {
        b.iter(|| {
            let output = output_path(dir.path(), &mut counter);
            pdf::optimize_lossless(black_box(&document), &output).unwrap();
            std::fs::remove_file(&output).unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_rasterization, bench_assembly, bench_lossless);

criterion_main!(benches);

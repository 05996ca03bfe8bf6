//! Benchmarks for writing documents and reading them back.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pdf_loom::writer::XRefFormat;
use pdf_loom::{PdfReader, PdfWriter, PdfWriterConfig};

fn build(pages: usize, format: XRefFormat) -> Vec<u8> {
    let config = PdfWriterConfig::default()
        .with_xref_format(format)
        .with_object_streams(format == XRefFormat::Stream);
    let mut writer = PdfWriter::with_config(config);
    let font = writer.register_standard_font("Helvetica").unwrap();
    for page in 0..pages {
        writer.add_letter_page().unwrap();
        for line in 0..40 {
            writer
                .write_content(
                    format!("BT /{} 10 Tf 72 {} Td (Page {} line {}) Tj ET", font, 750 - line * 15, page, line)
                        .as_bytes(),
                )
                .unwrap();
        }
    }
    writer.finish().unwrap()
}

fn benchmark_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");
    for pages in [1usize, 10, 100] {
        group.bench_with_input(BenchmarkId::new("xref_table", pages), &pages, |b, &pages| {
            b.iter(|| build(black_box(pages), XRefFormat::Table));
        });
        group.bench_with_input(BenchmarkId::new("xref_stream", pages), &pages, |b, &pages| {
            b.iter(|| build(black_box(pages), XRefFormat::Stream));
        });
    }
    group.finish();
}

fn benchmark_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");
    for format in [XRefFormat::Table, XRefFormat::Stream] {
        let data = build(100, format);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(format!("{:?}", format)), &data, |b, data| {
            b.iter(|| {
                let reader = PdfReader::from_bytes(black_box(data.clone())).unwrap();
                black_box(reader.pages().unwrap().len())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_write, benchmark_read);
criterion_main!(benches);

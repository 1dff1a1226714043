use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

use mailgrab::config::CollisionPolicy;
use mailgrab::export::attachment::AttachmentWriter;
use mailgrab::parser::header::decode_header;
use mailgrab::parser::mime::{extract_parts, split_parts};

fn fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(path).unwrap()
}

fn bench_decode_header(c: &mut Criterion) {
    let subject = "Re: =?UTF-8?B?SW5mb3JtZSBkZSB2ZW50YXM=?= =?ISO-8859-1?Q?Jos=E9_Garc=EDa?= (Q3)";
    c.bench_function("decode_header_mixed", |b| b.iter(|| decode_header(subject)));
}

fn bench_split_parts(c: &mut Criterion) {
    let data = fixture("nested.eml");
    c.bench_function("split_parts_nested", |b| b.iter(|| split_parts(&data)));
}

fn bench_extract_parts(c: &mut Criterion) {
    let data = fixture("report_a.eml");
    let tmp = tempfile::tempdir().unwrap();
    let writer = AttachmentWriter::new(tmp.path(), CollisionPolicy::Overwrite);
    c.bench_function("extract_parts_report", |b| {
        b.iter(|| extract_parts(&data, "Report A", &writer))
    });
}

criterion_group!(
    benches,
    bench_decode_header,
    bench_split_parts,
    bench_extract_parts
);
criterion_main!(benches);

use rand::Rng;
use std::{io::Cursor, path::PathBuf};

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use xtce::{spacepacket::decode_packets, Database, RawBits, StreamProcessor};

const NUM_PACKETS: usize = 60_000;

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap());
    path.push(name);
    path
}

// Thermal housekeeping packets with a random number of random sensor readings.
fn thermal_packets(count: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut buf = Vec::new();
    for seq in 0..count {
        let sensors: usize = rng.gen_range(1..=8);
        let data_len = 3 + 2 * sensors;
        let seq = u16::try_from(seq % 0x4000).unwrap();
        buf.extend_from_slice(&[0x00, 0x0b]);
        buf.extend_from_slice(&(0xc000 | seq).to_be_bytes());
        buf.extend_from_slice(&u16::try_from(data_len - 1).unwrap().to_be_bytes());
        buf.extend_from_slice(&[0x01, u8::try_from(sensors).unwrap()]);
        for _ in 0..sensors {
            buf.extend_from_slice(&rng.gen_range(0u16..400).to_be_bytes());
        }
        buf.push(rng.gen_range(0..2));
    }
    buf
}

fn bench_stream(c: &mut Criterion) {
    let db = Database::from_path(fixture_path("tests/fixtures/demo.json")).unwrap();
    let stream = db.stream("Telemetry").unwrap();
    let processor = StreamProcessor::new(&db, stream);
    let dat = thermal_packets(NUM_PACKETS);
    let packets: Vec<RawBits> = decode_packets(Cursor::new(dat.clone()))
        .map(|p| p.unwrap().bits())
        .collect();

    let mut group = c.benchmark_group("stream");
    group.throughput(Throughput::Bytes(dat.len() as u64));
    group.sample_size(10);
    group.bench_function("process_stream", |b| {
        b.iter(|| {
            for bits in &packets {
                processor.process_stream(bits).unwrap();
            }
        });
    });
    group.bench_function("process_many", |b| {
        b.iter(|| {
            let zult = processor.process_many(&packets);
            assert_eq!(zult.len(), NUM_PACKETS);
        });
    });
    group.bench_function("decode_packets", |b| {
        b.iter(|| {
            let num = decode_packets(Cursor::new(dat.clone())).count();
            assert_eq!(num, NUM_PACKETS);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_stream);
criterion_main!(benches);

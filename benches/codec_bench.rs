use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rand::Rng;
use simnet::core::codec::{Fetcher, FrameFetcher, FrameSeparator, PacketCodec, Separator};
use simnet::core::packet::Packet;

fn random_payload(size: usize) -> Vec<u8> {
    let mut payload = vec![0u8; size];
    rand::rng().fill(&mut payload[..]);
    payload
}

#[allow(clippy::unwrap_used)]
fn bench_separate(c: &mut Criterion) {
    let mut group = c.benchmark_group("separate");
    let payload_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for &size in &payload_sizes {
        let packet = Packet::new(random_payload(size));
        let mut separator = FrameSeparator::default();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("separate_{size}b"), |b| {
            b.iter(|| separator.separate(&packet).unwrap())
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_fetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("fetch");
    let payload_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for &size in &payload_sizes {
        let frame = Packet::new(random_payload(size)).to_bytes();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("fetch_whole_{size}b"), |b| {
            b.iter_batched(
                || FrameFetcher::new(PacketCodec::default()),
                |mut fetcher| {
                    let packets = fetcher.fetch(&frame).unwrap();
                    assert_eq!(packets.len(), 1);
                },
                BatchSize::SmallInput,
            )
        });

        // socket-sized reads, as a session sees them
        group.bench_function(format!("fetch_8k_reads_{size}b"), |b| {
            b.iter_batched(
                || FrameFetcher::new(PacketCodec::default()),
                |mut fetcher| {
                    let mut count = 0;
                    for read in frame.chunks(8 * 1024) {
                        count += fetcher.fetch(read).unwrap().len();
                    }
                    assert_eq!(count, 1);
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_many_small_frames(c: &mut Criterion) {
    let stream: Vec<u8> = (0..1000)
        .flat_map(|_| Packet::new(random_payload(48)).to_bytes())
        .collect();

    let mut group = c.benchmark_group("fetch_batch");
    group.throughput(Throughput::Elements(1000));
    group.bench_function("fetch_1000x48b", |b| {
        b.iter_batched(
            || FrameFetcher::new(PacketCodec::default()),
            |mut fetcher| {
                let packets = fetcher.fetch(&stream).unwrap();
                assert_eq!(packets.len(), 1000);
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_separate, bench_fetch, bench_many_small_frames);
criterion_main!(benches);

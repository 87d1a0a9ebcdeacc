use bytes::{Bytes, BytesMut};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use crater_protocol::{Channel, FrameBuffer, GiveData, Message, decode_frame};

fn batch(records: usize, size: usize) -> Message {
    Message::GiveData(GiveData {
        channel: Channel::Input,
        records: (0..records).map(|_| Bytes::from(vec![0x5Au8; size])).collect(),
    })
}

fn bench_encode(c: &mut Criterion) {
    let msg = batch(64, 128);
    let mut dst = BytesMut::with_capacity(64 * 1024);

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(64));
    group.bench_function("encode give_data 64x128", |b| {
        b.iter(|| {
            dst.clear();
            black_box(&msg).encode(&mut dst);
        });
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let wire = batch(64, 128).to_bytes();

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("decode_frame (copying)", |b| {
        b.iter(|| black_box(decode_frame(black_box(&wire)).unwrap()));
    });
    group.bench_function("frame_buffer (zero copy)", |b| {
        let mut buf = FrameBuffer::new();
        b.iter(|| {
            buf.extend_from_slice(&wire);
            black_box(buf.next_message().unwrap());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);

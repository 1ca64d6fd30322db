//! Per-packet costs on the network loop and the audio callbacks

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use voice_relay::audio::FrameQueues;
use voice_relay::network::PeerTable;
use voice_relay::protocol::{HeaderProfile, PacketCodec};

fn bench_header(c: &mut Criterion) {
    let codec = PacketCodec::new(HeaderProfile::Timestamped);
    let payload = vec![0x5Au8; 80];
    let mut buf = BytesMut::with_capacity(1500);

    c.bench_function("encode_packet", |b| {
        b.iter(|| {
            codec.encode_packet(black_box(123_456_789), black_box(42), &payload, &mut buf);
            black_box(buf.len())
        })
    });

    codec.encode_packet(123_456_789, 42, &payload, &mut buf);
    let datagram = buf.to_vec();
    c.bench_function("decode_header", |b| {
        b.iter(|| black_box(codec.decode_header(black_box(&datagram))).is_ok())
    });
}

fn bench_queues(c: &mut Criterion) {
    let queues = FrameQueues::new(3, 8);
    let packet = Bytes::from(vec![0u8; 80]);
    let mut drained = Vec::with_capacity(3);

    c.bench_function("outbound_push_drain", |b| {
        b.iter(|| {
            queues.outbound.push(packet.clone());
            queues.outbound.drain_into(&mut drained);
            drained.clear();
        })
    });

    let mut out = vec![0.0f32; 240];
    c.bench_function("playback_push_pop", |b| {
        b.iter(|| {
            queues.inbound.push(vec![0.1f32; 240]);
            black_box(queues.inbound.pop_into(&mut out))
        })
    });
}

fn bench_fanout(c: &mut Criterion) {
    let mut peers = PeerTable::new();
    for port in 0..16u16 {
        peers.record_sender(([10, 0, 0, 1], 40_000 + port).into());
    }
    let sender = ([10, 0, 0, 1], 40_000).into();

    c.bench_function("fanout_16_peers", |b| {
        b.iter(|| peers.all_except(black_box(sender)).count())
    });
}

criterion_group!(benches, bench_header, bench_queues, bench_fanout);
criterion_main!(benches);

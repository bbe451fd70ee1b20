// ABOUTME: Benchmark suite for frame encoding, decoding and callback slot churn
// ABOUTME: Measures the per-request codec cost at several argument sizes

use bytes::{Bytes, BytesMut};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::io::Cursor;
use std::time::Duration;
use valkey_link::frame;
use valkey_link::messages::{
    ArgsBody, CommandRequest, RequestKind, RequestType, Response, ResponsePayload,
};
use valkey_link::registry::CallbackRegistry;

fn command_request(arg_len: usize) -> CommandRequest {
    CommandRequest {
        callback_idx: 17,
        kind: RequestKind::Command {
            request_type: RequestType::Set,
            args: ArgsBody::Inline(vec![
                Bytes::from_static(b"benchmark-key"),
                Bytes::from(vec![b'v'; arg_len]),
            ]),
        },
        route: None,
    }
}

fn bench_encode_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_request");
    for arg_len in [16usize, 512, 4096, 32_768] {
        let request = command_request(arg_len);
        group.bench_with_input(
            BenchmarkId::from_parameter(arg_len),
            &request,
            |b, request| {
                b.iter(|| {
                    let mut buf = BytesMut::with_capacity(arg_len + 64);
                    frame::encode(black_box(request), &mut buf).unwrap();
                    black_box(buf)
                });
            },
        );
    }
    group.finish();
}

fn bench_parse_response(c: &mut Criterion) {
    let response = Response {
        callback_idx: 17,
        payload: Some(ResponsePayload::RespPointer(0xfeed_f00d)),
    };
    let mut framed = BytesMut::new();
    frame::encode(&response, &mut framed).unwrap();

    c.bench_function("parse_response", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(framed.as_ref()));
            let parsed: Response = frame::parse(&mut cursor).unwrap();
            black_box(parsed)
        });
    });
}

fn bench_registry_churn(c: &mut Criterion) {
    c.bench_function("registry_insert_take_64", |b| {
        b.iter(|| {
            let mut registry = CallbackRegistry::new();
            let indices: Vec<usize> = (0..64)
                .map(|_| registry.insert(tokio::sync::oneshot::channel().0))
                .collect();
            for index in indices {
                black_box(registry.take(index));
            }
        });
    });
}

fn configure() -> Criterion {
    Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(100)
}

criterion_group! {
    name = benches;
    config = configure();
    targets = bench_encode_request, bench_parse_response, bench_registry_churn
}
criterion_main!(benches);

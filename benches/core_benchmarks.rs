use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mcp_dock::core::models::RawTool;
use mcp_dock::mcp::codec::JsonLineCodec;
use mcp_dock::schema::normalizer::normalize_tools;
use serde_json::json;
use tokio_util::codec::Decoder;

fn bench_codec_decode(c: &mut Criterion) {
    let mut codec = JsonLineCodec::new();
    let data = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"pong\"}]}}\n";

    c.bench_function("codec_decode_response", |b| {
        b.iter(|| {
            let mut src = BytesMut::from(&data[..]);
            let _ = codec.decode(black_box(&mut src));
        })
    });

    let noisy = b"npm WARN deprecated package\n{\"jsonrpc\":\"2.0\",\"method\":\"notifications/message\"}\n";
    c.bench_function("codec_decode_noise", |b| {
        b.iter(|| {
            let mut src = BytesMut::from(&noisy[..]);
            while let Ok(Some(_)) = codec.decode(black_box(&mut src)) {}
        })
    });
}

fn bench_normalize_tools(c: &mut Criterion) {
    let tools: Vec<RawTool> = (0..50)
        .map(|i| {
            serde_json::from_value(json!({
                "name": format!("tool_{:02}", 49 - i),
                "description": "Does things.\n\nArgs:\n    path: file to read\n    limit: max lines",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "limit": {"type": "integer"},
                        "tags": {"type": "array", "items": {"type": "string"}},
                        "verbose": {}
                    },
                    "required": ["path"]
                }
            }))
            .unwrap()
        })
        .collect();

    c.bench_function("normalize_50_tools", |b| {
        b.iter(|| normalize_tools(black_box(&tools)))
    });
}

criterion_group!(benches, bench_codec_decode, bench_normalize_tools);
criterion_main!(benches);

// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use mcp_dock::mcp::codec::JsonLineCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // A small line limit exercises the discard path as well.
    let mut codec = JsonLineCodec::with_max_line_bytes(256);
    let mut buffer = BytesMut::new();

    // Feed in uneven chunks, the way a pipe delivers them.
    for chunk in data.chunks(7) {
        buffer.extend_from_slice(chunk);
        while let Ok(Some(_)) = codec.decode(&mut buffer) {}
    }
    while let Ok(Some(_)) = codec.decode_eof(&mut buffer) {}
});

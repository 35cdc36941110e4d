// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use mcp_dock::core::errors::ClientError;
use mcp_dock::core::models::{ListToolsResult, WireMessage};
use mcp_dock::schema::normalizer::normalize_tools;

fuzz_target!(|data: &[u8]| {
    // Envelope classification must never panic on odd id/method/result shapes.
    if let Ok(WireMessage::Response { outcome: Err(err), .. }) = WireMessage::from_slice(data) {
        let _ = ClientError::from(err).is_retryable();
    }

    // Arbitrary schemas flow through the normalizer unchecked.
    if let Ok(result) = serde_json::from_slice::<ListToolsResult>(data) {
        let _ = normalize_tools(&result.tools);
    }
});

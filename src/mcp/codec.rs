// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! MCP stdio codec.
//!
//! Newline-delimited JSON-RPC framing. Decoding never fails on bad content:
//! servers are free to interleave diagnostics with protocol traffic, so a
//! line that is not a JSON-RPC message surfaces as `Frame::Malformed` and the
//! stream carries on. Lines over the size limit are discarded up to the next
//! newline and reported as `Frame::Oversized`.

use bytes::{Buf, BytesMut};
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::core::constants::limits;
use crate::core::errors::ClientError;
use crate::core::models::WireMessage;

/// Longest slice of a malformed line kept for diagnostics.
const MALFORMED_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Message(WireMessage),
    Malformed { line: String, reason: String },
    Oversized { bytes: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Searching for a newline; bytes before `next_index` are known not to contain one
    Scan { next_index: usize },
    /// Dropping an oversized line until its terminating newline
    Discard { dropped: usize },
}

#[derive(Debug)]
pub struct JsonLineCodec {
    state: DecodeState,
    max_line_bytes: usize,
}

impl JsonLineCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_bytes(limits::MAX_LINE_BYTES)
    }

    #[must_use]
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            state: DecodeState::Scan { next_index: 0 },
            max_line_bytes,
        }
    }
}

impl Default for JsonLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_line(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\n' | b'\r'] = line {
        line = rest;
    }
    line
}

fn parse_line(line: &[u8]) -> Frame {
    match WireMessage::from_slice(line) {
        Ok(message) => {
            trace!("Decoded message: {:?}", message);
            Frame::Message(message)
        }
        Err(e) => Frame::Malformed {
            line: String::from_utf8_lossy(line)
                .chars()
                .take(MALFORMED_PREVIEW_CHARS)
                .collect(),
            reason: e.to_string(),
        },
    }
}

impl Decoder for JsonLineCodec {
    type Item = Frame;
    type Error = ClientError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ClientError> {
        loop {
            match self.state {
                DecodeState::Scan { next_index } => {
                    let newline = src[next_index..].iter().position(|b| *b == b'\n');
                    let Some(offset) = newline else {
                        if src.len() > self.max_line_bytes {
                            let dropped = src.len();
                            src.clear();
                            self.state = DecodeState::Discard { dropped };
                        } else {
                            self.state = DecodeState::Scan {
                                next_index: src.len(),
                            };
                        }
                        return Ok(None);
                    };

                    let raw = src.split_to(next_index + offset + 1);
                    self.state = DecodeState::Scan { next_index: 0 };
                    let line = trim_line(&raw);

                    if line.len() > self.max_line_bytes {
                        return Ok(Some(Frame::Oversized { bytes: line.len() }));
                    }
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return Ok(Some(parse_line(line)));
                }
                DecodeState::Discard { dropped } => {
                    match src.iter().position(|b| *b == b'\n') {
                        Some(offset) => {
                            src.advance(offset + 1);
                            self.state = DecodeState::Scan { next_index: 0 };
                            return Ok(Some(Frame::Oversized {
                                bytes: dropped + offset,
                            }));
                        }
                        None => {
                            let dropped = dropped + src.len();
                            src.clear();
                            self.state = DecodeState::Discard { dropped };
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ClientError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        let state = std::mem::replace(&mut self.state, DecodeState::Scan { next_index: 0 });
        match state {
            DecodeState::Discard { dropped } => {
                src.clear();
                Ok(Some(Frame::Oversized { bytes: dropped }))
            }
            DecodeState::Scan { .. } => {
                // Unterminated final line
                let raw = src.split();
                let line = trim_line(&raw);
                if line.iter().all(u8::is_ascii_whitespace) {
                    Ok(None)
                } else {
                    Ok(Some(parse_line(line)))
                }
            }
        }
    }
}

impl<T: Serialize> Encoder<T> for JsonLineCodec {
    type Error = ClientError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), ClientError> {
        // Compact serde_json output never contains a raw newline.
        let body = serde_json::to_vec(&item)?;
        dst.reserve(body.len() + 1);
        dst.extend_from_slice(&body);
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}

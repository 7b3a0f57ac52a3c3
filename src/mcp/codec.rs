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

//! Frame parser for newline-delimited JSON-RPC streams.
//!
//! Accumulates raw byte chunks and extracts complete line-framed messages.
//! A trailing `\r` is stripped, empty lines are skipped, and the total
//! buffered size is capped (10 MiB by default). All accounting is in UTF-8
//! bytes, never code points.

use bytes::BytesMut;

use crate::engine_core::constants::limits;
use crate::engine_core::errors::FrameError;
use crate::mcp::message::WireMessage;

pub struct FrameParser {
    buf: BytesMut,
    max_buffered: usize,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::with_limit(limits::MAX_MESSAGE_SIZE_BYTES)
    }

    pub fn with_limit(max_buffered: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_buffered,
        }
    }

    /// Append a chunk of raw bytes.
    ///
    /// Fails with [`FrameError::BufferOverflow`] if the total pending bytes
    /// would exceed the cap; on failure the buffer is cleared so the stream
    /// can recover.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), FrameError> {
        let size = self.buf.len() + chunk.len();
        if size > self.max_buffered {
            self.buf.clear();
            return Err(FrameError::BufferOverflow {
                size,
                limit: self.max_buffered,
            });
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    /// Extract the next complete message, or `None` when no full line is
    /// buffered.
    ///
    /// A complete line that fails JSON parsing or message-shape validation
    /// is consumed and reported as [`FrameError::InvalidMessage`]; parsing
    /// continues on the next call.
    pub fn read_message(&mut self) -> Result<Option<WireMessage>, FrameError> {
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                return Ok(None);
            };

            let line = self.buf.split_to(pos + 1);
            let mut line = &line[..line.len() - 1];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if line.is_empty() {
                continue;
            }

            return match serde_json::from_slice::<WireMessage>(line) {
                Ok(msg) => Ok(Some(msg)),
                Err(e) => Err(FrameError::InvalidMessage(e.to_string())),
            };
        }
    }

    /// Drain every complete message currently buffered. Malformed lines are
    /// logged and skipped.
    pub fn read_all(&mut self) -> Vec<WireMessage> {
        let mut out = Vec::new();
        loop {
            match self.read_message() {
                Ok(Some(msg)) => out.push(msg),
                Ok(None) => break,
                Err(e) => tracing::warn!("skipping malformed line: {}", e),
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Bytes currently buffered, in UTF-8 bytes.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

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

// Domain error types - recoverable conditions carry enough context to log,
// fatal ones propagate to the caller of start()/stop().

use thiserror::Error;

/// Errors produced by the frame parser.
#[derive(Error, Debug)]
pub enum FrameError {
    /// The pending buffer would exceed the configured cap. The buffer has
    /// been cleared; the stream may continue.
    #[error("frame buffer overflow: {size} bytes exceeds limit of {limit}")]
    BufferOverflow { size: usize, limit: usize },

    /// A complete line was extracted but was not a valid JSON-RPC message.
    /// The line has been consumed; the stream may continue.
    #[error("invalid JSON-RPC message: {0}")]
    InvalidMessage(String),
}

/// Main error type for the firewall engine.
#[derive(Error, Debug)]
pub enum WallError {
    /// Failed to spawn the wrapped server process
    #[error("failed to spawn server process: {0}")]
    ChildSpawn(#[source] std::io::Error),

    /// The server process exited while the proxy was running
    #[error("server process exited unexpectedly (code: {code:?})")]
    ChildExit { code: Option<i32> },

    /// Frame-level error on one of the byte streams
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The human-approval callback failed or panicked
    #[error("approval handler failure: {0}")]
    Approval(String),

    /// A user-supplied pattern was rejected at compile time
    #[error("pattern rejected ({name}): {reason}")]
    PatternRejected { name: String, reason: String },

    /// I/O Error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

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

//! Typed proxy events.
//!
//! The proxy engine emits one event per security decision. Subscribers (the
//! dashboard bridge, tests) implement [`EventSink`]; emission is synchronous
//! relative to the handler that produced the event so ordering is observable.

use serde::{Deserialize, Serialize};

use crate::engine_core::models::{ChainSeverity, Sensitivity};

/// Events emitted by the proxy engine as it processes traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProxyEvent {
    /// A tool call passed the full pipeline and was forwarded.
    Allowed {
        tool: String,
        rule: Option<String>,
    },
    /// A tool call was denied by any pipeline stage.
    Denied {
        tool: String,
        rule: Option<String>,
        message: String,
    },
    /// A tool call was escalated to human approval.
    Prompted {
        tool: String,
        rule: Option<String>,
    },
    /// A server response was blocked by the scanner.
    ResponseBlocked {
        tool: String,
        summary: String,
    },
    /// A server response was rewritten with redacted content.
    ResponseRedacted {
        tool: String,
        summary: String,
    },
    /// The injection detector fired at medium confidence or above.
    InjectionDetected {
        tool: String,
        confidence: Sensitivity,
        summary: String,
    },
    /// Egress control blocked at least one URL.
    EgressBlocked {
        tool: String,
        urls: Vec<String>,
    },
    /// The kill switch was active when a tool call arrived.
    KillSwitchActive {
        reason: String,
    },
    /// The chain detector matched a suspicious sequence.
    ChainDetected {
        chain: String,
        severity: ChainSeverity,
        tools: Vec<String>,
    },
    /// Advisory engine error (malformed traffic, buffer overflow, audit I/O).
    EngineError {
        message: String,
    },
    /// The wrapped server process exited.
    ChildExited {
        code: Option<i32>,
    },
}

/// Receiver for proxy events. All methods have no-op defaults so a subscriber
/// only implements what it observes.
pub trait EventSink: Send + Sync {
    fn on_event(&self, _event: &ProxyEvent) {}
}

/// Sink that discards everything. Useful as a default and in tests.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {}

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

//! Domain models for the Agent Wall firewall.
//!
//! Pure data structures representing tool calls, verdicts, and engine
//! statistics. This module is free of I/O side effects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool invocation extracted from a `tools/call` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// What a policy rule does when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
    Prompt,
}

/// What a scanner finding does to the response that produced it.
/// Ordered by escalation priority: `Block > Redact > Pass`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanAction {
    Pass,
    Redact,
    Block,
}

/// Injection detector sensitivity tier. Patterns carry a minimum tier;
/// a pattern runs only when its minimum is at or below the configured tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
}

/// Severity of a matched tool-call chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainSeverity {
    Medium,
    High,
    Critical,
}

/// The authoritative decision for a single tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub action: RuleAction,
    /// Name of the rule that produced this verdict, or `None` when the
    /// default action applied.
    pub rule: Option<String>,
    pub message: String,
}

impl Verdict {
    pub fn allow(rule: Option<String>, message: impl Into<String>) -> Self {
        Self {
            action: RuleAction::Allow,
            rule,
            message: message.into(),
        }
    }

    pub fn deny(rule: Option<String>, message: impl Into<String>) -> Self {
        Self {
            action: RuleAction::Deny,
            rule,
            message: message.into(),
        }
    }

    pub fn prompt(rule: Option<String>, message: impl Into<String>) -> Self {
        Self {
            action: RuleAction::Prompt,
            rule,
            message: message.into(),
        }
    }
}

/// A forwarded tool call awaiting its server response. The correlation point
/// for response scanning.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub tool: String,
    pub arguments: Map<String, Value>,
    pub inserted_at_ms: u64,
}

/// Running counters for the proxy engine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WallStats {
    /// Total `tools/call` requests seen.
    pub total: u64,
    /// Requests forwarded to the server.
    pub forwarded: u64,
    /// Requests denied (any pipeline stage).
    pub denied: u64,
    /// Requests escalated to human approval.
    pub prompted: u64,
    /// Responses run through the scanner.
    pub scanned: u64,
    /// Responses blocked outright.
    pub response_blocked: u64,
    /// Responses rewritten with redacted content.
    pub response_redacted: u64,
}

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

//! Agent Wall constants - Single source of truth for all configuration values.
//!
//! This module centralizes magic numbers, error codes, rule identifiers, and
//! default configuration values to ensure consistency and maintainability.

/// JSON-RPC 2.0 Error Codes
pub mod jsonrpc {
    /// Request denied by policy or response blocked by scanner (custom code)
    pub const ERROR_POLICY_DENIED: i32 = -32001;
    /// Request still awaiting human approval when a deadline expired (custom code)
    pub const ERROR_AWAITING_APPROVAL: i32 = -32002;
    /// Method not found (standard JSON-RPC)
    pub const ERROR_METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid request (standard JSON-RPC)
    pub const ERROR_INVALID_REQUEST: i32 = -32600;
    /// Internal error (standard JSON-RPC)
    pub const ERROR_INTERNAL: i32 = -32603;
    /// Parse error (standard JSON-RPC)
    pub const ERROR_PARSE: i32 = -32700;

    /// Prefix carried by every error message synthesized by the firewall.
    pub const ERROR_PREFIX: &str = "Agent Wall: ";
}

/// Synthetic rule identifiers emitted by the pipeline stages.
pub mod rules {
    pub const GLOBAL_RATE_LIMIT: &str = "__global_rate_limit__";
    pub const KILL_SWITCH: &str = "__kill_switch__";
    pub const INJECTION_DETECTOR: &str = "__injection_detector__";
    pub const EGRESS_CONTROL: &str = "__egress_control__";
    pub const CHAIN_DETECTOR: &str = "__chain_detector__";
    pub const RESPONSE_SCANNER: &str = "__response_scanner__";
}

/// MCP Protocol Methods
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// Transport Limits (DoS Protection)
pub mod limits {
    /// Maximum allowed JSON-RPC message size (10 MiB)
    pub const MAX_MESSAGE_SIZE_BYTES: usize = 10 * 1024 * 1024;
    /// Maximum length of a rule pattern handed to the glob-to-regex translator
    pub const MAX_GLOB_PATTERN_LEN: usize = 500;
    /// Maximum length of a user-supplied scanner regex
    pub const MAX_SCANNER_PATTERN_LEN: usize = 1000;
}

/// Default tunables for the proxy engine.
pub mod defaults {
    /// How long a forwarded tool call waits for its response before the
    /// correlation entry is dropped.
    pub const PENDING_CALL_TTL_MS: u64 = 30_000;
    /// Sweep interval for expired pending calls.
    pub const PENDING_SWEEP_INTERVAL_MS: u64 = 10_000;
    /// Kill-switch file poll interval.
    pub const KILL_POLL_INTERVAL_MS: u64 = 1_000;
    /// Chain detector window bounds.
    pub const CHAIN_WINDOW_SIZE: usize = 20;
    pub const CHAIN_WINDOW_MS: u64 = 60_000;
    /// Scanner caps.
    pub const MAX_USER_PATTERNS: usize = 100;
    /// Audit redaction: argument values longer than this are truncated.
    pub const MAX_AUDIT_ARG_LEN: usize = 200;
    /// Dashboard bridge stats publish interval.
    pub const BRIDGE_STATS_INTERVAL_MS: u64 = 2_000;
    /// Grace period per stage of the child shutdown sequence.
    pub const CHILD_SHUTDOWN_GRACE_MS: u64 = 2_000;
}

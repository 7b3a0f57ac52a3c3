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

//! Tool-call chain detector.
//!
//! Keeps a sliding window of allowed tool calls, bounded by both count and
//! age, and matches ordered tool-name sequences against the *last N*
//! entries. Must be fed only calls the policy engine already allowed.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ChainConfig;
use crate::engine::pattern_matcher::tool_matches;
use crate::engine_core::models::{ChainSeverity, ToolCall};

#[derive(Debug, Clone)]
struct ChainPattern {
    name: String,
    severity: ChainSeverity,
    /// Ordered slots; each slot is a `|`-joined set of tool-name globs.
    sequence: Vec<String>,
    track_arguments: bool,
}

fn builtin_patterns() -> Vec<ChainPattern> {
    let p = |name: &str, severity: ChainSeverity, seq: &[&str], track: bool| ChainPattern {
        name: name.to_string(),
        severity,
        sequence: seq.iter().map(|s| s.to_string()).collect(),
        track_arguments: track,
    };

    vec![
        p(
            "read-then-network",
            ChainSeverity::High,
            &["read_*|get_*|view_*", "shell_*|run_*|execute_*|bash"],
            false,
        ),
        p(
            "read-write-send",
            ChainSeverity::Critical,
            &["read_*|get_*", "write_*|create_*", "shell_*|run_*|bash"],
            false,
        ),
        p(
            "env-then-network",
            ChainSeverity::Critical,
            &["read_*|get_*|view_*", "shell_*|run_*|execute_*|bash"],
            true,
        ),
        p(
            "directory-scan",
            ChainSeverity::Medium,
            &["list_*|ls", "list_*|ls", "list_*|ls", "read_*|get_*"],
            false,
        ),
        p(
            "write-execute",
            ChainSeverity::High,
            &["write_*|create_*", "shell_*|run_*|bash"],
            false,
        ),
        p(
            "write-chmod-execute",
            ChainSeverity::Critical,
            &["write_*|create_*", "shell_*|run_*|bash", "shell_*|run_*|bash"],
            false,
        ),
        p(
            "read-sensitive-then-write",
            ChainSeverity::Medium,
            &["read_*|get_*", "write_*|create_*|edit_*"],
            true,
        ),
        p(
            "shell-burst",
            ChainSeverity::High,
            &[
                "shell_*|run_*|bash",
                "shell_*|run_*|bash",
                "shell_*|run_*|bash",
                "shell_*|run_*|bash",
            ],
            false,
        ),
    ]
}

#[derive(Debug, Clone)]
struct TrackedCall {
    tool: String,
    arguments: Map<String, Value>,
    timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainMatch {
    pub name: String,
    pub severity: ChainSeverity,
    /// The tools that formed the matched sequence, oldest first.
    pub tools: Vec<String>,
    /// Arguments of the matched calls, present for track-arguments patterns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    pub detected: bool,
    pub matches: Vec<ChainMatch>,
    pub summary: String,
}

impl ChainReport {
    /// Severity of the worst match, if any.
    pub fn worst_severity(&self) -> Option<ChainSeverity> {
        self.matches.iter().map(|m| m.severity).max()
    }
}

pub struct ChainDetector {
    window_size: usize,
    window_ms: u64,
    patterns: Vec<ChainPattern>,
    history: VecDeque<TrackedCall>,
}

impl ChainDetector {
    pub fn new(config: &ChainConfig) -> Self {
        let mut detector = Self {
            window_size: config.window_size,
            window_ms: config.window_ms,
            patterns: Vec::new(),
            history: VecDeque::new(),
        };
        detector.update_config(config);
        detector
    }

    pub fn update_config(&mut self, config: &ChainConfig) {
        self.window_size = config.window_size.max(1);
        self.window_ms = config.window_ms;
        self.patterns = builtin_patterns();
        self.patterns
            .extend(config.custom_chains.iter().map(|c| ChainPattern {
                name: c.name.clone(),
                severity: c.severity,
                sequence: c.sequence.clone(),
                track_arguments: c.track_arguments,
            }));
    }

    /// Record an allowed call and report any chains it completes.
    pub fn record(&mut self, call: &ToolCall, now_ms: u64) -> ChainReport {
        self.history.push_back(TrackedCall {
            tool: call.name.clone(),
            arguments: call.arguments.clone(),
            timestamp_ms: now_ms,
        });

        let cutoff = now_ms.saturating_sub(self.window_ms);
        while self
            .history
            .front()
            .is_some_and(|c| c.timestamp_ms < cutoff)
        {
            self.history.pop_front();
        }
        while self.history.len() > self.window_size {
            self.history.pop_front();
        }

        let matches: Vec<ChainMatch> = self
            .patterns
            .iter()
            .filter_map(|p| self.match_pattern(p))
            .collect();

        let summary = if matches.is_empty() {
            "no chain matched".to_string()
        } else {
            let names: Vec<&str> = matches.iter().map(|m| m.name.as_str()).collect();
            format!("chain(s) matched: {}", names.join(", "))
        };

        ChainReport {
            detected: !matches.is_empty(),
            matches,
            summary,
        }
    }

    /// Forget all history (used on shutdown and on kill-switch recovery).
    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// A pattern matches when the last N entries satisfy its N slots in
    /// order.
    fn match_pattern(&self, pattern: &ChainPattern) -> Option<ChainMatch> {
        let n = pattern.sequence.len();
        if n == 0 || self.history.len() < n {
            return None;
        }
        let tail: Vec<&TrackedCall> = self.history.iter().skip(self.history.len() - n).collect();
        let all_match = pattern
            .sequence
            .iter()
            .zip(&tail)
            .all(|(slot, call)| tool_matches(slot, &call.tool));
        if !all_match {
            return None;
        }

        Some(ChainMatch {
            name: pattern.name.clone(),
            severity: pattern.severity,
            tools: tail.iter().map(|c| c.tool.clone()).collect(),
            arguments: pattern.track_arguments.then(|| {
                tail.iter()
                    .map(|c| Value::Object(c.arguments.clone()))
                    .collect()
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            arguments: serde_json::Map::new(),
        }
    }

    fn detector() -> ChainDetector {
        ChainDetector::new(&ChainConfig {
            enabled: true,
            ..ChainConfig::default()
        })
    }

    #[test]
    fn read_then_shell_matches() {
        let mut d = detector();
        assert!(!d.record(&call("read_file"), 0).detected);
        let report = d.record(&call("shell_exec"), 1);
        assert!(report.detected);
        assert!(report.matches.iter().any(|m| m.name == "read-then-network"));
    }

    #[test]
    fn read_write_send_is_critical() {
        let mut d = detector();
        d.record(&call("read_file"), 0);
        d.record(&call("write_file"), 1);
        let report = d.record(&call("bash"), 2);
        let m = report
            .matches
            .iter()
            .find(|m| m.name == "read-write-send")
            .unwrap();
        assert_eq!(m.severity, ChainSeverity::Critical);
        assert_eq!(m.tools, vec!["read_file", "write_file", "bash"]);
        assert_eq!(report.worst_severity(), Some(ChainSeverity::Critical));
    }

    #[test]
    fn interleaved_call_breaks_the_tail() {
        let mut d = detector();
        d.record(&call("read_file"), 0);
        d.record(&call("list_dir"), 1);
        let report = d.record(&call("shell_exec"), 2);
        assert!(!report
            .matches
            .iter()
            .any(|m| m.name == "read-then-network"));
    }

    #[test]
    fn age_pruning_forgets_old_calls() {
        let mut d = ChainDetector::new(&ChainConfig {
            enabled: true,
            window_ms: 1_000,
            ..ChainConfig::default()
        });
        d.record(&call("read_file"), 0);
        // Two seconds later the read is gone from the window.
        let report = d.record(&call("shell_exec"), 2_000);
        assert!(!report
            .matches
            .iter()
            .any(|m| m.name == "read-then-network"));
    }

    #[test]
    fn size_pruning_caps_history() {
        let mut d = ChainDetector::new(&ChainConfig {
            enabled: true,
            window_size: 3,
            ..ChainConfig::default()
        });
        for i in 0..10 {
            d.record(&call("list_dir"), i);
        }
        assert_eq!(d.history_len(), 3);
    }

    #[test]
    fn shell_burst_needs_four_consecutive() {
        let mut d = detector();
        d.record(&call("shell_exec"), 0);
        d.record(&call("run_script"), 1);
        d.record(&call("bash"), 2);
        assert!(!d
            .record(&call("read_file"), 3)
            .matches
            .iter()
            .any(|m| m.name == "shell-burst"));

        let mut d = detector();
        d.record(&call("shell_exec"), 0);
        d.record(&call("run_script"), 1);
        d.record(&call("bash"), 2);
        let report = d.record(&call("shell_a"), 3);
        assert!(report.matches.iter().any(|m| m.name == "shell-burst"));
    }

    #[test]
    fn directory_scan_sequence() {
        let mut d = detector();
        d.record(&call("list_dir"), 0);
        d.record(&call("ls"), 1);
        d.record(&call("list_files"), 2);
        let report = d.record(&call("read_file"), 3);
        assert!(report.matches.iter().any(|m| m.name == "directory-scan"));
    }

    #[test]
    fn track_arguments_pattern_carries_them() {
        let mut d = detector();
        d.record(
            &ToolCall {
                name: "read_env".to_string(),
                arguments: json!({"name": "AWS_SECRET"}).as_object().cloned().unwrap(),
            },
            0,
        );
        let report = d.record(&call("shell_exec"), 1);
        let m = report
            .matches
            .iter()
            .find(|m| m.name == "env-then-network")
            .unwrap();
        assert!(m.arguments.is_some());
    }

    #[test]
    fn reset_clears_history() {
        let mut d = detector();
        d.record(&call("read_file"), 0);
        d.reset();
        assert_eq!(d.history_len(), 0);
        assert!(!d.record(&call("shell_exec"), 1).detected);
    }

    #[test]
    fn custom_chain_matches() {
        let mut d = ChainDetector::new(&ChainConfig {
            enabled: true,
            custom_chains: vec![crate::config::CustomChain {
                name: "fetch-then-eval".to_string(),
                severity: ChainSeverity::High,
                sequence: vec!["fetch_*".to_string(), "eval*".to_string()],
                track_arguments: false,
            }],
            ..ChainConfig::default()
        });
        d.record(&call("fetch_url"), 0);
        let report = d.record(&call("eval_js"), 1);
        assert!(report.matches.iter().any(|m| m.name == "fetch-then-eval"));
    }
}

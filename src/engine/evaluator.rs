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

//! Policy evaluation engine.
//!
//! First-match-wins over the ordered rule list, preceded by the global rate
//! limit and followed by the mode-dependent default. Never fails on ordinary
//! input; every outcome is a [`Verdict`].

use std::sync::Arc;

use crate::config::{PolicyConfig, PolicyMode};
use crate::engine::pattern_matcher::{argument_matches, tool_matches};
use crate::engine::rate_limiter::{RateLimiter, GLOBAL_BUCKET};
use crate::engine_core::constants::rules;
use crate::engine_core::models::{RuleAction, ToolCall, Verdict};

pub struct PolicyEngine {
    config: Arc<PolicyConfig>,
    limiter: RateLimiter,
}

impl PolicyEngine {
    pub fn new(config: Arc<PolicyConfig>) -> Self {
        config.warn_duplicate_rules();
        Self {
            config,
            limiter: RateLimiter::new(),
        }
    }

    pub fn config(&self) -> &Arc<PolicyConfig> {
        &self.config
    }

    /// Atomically replace the configuration snapshot. All rate-limit buckets
    /// reset so a tightened rule cannot be bypassed by an old window.
    pub fn update_config(&mut self, config: Arc<PolicyConfig>) {
        config.warn_duplicate_rules();
        self.config = config;
        self.limiter.reset();
    }

    /// Evaluate one tool call against the current snapshot.
    pub fn evaluate(&mut self, call: &ToolCall, now_ms: u64) -> Verdict {
        let config = Arc::clone(&self.config);

        if let Some(global) = &config.global_rate_limit {
            if !self.limiter.try_consume(
                GLOBAL_BUCKET,
                global.max_calls,
                global.window_seconds * 1_000,
                now_ms,
            ) {
                return Verdict::deny(
                    Some(rules::GLOBAL_RATE_LIMIT.to_string()),
                    format!(
                        "Global rate limit exceeded ({} calls per {}s)",
                        global.max_calls, global.window_seconds
                    ),
                );
            }
        }

        for rule in &config.rules {
            if !tool_matches(&rule.tool_pattern, &call.name) {
                continue;
            }
            if let Some(matcher) = &rule.match_args {
                let all_match = matcher
                    .arguments
                    .iter()
                    .all(|(key, pattern)| argument_matches(&call.arguments, key, pattern));
                if !all_match {
                    continue;
                }
            }

            if let Some(limit) = &rule.rate_limit {
                if !self.limiter.try_consume(
                    &rule.name,
                    limit.max_calls,
                    limit.window_seconds * 1_000,
                    now_ms,
                ) {
                    return Verdict::deny(
                        Some(rule.name.clone()),
                        format!(
                            "Rate limit exceeded for rule '{}' ({} calls per {}s)",
                            rule.name, limit.max_calls, limit.window_seconds
                        ),
                    );
                }
            }

            let message = rule
                .message
                .clone()
                .unwrap_or_else(|| synthesized_message(rule.action, &call.name, Some(&rule.name)));
            return Verdict {
                action: rule.action,
                rule: Some(rule.name.clone()),
                message,
            };
        }

        if config.mode == PolicyMode::Strict {
            return Verdict::deny(None, "Zero-trust: no matching allow rule");
        }

        Verdict {
            action: config.default_action,
            rule: None,
            message: synthesized_message(config.default_action, &call.name, None),
        }
    }
}

fn synthesized_message(action: RuleAction, tool: &str, rule: Option<&str>) -> String {
    let verb = match action {
        RuleAction::Allow => "allowed",
        RuleAction::Deny => "denied",
        RuleAction::Prompt => "held for approval",
    };
    match rule {
        Some(rule) => format!("Tool '{}' {} by rule '{}'", tool, verb, rule),
        None => format!("Tool '{}' {} by default action", tool, verb),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PolicyRule, RateLimit, RuleMatch};
    use serde_json::json;
    use std::collections::HashMap;

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            arguments: args.as_object().cloned().unwrap_or_default(),
        }
    }

    fn rule(name: &str, pattern: &str, action: RuleAction) -> PolicyRule {
        PolicyRule {
            name: name.to_string(),
            tool_pattern: pattern.to_string(),
            match_args: None,
            action,
            message: None,
            rate_limit: None,
        }
    }

    fn engine(rules: Vec<PolicyRule>) -> PolicyEngine {
        PolicyEngine::new(Arc::new(PolicyConfig {
            rules,
            default_action: RuleAction::Allow,
            ..PolicyConfig::default()
        }))
    }

    #[test]
    fn first_match_wins() {
        let mut engine = engine(vec![
            rule("first", "read_*", RuleAction::Deny),
            rule("second", "read_*", RuleAction::Allow),
        ]);
        let verdict = engine.evaluate(&call("read_file", json!({})), 0);
        assert_eq!(verdict.action, RuleAction::Deny);
        assert_eq!(verdict.rule.as_deref(), Some("first"));
    }

    #[test]
    fn argument_conditions_are_anded() {
        let mut args = HashMap::new();
        args.insert("path".to_string(), "*/.ssh/*".to_string());
        args.insert("mode".to_string(), "write".to_string());
        let mut engine = engine(vec![PolicyRule {
            match_args: Some(RuleMatch { arguments: args }),
            ..rule("both", "*", RuleAction::Deny)
        }]);

        let partial = call("read_file", json!({"path": "/home/u/.ssh/id_rsa"}));
        assert_eq!(engine.evaluate(&partial, 0).action, RuleAction::Allow);

        let full = call(
            "read_file",
            json!({"path": "/home/u/.ssh/id_rsa", "mode": "write"}),
        );
        assert_eq!(engine.evaluate(&full, 0).action, RuleAction::Deny);
    }

    #[test]
    fn strict_mode_denies_unmatched() {
        let mut engine = PolicyEngine::new(Arc::new(PolicyConfig {
            mode: PolicyMode::Strict,
            rules: vec![rule("allow-reads", "read_*", RuleAction::Allow)],
            ..PolicyConfig::default()
        }));
        let verdict = engine.evaluate(&call("shell_exec", json!({})), 0);
        assert_eq!(verdict.action, RuleAction::Deny);
        assert!(verdict.rule.is_none());
        assert!(verdict.message.contains("Zero-trust"));
    }

    #[test]
    fn default_action_applies_when_no_rule_matches() {
        let mut engine = PolicyEngine::new(Arc::new(PolicyConfig {
            default_action: RuleAction::Prompt,
            ..PolicyConfig::default()
        }));
        let verdict = engine.evaluate(&call("anything", json!({})), 0);
        assert_eq!(verdict.action, RuleAction::Prompt);
        assert!(verdict.rule.is_none());
    }

    #[test]
    fn global_rate_limit_denies_with_synthetic_rule() {
        let mut engine = PolicyEngine::new(Arc::new(PolicyConfig {
            global_rate_limit: Some(RateLimit {
                max_calls: 2,
                window_seconds: 60,
            }),
            default_action: RuleAction::Allow,
            ..PolicyConfig::default()
        }));
        let c = call("t", json!({}));
        assert_eq!(engine.evaluate(&c, 0).action, RuleAction::Allow);
        assert_eq!(engine.evaluate(&c, 1).action, RuleAction::Allow);
        let verdict = engine.evaluate(&c, 2);
        assert_eq!(verdict.action, RuleAction::Deny);
        assert_eq!(verdict.rule.as_deref(), Some(rules::GLOBAL_RATE_LIMIT));
    }

    #[test]
    fn per_rule_rate_limit_denies_with_rule_name() {
        let mut engine = engine(vec![PolicyRule {
            rate_limit: Some(RateLimit {
                max_calls: 1,
                window_seconds: 60,
            }),
            ..rule("limited", "shell_*", RuleAction::Allow)
        }]);
        let c = call("shell_exec", json!({}));
        assert_eq!(engine.evaluate(&c, 0).action, RuleAction::Allow);
        let verdict = engine.evaluate(&c, 1);
        assert_eq!(verdict.action, RuleAction::Deny);
        assert_eq!(verdict.rule.as_deref(), Some("limited"));
    }

    #[test]
    fn rate_denials_match_overflow_count() {
        let mut engine = PolicyEngine::new(Arc::new(PolicyConfig {
            global_rate_limit: Some(RateLimit {
                max_calls: 3,
                window_seconds: 10,
            }),
            default_action: RuleAction::Allow,
            ..PolicyConfig::default()
        }));
        let c = call("t", json!({}));
        let denied = (0..8u64)
            .filter(|i| engine.evaluate(&c, *i).action == RuleAction::Deny)
            .count();
        assert_eq!(denied, 5);
    }

    #[test]
    fn update_config_resets_buckets() {
        let config = Arc::new(PolicyConfig {
            global_rate_limit: Some(RateLimit {
                max_calls: 1,
                window_seconds: 60,
            }),
            default_action: RuleAction::Allow,
            ..PolicyConfig::default()
        });
        let mut engine = PolicyEngine::new(Arc::clone(&config));
        let c = call("t", json!({}));
        assert_eq!(engine.evaluate(&c, 0).action, RuleAction::Allow);
        assert_eq!(engine.evaluate(&c, 1).action, RuleAction::Deny);
        engine.update_config(config);
        assert_eq!(engine.evaluate(&c, 2).action, RuleAction::Allow);
    }

    #[test]
    fn normalization_commutes_with_evaluation() {
        let mut args = HashMap::new();
        args.insert("path".to_string(), "*/.ssh/*".to_string());
        let config = Arc::new(PolicyConfig {
            rules: vec![PolicyRule {
                match_args: Some(RuleMatch { arguments: args }),
                ..rule("block-ssh-keys", "*", RuleAction::Deny)
            }],
            default_action: RuleAction::Allow,
            ..PolicyConfig::default()
        });

        let raw = call(
            "read_file",
            json!({"file": "/tmp/../../home/user/.ssh/id_rsa"}),
        );
        let normalized = call("read_file", json!({"file": "/home/user/.ssh/id_rsa"}));

        let mut e1 = PolicyEngine::new(Arc::clone(&config));
        let mut e2 = PolicyEngine::new(config);
        assert_eq!(e1.evaluate(&raw, 0), e2.evaluate(&normalized, 0));
        assert_eq!(e1.evaluate(&raw, 0).rule.as_deref(), Some("block-ssh-keys"));
    }

    #[test]
    fn custom_message_wins_over_synthesized() {
        let mut engine = engine(vec![PolicyRule {
            message: Some("no shells today".to_string()),
            ..rule("deny-shell", "shell_*", RuleAction::Deny)
        }]);
        let verdict = engine.evaluate(&call("shell_exec", json!({})), 0);
        assert_eq!(verdict.message, "no shells today");
    }
}

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

//! Firewall configuration model.
//!
//! A [`PolicyConfig`] is an immutable snapshot. Reload replaces the whole
//! snapshot atomically; the policy engine, response scanner, and kill switch
//! each accept a fresh snapshot through their `update_config` methods.
//! Schema validation of the on-disk YAML lives in the CLI layer; this module
//! only defines the shape and the defaults.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::engine_core::constants::defaults;
use crate::engine_core::models::{ChainSeverity, RuleAction, ScanAction, Sensitivity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    Standard,
    /// Zero-trust: absence of an explicit allow rule results in deny.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub max_calls: u32,
    pub window_seconds: u64,
}

/// One ordered policy rule. `tool_pattern` and each argument pattern are
/// glob-like strings; alternatives are joined by `|`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    pub name: String,
    pub tool_pattern: String,
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_args: Option<RuleMatch>,
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleMatch {
    /// Argument key -> pattern. All pairs must match (AND).
    #[serde(default)]
    pub arguments: HashMap<String, String>,
}

/// A user-supplied scanner pattern. Screened for ReDoS shapes at compile
/// time; rejected patterns are recorded but non-fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPattern {
    pub name: String,
    pub pattern: String,
    #[serde(default = "default_user_category")]
    pub category: String,
    #[serde(default = "default_user_action")]
    pub action: ScanAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_user_category() -> String {
    "custom".to_string()
}

fn default_user_action() -> ScanAction {
    ScanAction::Redact
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseScanningConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Responses larger than this (bytes) synthesize an `__oversize__`
    /// finding. Zero disables the size check.
    #[serde(default)]
    pub max_response_size: usize,
    #[serde(default = "default_oversize_action")]
    pub oversize_action: ScanAction,
    #[serde(default = "default_true")]
    pub detect_secrets: bool,
    #[serde(default, rename = "detectPII")]
    pub detect_pii: bool,
    /// Action taken by the `large-base64-blob` exfiltration marker.
    #[serde(default = "default_base64_action")]
    pub base64_action: ScanAction,
    #[serde(default = "default_max_patterns")]
    pub max_patterns: usize,
    #[serde(default)]
    pub patterns: Vec<UserPattern>,
}

fn default_true() -> bool {
    true
}

fn default_oversize_action() -> ScanAction {
    ScanAction::Redact
}

fn default_base64_action() -> ScanAction {
    ScanAction::Pass
}

fn default_max_patterns() -> usize {
    defaults::MAX_USER_PATTERNS
}

impl Default for ResponseScanningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_response_size: 0,
            oversize_action: ScanAction::Redact,
            detect_secrets: true,
            detect_pii: false,
            base64_action: ScanAction::Pass,
            max_patterns: defaults::MAX_USER_PATTERNS,
            patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: Sensitivity,
    #[serde(default)]
    pub custom_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_tools: Vec<String>,
}

fn default_sensitivity() -> Sensitivity {
    Sensitivity::Medium
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sensitivity: Sensitivity::Medium,
            custom_patterns: Vec::new(),
            exclude_tools: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressConfig {
    #[serde(default)]
    pub enabled: bool,
    /// When non-empty, only these domains (and their subdomains) may be
    /// contacted.
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub blocked_domains: Vec<String>,
    #[serde(default = "default_true", rename = "blockPrivateIPs")]
    pub block_private_ips: bool,
    #[serde(default = "default_true")]
    pub block_metadata_endpoints: bool,
    #[serde(default)]
    pub exclude_tools: Vec<String>,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_domains: Vec::new(),
            blocked_domains: Vec::new(),
            block_private_ips: true,
            block_metadata_endpoints: true,
            exclude_tools: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillSwitchConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Poll watch directories for kill files.
    #[serde(default = "default_true")]
    pub check_file: bool,
    #[serde(default = "default_kill_file_names")]
    pub kill_file_names: Vec<String>,
    /// Directories scanned for kill files. Defaults to the working directory
    /// and the OS temp directory.
    #[serde(default = "default_watch_dirs")]
    pub watch_dirs: Vec<PathBuf>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_kill_file_names() -> Vec<String> {
    vec![".agent-wall-kill".to_string(), "AGENT_WALL_KILL".to_string()]
}

fn default_watch_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("."), std::env::temp_dir()]
}

fn default_poll_interval() -> u64 {
    defaults::KILL_POLL_INTERVAL_MS
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_file: true,
            kill_file_names: default_kill_file_names(),
            watch_dirs: default_watch_dirs(),
            poll_interval_ms: defaults::KILL_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomChain {
    pub name: String,
    pub severity: ChainSeverity,
    /// Ordered tool-name glob slots; alternatives joined by `|`.
    pub sequence: Vec<String>,
    #[serde(default)]
    pub track_arguments: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_chain_window_size")]
    pub window_size: usize,
    #[serde(default = "default_chain_window_ms")]
    pub window_ms: u64,
    #[serde(default)]
    pub custom_chains: Vec<CustomChain>,
}

fn default_chain_window_size() -> usize {
    defaults::CHAIN_WINDOW_SIZE
}

fn default_chain_window_ms() -> u64 {
    defaults::CHAIN_WINDOW_MS
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_size: defaults::CHAIN_WINDOW_SIZE,
            window_ms: defaults::CHAIN_WINDOW_MS,
            custom_chains: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    #[serde(default)]
    pub injection_detection: InjectionConfig,
    #[serde(default)]
    pub egress_control: EgressConfig,
    #[serde(default)]
    pub kill_switch: KillSwitchConfig,
    #[serde(default)]
    pub chain_detection: ChainConfig,
    /// HMAC-chain sign persisted audit entries.
    #[serde(default)]
    pub signing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,
}

/// The whole-firewall configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_mode")]
    pub mode: PolicyMode,
    #[serde(default = "default_action")]
    pub default_action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_rate_limit: Option<RateLimit>,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_scanning: Option<ResponseScanningConfig>,
    #[serde(default)]
    pub security: SecurityConfig,
}

fn default_version() -> u32 {
    1
}

fn default_mode() -> PolicyMode {
    PolicyMode::Standard
}

fn default_action() -> RuleAction {
    RuleAction::Prompt
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            version: 1,
            mode: PolicyMode::Standard,
            default_action: RuleAction::Prompt,
            global_rate_limit: None,
            rules: Vec::new(),
            response_scanning: None,
            security: SecurityConfig::default(),
        }
    }
}

impl PolicyConfig {
    /// Deserialize a snapshot from YAML text. Full schema validation is the
    /// CLI's job; this only rejects structurally invalid documents.
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// The policy shipped when no file is supplied: deny the classic
    /// credential paths, prompt for everything else, scan responses for
    /// secrets.
    pub fn default_policy() -> Self {
        let rule = |name: &str, pattern: &str, key: &str, value: &str, msg: &str| PolicyRule {
            name: name.to_string(),
            tool_pattern: pattern.to_string(),
            match_args: Some(RuleMatch {
                arguments: HashMap::from([(key.to_string(), value.to_string())]),
            }),
            action: RuleAction::Deny,
            message: Some(msg.to_string()),
            rate_limit: None,
        };

        Self {
            rules: vec![
                rule(
                    "block-ssh-keys",
                    "*",
                    "path",
                    "*/.ssh/*|*id_rsa*|*id_ed25519*|*id_ecdsa*",
                    "SSH private keys are off-limits",
                ),
                rule(
                    "block-env-files",
                    "*",
                    "path",
                    "*/.env|*/.env.*|.env|.env.*",
                    "Environment files may hold credentials",
                ),
                rule(
                    "block-cloud-credentials",
                    "*",
                    "path",
                    "*/.aws/*|*/.config/gcloud/*|*/.azure/*|*/.kube/config",
                    "Cloud credential stores are off-limits",
                ),
                rule(
                    "block-system-credentials",
                    "*",
                    "path",
                    "/etc/shadow|/etc/passwd|*/.gnupg/*|*/.netrc",
                    "System credential files are off-limits",
                ),
            ],
            response_scanning: Some(ResponseScanningConfig::default()),
            ..Self::default()
        }
    }

    /// Rule names SHOULD be unique; duplicates are warned, not rejected.
    pub fn warn_duplicate_rules(&self) {
        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.name.as_str()) {
                tracing::warn!(rule = %rule.name, "duplicate rule name in policy");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = PolicyConfig::default();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.mode, PolicyMode::Standard);
        assert_eq!(cfg.default_action, RuleAction::Prompt);
        assert!(cfg.rules.is_empty());
        assert!(!cfg.security.injection_detection.enabled);
    }

    #[test]
    fn yaml_camel_case_roundtrip() {
        let yaml = r#"
version: 2
mode: strict
defaultAction: deny
globalRateLimit:
  maxCalls: 10
  windowSeconds: 60
rules:
  - name: allow-reads
    toolPattern: "read_*|get_*"
    action: allow
  - name: deny-shell
    toolPattern: "shell_*"
    match:
      arguments:
        command: "*rm -rf*"
    action: deny
    message: destructive command
responseScanning:
  enabled: true
  maxResponseSize: 1048576
  detectPII: true
security:
  injectionDetection:
    enabled: true
    sensitivity: high
  egressControl:
    enabled: true
    blockedDomains: ["evil.com"]
  signing: true
  signingKey: "secret"
"#;
        let cfg = PolicyConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.version, 2);
        assert_eq!(cfg.mode, PolicyMode::Strict);
        assert_eq!(cfg.default_action, RuleAction::Deny);
        assert_eq!(cfg.global_rate_limit.unwrap().max_calls, 10);
        assert_eq!(cfg.rules.len(), 2);
        assert_eq!(cfg.rules[0].tool_pattern, "read_*|get_*");
        let m = cfg.rules[1].match_args.as_ref().unwrap();
        assert_eq!(m.arguments["command"], "*rm -rf*");
        let scan = cfg.response_scanning.unwrap();
        assert!(scan.detect_pii);
        assert_eq!(scan.max_response_size, 1_048_576);
        assert_eq!(
            cfg.security.injection_detection.sensitivity,
            Sensitivity::High
        );
        assert!(cfg.security.signing);
    }

    #[test]
    fn default_policy_has_credential_rules() {
        let cfg = PolicyConfig::default_policy();
        assert!(cfg.rules.iter().any(|r| r.name == "block-ssh-keys"));
        assert!(cfg.response_scanning.is_some());
    }

    #[test]
    fn minimal_yaml_uses_defaults() {
        let cfg = PolicyConfig::from_yaml_str("rules: []").unwrap();
        assert_eq!(cfg.default_action, RuleAction::Prompt);
        assert!(cfg.response_scanning.is_none());
    }
}

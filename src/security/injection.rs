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

//! Prompt-injection detector for tool-call arguments.
//!
//! A fixed pattern library across eight categories. Each pattern carries a
//! minimum sensitivity tier and a confidence; only patterns whose minimum
//! tier is at or below the configured sensitivity run. Low-confidence
//! matches are informational; the proxy blocks at medium and above.

use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::InjectionConfig;
use crate::engine_core::canonical::canonical_json;
use crate::engine_core::models::{Sensitivity, ToolCall};

pub const CAT_INSTRUCTION_OVERRIDE: &str = "instruction-override";
pub const CAT_PROMPT_MARKER: &str = "prompt-marker";
pub const CAT_AUTHORITY_CLAIM: &str = "authority-claim";
pub const CAT_EXFIL_INSTRUCTION: &str = "exfil-instruction";
pub const CAT_OUTPUT_MANIPULATION: &str = "output-manipulation";
pub const CAT_UNICODE_OBFUSCATION: &str = "unicode-obfuscation";
pub const CAT_ENCODED_INJECTION: &str = "encoded-injection";
pub const CAT_DELIMITER_INJECTION: &str = "delimiter-injection";

/// Values shorter than this are never scanned.
const MIN_VALUE_LEN: usize = 5;
/// Matched snippets are clipped to this many characters in reports.
const MAX_MATCH_SNIPPET: usize = 80;

struct InjectionPattern {
    name: &'static str,
    category: &'static str,
    regex: &'static str,
    /// Lowest configured sensitivity at which this pattern runs.
    min_sensitivity: Sensitivity,
    confidence: Sensitivity,
}

const fn pat(
    name: &'static str,
    category: &'static str,
    regex: &'static str,
    min_sensitivity: Sensitivity,
    confidence: Sensitivity,
) -> InjectionPattern {
    InjectionPattern {
        name,
        category,
        regex,
        min_sensitivity,
        confidence,
    }
}

const PATTERNS: &[InjectionPattern] = &[
    // --- instruction-override ---
    pat(
        "ignore-previous-instructions",
        CAT_INSTRUCTION_OVERRIDE,
        r"(?i)ignore\s+(?:all\s+)?(?:previous|prior|above|earlier)\s+(?:instructions?|prompts?|rules?|guidelines?|constraints?)",
        Sensitivity::Low,
        Sensitivity::High,
    ),
    pat(
        "forget-everything",
        CAT_INSTRUCTION_OVERRIDE,
        r"(?i)(?:forget|disregard|discard|abandon)\s+(?:everything|all|your|the)\b",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "new-instructions",
        CAT_INSTRUCTION_OVERRIDE,
        r"(?i)new\s+(?:instructions?|prompt|role|persona|behavior)\s*:",
        Sensitivity::Low,
        Sensitivity::High,
    ),
    pat(
        "override-instructions",
        CAT_INSTRUCTION_OVERRIDE,
        r"(?i)override\s+(?:your|the|my|all)\s+(?:instructions?|behavior|rules?|configuration|programming)",
        Sensitivity::Low,
        Sensitivity::High,
    ),
    pat(
        "do-not-follow-original",
        CAT_INSTRUCTION_OVERRIDE,
        r"(?i)do\s+not\s+follow\s+(?:your|the|any)\s+(?:original|previous|prior|initial)\s+(?:instructions?|rules?|guidelines?)",
        Sensitivity::Low,
        Sensitivity::High,
    ),
    pat(
        "identity-override",
        CAT_INSTRUCTION_OVERRIDE,
        r"(?i)you\s+are\s+(?:now|currently|actually|really)\s+",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "reveal-system-prompt",
        CAT_INSTRUCTION_OVERRIDE,
        r"(?i)(?:reveal|show|display|print|output|repeat)\s+(?:your|the)\s+(?:system\s+)?(?:prompt|instructions?)",
        Sensitivity::Medium,
        Sensitivity::High,
    ),
    // --- prompt-marker ---
    pat(
        "system-role-marker",
        CAT_PROMPT_MARKER,
        r"(?im)^\s*system\s*:",
        Sensitivity::Low,
        Sensitivity::High,
    ),
    pat(
        "assistant-role-marker",
        CAT_PROMPT_MARKER,
        r"(?im)^\s*assistant\s*:",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "user-role-marker",
        CAT_PROMPT_MARKER,
        r"(?im)^\s*user\s*:",
        Sensitivity::High,
        Sensitivity::Low,
    ),
    pat(
        "chatml-token",
        CAT_PROMPT_MARKER,
        r"<\|im_(?:start|end)\|>",
        Sensitivity::Low,
        Sensitivity::High,
    ),
    pat(
        "llama-inst-token",
        CAT_PROMPT_MARKER,
        r"\[/?INST\]|<<SYS>>",
        Sensitivity::Low,
        Sensitivity::High,
    ),
    // --- authority-claim ---
    pat(
        "developer-claim",
        CAT_AUTHORITY_CLAIM,
        r"(?i)i\s+am\s+(?:your|the)\s+(?:developer|creator|administrator|admin|operator)",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "admin-override-claim",
        CAT_AUTHORITY_CLAIM,
        r"(?i)(?:admin|administrator|root|sudo)\s+(?:mode|override|access)\s+(?:enabled|granted|activated)",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "provider-claim",
        CAT_AUTHORITY_CLAIM,
        r"(?i)(?:this\s+is|message\s+from)\s+(?:openai|anthropic|the\s+model\s+provider)",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "elevated-privileges",
        CAT_AUTHORITY_CLAIM,
        r"(?i)you\s+(?:now\s+)?have\s+(?:elevated|admin|root|unrestricted)\s+(?:privileges|permissions|access)",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    // --- exfil-instruction ---
    pat(
        "send-data-to",
        CAT_EXFIL_INSTRUCTION,
        r"(?i)(?:send|post|upload|transmit|forward)\s+(?:all\s+|the\s+)?(?:data|files?|secrets?|credentials?|keys?|contents?)\s+to\b",
        Sensitivity::Low,
        Sensitivity::High,
    ),
    pat(
        "exfiltrate-keyword",
        CAT_EXFIL_INSTRUCTION,
        r"(?i)\bexfiltrat(?:e|ion)\b",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "email-contents-to",
        CAT_EXFIL_INSTRUCTION,
        r"(?i)email\s+(?:the\s+|all\s+)?(?:contents?|data|results?)\s+to\b",
        Sensitivity::Medium,
        Sensitivity::High,
    ),
    pat(
        "curl-data-upload",
        CAT_EXFIL_INSTRUCTION,
        r"(?i)curl\s+(?:-[A-Za-z@\-]+\s+)*(?:-d|--data|--upload-file|-T)\b",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "dns-subshell",
        CAT_EXFIL_INSTRUCTION,
        r"(?i)(?:nslookup|dig)\s+[^\s]*\$\(",
        Sensitivity::High,
        Sensitivity::Medium,
    ),
    // --- output-manipulation ---
    pat(
        "respond-only-with",
        CAT_OUTPUT_MANIPULATION,
        r"(?i)(?:respond|reply|answer)\s+only\s+with\b",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "do-not-mention",
        CAT_OUTPUT_MANIPULATION,
        r"(?i)do\s+not\s+(?:mention|tell|reveal|disclose|report)\b",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "hide-this-from",
        CAT_OUTPUT_MANIPULATION,
        r"(?i)hide\s+this\s+(?:from|message|instruction)",
        Sensitivity::Medium,
        Sensitivity::High,
    ),
    pat(
        "without-telling-user",
        CAT_OUTPUT_MANIPULATION,
        r"(?i)without\s+(?:telling|informing|alerting|notifying)\s+(?:the\s+)?(?:user|human)",
        Sensitivity::Low,
        Sensitivity::High,
    ),
    // --- unicode-obfuscation ---
    pat(
        "zero-width-characters",
        CAT_UNICODE_OBFUSCATION,
        r"[\x{200B}\x{200C}\x{200D}\x{2060}\x{FEFF}]",
        Sensitivity::Low,
        Sensitivity::High,
    ),
    pat(
        "private-use-area",
        CAT_UNICODE_OBFUSCATION,
        r"[\x{E000}-\x{F8FF}]",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "bidi-override",
        CAT_UNICODE_OBFUSCATION,
        r"[\x{202A}-\x{202E}\x{2066}-\x{2069}]",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    // --- encoded-injection ---
    pat(
        "base64-ignore",
        CAT_ENCODED_INJECTION,
        // base64("ignore")
        r"aWdub3Jl",
        Sensitivity::Low,
        Sensitivity::High,
    ),
    pat(
        "base64-system",
        CAT_ENCODED_INJECTION,
        // base64("system")
        r"c3lzdGVt",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "hex-escape-run",
        CAT_ENCODED_INJECTION,
        r"(?:\\x[0-9a-fA-F]{2}){8,}",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "unicode-escape-run",
        CAT_ENCODED_INJECTION,
        r"(?:\\u[0-9a-fA-F]{4}){8,}",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    // --- delimiter-injection ---
    pat(
        "fake-system-delimiter",
        CAT_DELIMITER_INJECTION,
        r"(?i)(?:-{3,}|={3,}|\*{3,})\s*(?:system|instructions?|prompt)\s*[:\-]",
        Sensitivity::Low,
        Sensitivity::High,
    ),
    pat(
        "fenced-system-block",
        CAT_DELIMITER_INJECTION,
        r"(?i)```\s*(?:system|instructions?)\b",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "xml-system-tag",
        CAT_DELIMITER_INJECTION,
        r"(?i)</?(?:system|instructions?|admin)>",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
    pat(
        "end-of-prompt-marker",
        CAT_DELIMITER_INJECTION,
        r"(?i)end\s+of\s+(?:system\s+)?prompt",
        Sensitivity::Medium,
        Sensitivity::Medium,
    ),
];

/// Candidate spans worth a decode attempt in the base64 probe.
static BASE64_CANDIDATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/]{20,}={0,2}").expect("base64 candidate regex"));

static COMPILED: LazyLock<Vec<(&'static InjectionPattern, Regex)>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .map(|p| {
            let re = Regex::new(p.regex)
                .unwrap_or_else(|e| panic!("injection pattern '{}' failed to compile: {e}", p.name));
            (p, re)
        })
        .collect()
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionMatch {
    pub pattern: String,
    pub category: String,
    /// First match, clipped to 80 characters.
    pub matched: String,
    pub argument_key: String,
    pub confidence: Sensitivity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionReport {
    pub detected: bool,
    /// Highest confidence among the matches; `Low` when nothing matched.
    pub confidence: Sensitivity,
    pub matches: Vec<InjectionMatch>,
    pub summary: String,
}

pub struct InjectionDetector {
    sensitivity: Sensitivity,
    exclude_tools: Vec<String>,
    custom: Vec<(String, Regex)>,
}

impl InjectionDetector {
    pub fn new(config: &InjectionConfig) -> Self {
        let mut detector = Self {
            sensitivity: config.sensitivity,
            exclude_tools: Vec::new(),
            custom: Vec::new(),
        };
        detector.update_config(config);
        detector
    }

    pub fn update_config(&mut self, config: &InjectionConfig) {
        self.sensitivity = config.sensitivity;
        self.exclude_tools = config.exclude_tools.clone();
        self.custom = config
            .custom_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some((pattern.clone(), re)),
                Err(e) => {
                    tracing::warn!(%pattern, error = %e, "invalid custom injection pattern");
                    None
                }
            })
            .collect();
    }

    /// Scan every argument value of a tool call.
    pub fn scan(&self, call: &ToolCall) -> InjectionReport {
        if self.exclude_tools.iter().any(|t| t == &call.name) {
            return InjectionReport {
                detected: false,
                confidence: Sensitivity::Low,
                matches: Vec::new(),
                summary: format!("tool '{}' excluded from injection scanning", call.name),
            };
        }

        let mut matches = Vec::new();
        for (key, value) in &call.arguments {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => canonical_json(other),
            };
            if text.chars().count() < MIN_VALUE_LEN {
                continue;
            }

            for (p, re) in COMPILED.iter() {
                if p.min_sensitivity > self.sensitivity {
                    continue;
                }
                if let Some(m) = re.find(&text) {
                    matches.push(InjectionMatch {
                        pattern: p.name.to_string(),
                        category: p.category.to_string(),
                        matched: clip(m.as_str()),
                        argument_key: key.clone(),
                        confidence: p.confidence,
                    });
                }
            }

            for (pattern, re) in &self.custom {
                if let Some(m) = re.find(&text) {
                    matches.push(InjectionMatch {
                        pattern: pattern.clone(),
                        category: "custom".to_string(),
                        matched: clip(m.as_str()),
                        argument_key: key.clone(),
                        confidence: Sensitivity::High,
                    });
                }
            }

            if let Some(candidate) = decoded_injection_candidate(&text) {
                matches.push(InjectionMatch {
                    pattern: "base64-decoded-instructions".to_string(),
                    category: CAT_ENCODED_INJECTION.to_string(),
                    matched: clip(&candidate),
                    argument_key: key.clone(),
                    confidence: Sensitivity::High,
                });
            }
        }

        let confidence = matches
            .iter()
            .map(|m| m.confidence)
            .max()
            .unwrap_or(Sensitivity::Low);
        let detected = !matches.is_empty();
        let summary = if detected {
            let mut categories: Vec<&str> = matches.iter().map(|m| m.category.as_str()).collect();
            categories.sort_unstable();
            categories.dedup();
            format!(
                "{} injection indicator(s) in categories: {}",
                matches.len(),
                categories.join(", ")
            )
        } else {
            "no injection indicators".to_string()
        };

        InjectionReport {
            detected,
            confidence,
            matches,
            summary,
        }
    }
}

fn clip(s: &str) -> String {
    s.chars().take(MAX_MATCH_SNIPPET).collect()
}

/// Decode base64 candidates and return the first whose cleartext carries
/// instruction-like phrases.
fn decoded_injection_candidate(text: &str) -> Option<String> {
    BASE64_CANDIDATE_RE.find_iter(text).find_map(|m| {
        let decoded = BASE64_STANDARD.decode(m.as_str()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let lower = decoded.to_lowercase();
        ["ignore previous", "ignore all", "new instructions", "system prompt"]
            .iter()
            .any(|phrase| lower.contains(phrase))
            .then_some(decoded)
    })
}

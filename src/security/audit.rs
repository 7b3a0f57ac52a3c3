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

//! Tamper-evident audit log.
//!
//! One JSON object per line, arguments redacted before persisting. With
//! signing enabled each persisted line carries `_seq` and `_sig`, where
//! `_sig = HMAC-SHA-256(key, canonical_json(entry) + "|" + prev_sig)` and
//! the first link chains from the literal `"genesis"`. The signing fields
//! are serialized outside the canonical form they sign. Rotation is
//! size-based: `<path>.1` is the most recent rotated file.
//!
//! All file I/O is best-effort: audit failures are logged, never fatal.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use hmac::{Hmac, Mac};
use regex::Regex;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tracing::error;

use crate::engine_core::canonical::canonical_json;
use crate::engine_core::constants::defaults;
use crate::engine_core::models::{RuleAction, Verdict};
use crate::utils::time;

type HmacSha256 = Hmac<Sha256>;

const GENESIS: &str = "genesis";
const SEQ_FIELD: &str = "_seq";
const SIG_FIELD: &str = "_sig";
const REDACTED: &str = "[REDACTED]";
const TRUNCATED_SUFFIX: &str = "...[truncated]";

static SENSITIVE_KEYS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)password",
        r"(?i)secret",
        r"(?i)token",
        r"(?i)api[_-]?key",
        r"(?i)auth",
        r"(?i)credential",
        r"(?i)private[_-]?key",
        r"(?i)access[_-]?key",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("sensitive key regex"))
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: f64,
    pub session_id: String,
    pub direction: Direction,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEntry {
    pub fn request(session_id: &str, method: &str) -> Self {
        Self {
            timestamp: time::now(),
            session_id: session_id.to_string(),
            direction: Direction::Request,
            method: method.to_string(),
            tool: None,
            arguments: None,
            verdict: None,
            response_preview: None,
            latency_ms: None,
            error: None,
        }
    }

    pub fn response(session_id: &str, method: &str) -> Self {
        Self {
            direction: Direction::Response,
            ..Self::request(session_id, method)
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditOptions {
    pub file_path: Option<PathBuf>,
    /// Mirror each persisted line to stderr.
    pub mirror_stderr: bool,
    pub redact_arguments: bool,
    pub max_arg_length: usize,
    /// Rotate when the current file crosses this many bytes. Zero disables
    /// rotation.
    pub max_file_size: u64,
    pub max_files: usize,
    pub signing: bool,
    pub signing_key: Option<String>,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            file_path: None,
            mirror_stderr: false,
            redact_arguments: true,
            max_arg_length: defaults::MAX_AUDIT_ARG_LEN,
            max_file_size: 0,
            max_files: 5,
            signing: false,
            signing_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: u64,
    pub allowed: u64,
    pub denied: u64,
    pub prompted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    /// Signed entries examined.
    pub entries: u64,
    /// `_seq` of the first entry whose signature failed to verify.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_broken: Option<u64>,
}

type OnEntry = Box<dyn Fn(&AuditEntry) + Send + Sync>;

pub struct AuditLog {
    options: AuditOptions,
    file: Option<File>,
    bytes_written: u64,
    entries: Vec<AuditEntry>,
    seq: u64,
    prev_sig: String,
    key: Option<Vec<u8>>,
    on_entry: Option<OnEntry>,
}

impl AuditLog {
    pub fn new(options: AuditOptions) -> Self {
        let file = options.file_path.as_ref().and_then(|path| open_log(path));
        let bytes_written = file
            .as_ref()
            .and_then(|f| f.metadata().ok())
            .map(|m| m.len())
            .unwrap_or(0);

        let key = if options.signing {
            Some(match &options.signing_key {
                Some(k) => k.as_bytes().to_vec(),
                // No configured key: sign with an ephemeral one so the chain
                // is still internally consistent for this process run.
                None => {
                    let mut buf = vec![0u8; 32];
                    if SystemRandom::new().fill(&mut buf).is_err() {
                        error!("failed to generate ephemeral signing key");
                    }
                    buf
                }
            })
        } else {
            None
        };

        Self {
            options,
            file,
            bytes_written,
            entries: Vec::new(),
            seq: 0,
            prev_sig: GENESIS.to_string(),
            key,
            on_entry: None,
        }
    }

    /// Register the dashboard-bridge callback, fired for every entry.
    pub fn set_on_entry(&mut self, callback: OnEntry) {
        self.on_entry = Some(callback);
    }

    pub fn log(&mut self, mut entry: AuditEntry) {
        if self.options.redact_arguments {
            if let Some(args) = entry.arguments.as_mut() {
                redact_value(args, self.options.max_arg_length);
            }
        }

        let Ok(mut persisted) = serde_json::to_value(&entry) else {
            error!("failed to serialize audit entry");
            return;
        };

        if let Some(key) = &self.key {
            self.seq += 1;
            let payload = format!("{}|{}", canonical_json(&persisted), self.prev_sig);
            let sig = hmac_hex(key, payload.as_bytes());
            if let Some(obj) = persisted.as_object_mut() {
                obj.insert(SEQ_FIELD.to_string(), Value::from(self.seq));
                obj.insert(SIG_FIELD.to_string(), Value::from(sig.clone()));
            }
            self.prev_sig = sig;
        }

        let line = serde_json::to_string(&persisted).unwrap_or_default();
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = writeln!(file, "{}", line) {
                error!(error = %e, "failed to write audit entry");
            } else {
                self.bytes_written += line.len() as u64 + 1;
            }
        }
        if self.options.mirror_stderr {
            eprintln!("{}", line);
        }

        self.maybe_rotate();

        if let Some(callback) = &self.on_entry {
            callback(&entry);
        }
        self.entries.push(entry);
    }

    /// Entries written during this process run, redacted form.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn stats(&self) -> AuditStats {
        let mut stats = AuditStats {
            total: self.entries.len() as u64,
            ..AuditStats::default()
        };
        for entry in &self.entries {
            match entry.verdict.as_ref().map(|v| v.action) {
                Some(RuleAction::Allow) => stats.allowed += 1,
                Some(RuleAction::Deny) => stats.denied += 1,
                Some(RuleAction::Prompt) => stats.prompted += 1,
                None => {}
            }
        }
        stats
    }

    pub fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }
    }

    fn maybe_rotate(&mut self) {
        if self.options.max_file_size == 0 || self.bytes_written < self.options.max_file_size {
            return;
        }
        let Some(path) = self.options.file_path.clone() else {
            return;
        };

        self.close();

        let numbered = |k: usize| PathBuf::from(format!("{}.{}", path.display(), k));
        let _ = std::fs::remove_file(numbered(self.options.max_files));
        for k in (1..self.options.max_files).rev() {
            let _ = std::fs::rename(numbered(k), numbered(k + 1));
        }
        if let Err(e) = std::fs::rename(&path, numbered(1)) {
            error!(error = %e, "audit rotation rename failed");
        }

        self.file = open_log(&path);
        self.bytes_written = 0;
    }

    /// Walk a signed audit file and recompute the HMAC chain.
    pub fn verify_chain(path: &Path, key: &[u8]) -> std::io::Result<ChainVerification> {
        let reader = BufReader::new(File::open(path)?);
        let mut prev = GENESIS.to_string();
        let mut entries = 0u64;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let Ok(mut value) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            let Some(obj) = value.as_object_mut() else {
                continue;
            };
            let Some(stored_sig) = obj.remove(SIG_FIELD).and_then(|v| v.as_str().map(String::from))
            else {
                continue;
            };
            let seq = obj
                .remove(SEQ_FIELD)
                .and_then(|v| v.as_u64())
                .unwrap_or(entries + 1);
            entries += 1;

            let payload = format!("{}|{}", canonical_json(&value), prev);
            let expected = hmac_hex(key, payload.as_bytes());
            if expected != stored_sig {
                return Ok(ChainVerification {
                    valid: false,
                    entries,
                    first_broken: Some(seq),
                });
            }
            prev = stored_sig;
        }

        Ok(ChainVerification {
            valid: true,
            entries,
            first_broken: None,
        })
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_log(path: &Path) -> Option<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| error!(path = %path.display(), error = %e, "failed to open audit log"))
        .ok()
}

fn hmac_hex(key: &[u8], payload: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Redact sensitive keys and truncate long strings, recursively.
fn redact_value(value: &mut Value, max_len: usize) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if SENSITIVE_KEYS.iter().any(|re| re.is_match(key)) {
                    *v = Value::from(REDACTED);
                } else {
                    redact_value(v, max_len);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_value(item, max_len);
            }
        }
        Value::String(s) => {
            if s.chars().count() > max_len {
                let mut clipped: String = s.chars().take(max_len).collect();
                clipped.push_str(TRUNCATED_SUFFIX);
                *s = clipped;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry_with_args(args: Value, action: RuleAction) -> AuditEntry {
        AuditEntry {
            tool: Some("read_file".to_string()),
            arguments: Some(args),
            verdict: Some(Verdict {
                action,
                rule: Some("r".to_string()),
                message: "m".to_string(),
            }),
            ..AuditEntry::request("session", "tools/call")
        }
    }

    #[test]
    fn sensitive_keys_redacted() {
        let mut log = AuditLog::new(AuditOptions::default());
        log.log(entry_with_args(
            json!({"path": "/tmp/x", "api_key": "abc123", "nested": {"Password": "hunter2"}}),
            RuleAction::Allow,
        ));
        let args = log.entries()[0].arguments.as_ref().unwrap();
        assert_eq!(args["path"], json!("/tmp/x"));
        assert_eq!(args["api_key"], json!(REDACTED));
        assert_eq!(args["nested"]["Password"], json!(REDACTED));
    }

    #[test]
    fn long_values_truncated() {
        let mut log = AuditLog::new(AuditOptions {
            max_arg_length: 10,
            ..AuditOptions::default()
        });
        log.log(entry_with_args(
            json!({"content": "abcdefghijklmnop"}),
            RuleAction::Allow,
        ));
        let content = log.entries()[0].arguments.as_ref().unwrap()["content"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(content.starts_with("abcdefghij"));
        assert!(content.ends_with(TRUNCATED_SUFFIX));
    }

    #[test]
    fn stats_count_verdicts() {
        let mut log = AuditLog::new(AuditOptions::default());
        log.log(entry_with_args(json!({}), RuleAction::Allow));
        log.log(entry_with_args(json!({}), RuleAction::Deny));
        log.log(entry_with_args(json!({}), RuleAction::Deny));
        log.log(entry_with_args(json!({}), RuleAction::Prompt));
        let stats = log.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.allowed, 1);
        assert_eq!(stats.denied, 2);
        assert_eq!(stats.prompted, 1);
    }

    #[test]
    fn on_entry_callback_fires() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut log = AuditLog::new(AuditOptions::default());
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        log.set_on_entry(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        log.log(entry_with_args(json!({}), RuleAction::Allow));
        log.log(entry_with_args(json!({}), RuleAction::Deny));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn signed_chain_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut log = AuditLog::new(AuditOptions {
            file_path: Some(path.clone()),
            signing: true,
            signing_key: Some("test-key".to_string()),
            ..AuditOptions::default()
        });
        for _ in 0..5 {
            log.log(entry_with_args(json!({"path": "/tmp/a"}), RuleAction::Allow));
        }
        log.close();

        let result = AuditLog::verify_chain(&path, b"test-key").unwrap();
        assert!(result.valid);
        assert_eq!(result.entries, 5);
        assert!(result.first_broken.is_none());
    }

    #[test]
    fn tampered_entry_breaks_chain_at_its_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut log = AuditLog::new(AuditOptions {
            file_path: Some(path.clone()),
            signing: true,
            signing_key: Some("test-key".to_string()),
            ..AuditOptions::default()
        });
        for i in 0..5 {
            log.log(entry_with_args(json!({"n": i}), RuleAction::Allow));
        }
        log.close();

        // Tamper with the entry at index 2 (sequence 3).
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = text.lines().map(String::from).collect();
        lines[2] = lines[2].replace("\"n\":2", "\"n\":99");
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let result = AuditLog::verify_chain(&path, b"test-key").unwrap();
        assert!(!result.valid);
        assert_eq!(result.first_broken, Some(3));
    }

    #[test]
    fn wrong_key_fails_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut log = AuditLog::new(AuditOptions {
            file_path: Some(path.clone()),
            signing: true,
            signing_key: Some("right-key".to_string()),
            ..AuditOptions::default()
        });
        log.log(entry_with_args(json!({}), RuleAction::Allow));
        log.close();

        let result = AuditLog::verify_chain(&path, b"wrong-key").unwrap();
        assert!(!result.valid);
        assert_eq!(result.first_broken, Some(1));
    }

    #[test]
    fn signature_fields_have_expected_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut log = AuditLog::new(AuditOptions {
            file_path: Some(path.clone()),
            signing: true,
            signing_key: Some("k".to_string()),
            ..AuditOptions::default()
        });
        log.log(entry_with_args(json!({}), RuleAction::Allow));
        log.close();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(value[SEQ_FIELD], json!(1));
        let sig = value[SIG_FIELD].as_str().unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn rotation_shifts_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut log = AuditLog::new(AuditOptions {
            file_path: Some(path.clone()),
            max_file_size: 200,
            max_files: 2,
            ..AuditOptions::default()
        });
        // Each entry is well over 100 bytes serialized.
        for i in 0..6 {
            log.log(entry_with_args(json!({"n": i}), RuleAction::Allow));
        }
        log.close();

        let rotated1 = PathBuf::from(format!("{}.1", path.display()));
        let rotated2 = PathBuf::from(format!("{}.2", path.display()));
        assert!(rotated1.exists());
        assert!(rotated2.exists());
        let rotated3 = PathBuf::from(format!("{}.3", path.display()));
        assert!(!rotated3.exists());
    }

    #[test]
    fn unsigned_log_has_no_signature_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut log = AuditLog::new(AuditOptions {
            file_path: Some(path.clone()),
            ..AuditOptions::default()
        });
        log.log(entry_with_args(json!({}), RuleAction::Allow));
        log.close();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains(SIG_FIELD));
        assert!(!text.contains(SEQ_FIELD));
    }
}

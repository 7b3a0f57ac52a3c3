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

//! Pattern matching for policy rules.
//!
//! Tool names and argument values are matched against glob-like patterns
//! with `|`-joined alternatives. Argument lookup resolves key aliases
//! (`path` vs `file` vs `filepath`...), and values are NFC-normalized and
//! path-normalized before matching so traversal tricks (`/tmp/../../etc`)
//! cannot slip past a rule.

use glob::{MatchOptions, Pattern};
use regex::RegexBuilder;
use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;

use crate::engine_core::constants::limits;

/// Alias groups: any key in a group resolves through every member of the
/// group, in declaration order.
const ALIAS_GROUPS: &[&[&str]] = &[
    &[
        "path", "file", "filepath", "file_path", "filename", "file_name", "target", "source",
        "destination", "dest", "src", "uri", "url",
    ],
    &["command", "cmd", "shell", "exec", "script", "run"],
    &["content", "text", "body", "data", "input", "message"],
];

/// Wildcard cap for the glob-to-regex translator.
const MAX_TRANSLATED_WILDCARDS: usize = 64;

fn glob_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        // Dotfile-aware: `*` may match a leading dot.
        require_literal_leading_dot: false,
    }
}

fn nfc(s: &str) -> String {
    s.nfc().collect()
}

/// Match a tool name against a rule pattern. Alternatives are `|`-joined;
/// each alternative is glob-matched case-insensitively against the
/// NFC-normalized name.
pub fn tool_matches(pattern: &str, tool_name: &str) -> bool {
    let name = nfc(tool_name);
    pattern.split('|').any(|alt| {
        let alt = nfc(alt.trim());
        match Pattern::new(&alt) {
            Ok(p) => p.matches_with(&name, glob_options()),
            // An unparsable glob degrades to a literal comparison.
            Err(_) => alt.eq_ignore_ascii_case(&name),
        }
    })
}

/// Look up an argument value by rule key: exact match first, then
/// case-insensitive, then the alias table.
pub fn lookup_argument<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(v) = args.get(key) {
        return Some(v);
    }

    let lower = key.to_lowercase();
    if let Some((_, v)) = args.iter().find(|(k, _)| k.to_lowercase() == lower) {
        return Some(v);
    }

    let group = ALIAS_GROUPS
        .iter()
        .find(|group| group.iter().any(|alias| *alias == lower))?;
    for alias in group.iter().filter(|alias| **alias != lower) {
        if let Some((_, v)) = args.iter().find(|(k, _)| k.to_lowercase() == **alias) {
            return Some(v);
        }
    }
    None
}

/// Stringify and normalize an argument value for matching: NFC first, then
/// lexical path normalization when the value looks path-like.
pub fn normalize_value(value: &Value) -> String {
    let s = match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    };
    let s = nfc(&s);
    if looks_path_like(&s) {
        normalize_path(&s)
    } else {
        s
    }
}

fn looks_path_like(s: &str) -> bool {
    s.contains('/') || s.contains('\\') || s.starts_with('.') || s.starts_with('~')
}

/// Lexical path normalization: backslashes become slashes, `.` segments are
/// dropped, `..` pops the previous segment (never above the root).
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Match a normalized argument value against a rule pattern. Each
/// `|`-alternative succeeds on glob match, on a bounded glob-to-regex match,
/// or (for wildcard-free alternatives) on case-insensitive substring.
pub fn value_matches(pattern: &str, value: &str) -> bool {
    pattern.split('|').any(|alt| {
        let alt = alt.trim();
        if alt.is_empty() {
            return false;
        }

        if let Ok(p) = Pattern::new(alt) {
            if p.matches_with(value, glob_options()) {
                return true;
            }
        }

        if let Some(re) = glob_to_regex(alt) {
            if re.is_match(value) {
                return true;
            }
        }

        if !alt.contains('*') && !alt.contains('?') {
            return value.to_lowercase().contains(&alt.to_lowercase());
        }

        false
    })
}

/// Argument predicate for a single `(key, pattern)` rule pair.
pub fn argument_matches(args: &Map<String, Value>, key: &str, pattern: &str) -> bool {
    match lookup_argument(args, key) {
        Some(value) => value_matches(pattern, &normalize_value(value)),
        None => false,
    }
}

/// Translate a glob into an anchored case-insensitive regex. Patterns longer
/// than the translator's cap, or with too many wildcards, are rejected.
fn glob_to_regex(glob: &str) -> Option<regex::Regex> {
    if glob.len() > limits::MAX_GLOB_PATTERN_LEN {
        return None;
    }
    let wildcards = glob.chars().filter(|c| *c == '*' || *c == '?').count();
    if wildcards > MAX_TRANSLATED_WILDCARDS {
        return None;
    }

    let mut re = String::with_capacity(glob.len() + 8);
    re.push('^');
    for c in glob.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');

    RegexBuilder::new(&re)
        .case_insensitive(true)
        .build()
        .ok()
}

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

//! Egress control.
//!
//! Extracts URLs from tool-call arguments and blocks destinations that are
//! private, obfuscated, cloud-metadata endpoints, or outside the configured
//! domain lists. Fail-closed: a URL that cannot be evaluated is blocked.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::config::EgressConfig;
use crate::engine_core::canonical::canonical_json;
use crate::engine_core::models::ToolCall;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s"'<>\])}]+"#).expect("url regex")
});

static OBFUSCATED_HEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^0x[0-9a-f]+$").expect("hex host regex"));
static OBFUSCATED_DECIMAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8,}$").expect("decimal host regex"));

const METADATA_HOSTS: &[&str] = &[
    "169.254.169.254",
    "metadata.google.internal",
    "metadata.goog",
    "100.100.100.200",
    "169.254.170.2",
];

const METADATA_PATHS: &[&str] = &["/latest/meta-data", "/metadata/instance"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedUrl {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressReport {
    pub allowed: bool,
    pub urls_found: Vec<String>,
    pub blocked: Vec<BlockedUrl>,
    pub summary: String,
}

pub struct EgressControl {
    config: EgressConfig,
}

impl EgressControl {
    pub fn new(config: &EgressConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn update_config(&mut self, config: &EgressConfig) {
        self.config = config.clone();
    }

    pub fn check(&self, call: &ToolCall) -> EgressReport {
        if self.config.exclude_tools.iter().any(|t| t == &call.name) {
            return EgressReport {
                allowed: true,
                urls_found: Vec::new(),
                blocked: Vec::new(),
                summary: format!("tool '{}' excluded from egress control", call.name),
            };
        }

        let urls = extract_urls(call);
        let mut blocked = Vec::new();
        for url in &urls {
            if let Some(reason) = self.decide(url) {
                blocked.push(BlockedUrl {
                    url: url.clone(),
                    reason,
                });
            }
        }

        let summary = if blocked.is_empty() {
            format!("{} URL(s), none blocked", urls.len())
        } else {
            format!("{} URL(s), {} blocked", urls.len(), blocked.len())
        };
        EgressReport {
            allowed: blocked.is_empty(),
            urls_found: urls,
            blocked,
            summary,
        }
    }

    /// `None` when the URL may pass; otherwise the block reason.
    fn decide(&self, raw: &str) -> Option<String> {
        // The raw authority is inspected before WHATWG parsing normalizes
        // obfuscated hosts (0x7f000001 parses to 127.0.0.1).
        let raw_host = raw_authority_host(raw);

        let Ok(url) = Url::parse(raw) else {
            return Some("URL could not be parsed".to_string());
        };
        let host = match url.host() {
            Some(h) => h,
            None => return Some("URL has no host".to_string()),
        };
        let hostname = match &host {
            Host::Domain(d) => d.to_lowercase(),
            Host::Ipv4(a) => a.to_string(),
            Host::Ipv6(a) => a.to_string(),
        };

        if !self.config.allowed_domains.is_empty()
            && !self
                .config
                .allowed_domains
                .iter()
                .any(|d| domain_matches(&hostname, d))
        {
            return Some(format!("'{}' is not an allowed domain", hostname));
        }

        if self
            .config
            .blocked_domains
            .iter()
            .any(|d| domain_matches(&hostname, d))
        {
            return Some(format!("'{}' is a blocked domain", hostname));
        }

        if let Some(raw_host) = &raw_host {
            if OBFUSCATED_HEX_RE.is_match(raw_host) || OBFUSCATED_DECIMAL_RE.is_match(raw_host) {
                return Some(format!("obfuscated IP address '{}'", raw_host));
            }
        }

        if self.config.block_metadata_endpoints {
            if METADATA_HOSTS.contains(&hostname.as_str()) {
                return Some(format!("cloud metadata endpoint '{}'", hostname));
            }
            let path = url.path();
            if METADATA_PATHS.iter().any(|p| path.contains(p)) {
                return Some("cloud metadata path".to_string());
            }
        }

        if self.config.block_private_ips {
            match host {
                Host::Ipv4(addr) => {
                    if is_private_ipv4(addr) {
                        return Some(format!("private IPv4 address '{}'", addr));
                    }
                }
                Host::Ipv6(addr) => {
                    if is_private_ipv6(addr) {
                        return Some(format!("private IPv6 address '{}'", addr));
                    }
                }
                Host::Domain(_) => {
                    if hostname == "localhost" || hostname == "ip6-localhost" {
                        return Some(format!("loopback hostname '{}'", hostname));
                    }
                }
            }
        }

        None
    }
}

/// Extract and deduplicate URLs from every argument value, order preserved.
fn extract_urls(call: &ToolCall) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut urls = Vec::new();
    for value in call.arguments.values() {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => canonical_json(other),
        };
        for m in URL_RE.find_iter(&text) {
            let url = m.as_str().to_string();
            if seen.insert(url.clone()) {
                urls.push(url);
            }
        }
    }
    urls
}

/// The authority host exactly as written: after `://`, before path/query,
/// userinfo and port stripped. Bracketed IPv6 keeps its brackets off.
fn raw_authority_host(raw: &str) -> Option<String> {
    let rest = raw.split("://").nth(1)?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;
    let host = if let Some(stripped) = host_port.strip_prefix('[') {
        stripped.split(']').next()?
    } else {
        host_port.split(':').next()?
    };
    Some(host.to_lowercase())
}

fn domain_matches(hostname: &str, domain: &str) -> bool {
    let domain = domain.to_lowercase();
    hostname == domain || hostname.ends_with(&format!(".{}", domain))
}

fn is_private_ipv4(addr: Ipv4Addr) -> bool {
    let o = addr.octets();
    o[0] == 10
        || (o[0] == 172 && (16..=31).contains(&o[1]))
        || (o[0] == 192 && o[1] == 168)
        || o[0] == 127
        || (o[0] == 169 && o[1] == 254)
        || addr == Ipv4Addr::UNSPECIFIED
}

fn is_private_ipv6(addr: Ipv6Addr) -> bool {
    let seg = addr.segments();
    addr == Ipv6Addr::LOCALHOST
        || (seg[0] & 0xffc0) == 0xfe80
        || (seg[0] & 0xfe00) == 0xfc00
}

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

//! Dashboard bridge.
//!
//! Subscribes to proxy events and audit entries, keeps a running rule-hit
//! tally plus an uptime counter, and fans everything out to connected
//! observers. The transport that carries [`BridgeMessage`]s to a browser is
//! an external collaborator; everything here is deterministic and runs
//! without a network.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::PolicyConfig;
use crate::engine_core::constants::defaults;
use crate::engine_core::events::{EventSink, ProxyEvent};
use crate::security::audit::AuditEntry;
use crate::security::killswitch::{KillStatus, KillSwitch};

/// How many recent audit entries the bridge retains for queries.
const AUDIT_RING_CAPACITY: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BridgeMessage {
    Event(ProxyEvent),
    Audit(AuditEntry),
    Stats(BridgeStats),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStats {
    pub uptime_seconds: u64,
    /// Event counts keyed by event kind.
    pub events: BTreeMap<String, u64>,
    /// Hit counts keyed by rule name; verdicts with no rule land under
    /// `(default)`.
    pub rule_hits: BTreeMap<String, u64>,
    pub audit_entries_seen: u64,
}

/// Queries observers may issue against the bridge.
#[derive(Debug, Clone)]
pub enum BridgeQuery {
    ToggleKillSwitch,
    GetStats,
    GetConfig,
    GetAuditEntries { limit: usize },
}

#[derive(Debug, Clone)]
pub enum BridgeReply {
    KillSwitch(KillStatus),
    Stats(BridgeStats),
    Config(Option<Arc<PolicyConfig>>),
    AuditEntries(Vec<AuditEntry>),
}

#[derive(Default)]
struct BridgeState {
    events: BTreeMap<String, u64>,
    rule_hits: BTreeMap<String, u64>,
    audit_seen: u64,
    recent_audit: VecDeque<AuditEntry>,
    observers: Vec<mpsc::UnboundedSender<BridgeMessage>>,
    config: Option<Arc<PolicyConfig>>,
}

pub struct DashboardBridge {
    state: Mutex<BridgeState>,
    started_at: Instant,
    kill: Option<Arc<KillSwitch>>,
}

impl DashboardBridge {
    pub fn new(kill: Option<Arc<KillSwitch>>) -> Self {
        Self {
            state: Mutex::new(BridgeState::default()),
            started_at: Instant::now(),
            kill,
        }
    }

    /// Record the configuration snapshot served to `GetConfig`.
    pub fn set_config(&self, config: Arc<PolicyConfig>) {
        self.lock().config = Some(config);
    }

    /// Register an observer; it receives every event, audit entry, and
    /// stats snapshot from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<BridgeMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().observers.push(tx);
        rx
    }

    /// Feed for the audit log's `set_on_entry` callback.
    pub fn on_audit_entry(&self, entry: &AuditEntry) {
        let mut state = self.lock();
        state.audit_seen += 1;
        if state.recent_audit.len() == AUDIT_RING_CAPACITY {
            state.recent_audit.pop_front();
        }
        state.recent_audit.push_back(entry.clone());
        Self::broadcast(&mut state, BridgeMessage::Audit(entry.clone()));
    }

    pub fn stats(&self) -> BridgeStats {
        let state = self.lock();
        BridgeStats {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            events: state.events.clone(),
            rule_hits: state.rule_hits.clone(),
            audit_entries_seen: state.audit_seen,
        }
    }

    /// Push a stats snapshot to every observer. The periodic publisher calls
    /// this on its ticker; tests call it directly.
    pub fn publish_stats(&self) {
        let snapshot = self.stats();
        let mut state = self.lock();
        Self::broadcast(&mut state, BridgeMessage::Stats(snapshot));
    }

    /// Start the periodic stats publisher (2 s by default).
    pub fn spawn_publisher(self: Arc<Self>, interval: Option<Duration>) -> JoinHandle<()> {
        let bridge = self;
        let period = interval
            .unwrap_or_else(|| Duration::from_millis(defaults::BRIDGE_STATS_INTERVAL_MS));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                bridge.publish_stats();
            }
        })
    }

    pub fn handle_query(&self, query: BridgeQuery) -> BridgeReply {
        match query {
            BridgeQuery::ToggleKillSwitch => {
                let status = match &self.kill {
                    Some(kill) => {
                        if kill.is_active() {
                            kill.deactivate();
                        } else {
                            kill.activate(Some("dashboard toggle".to_string()));
                        }
                        kill.status()
                    }
                    None => KillStatus {
                        active: false,
                        reason: None,
                        activated_at: None,
                    },
                };
                BridgeReply::KillSwitch(status)
            }
            BridgeQuery::GetStats => BridgeReply::Stats(self.stats()),
            BridgeQuery::GetConfig => BridgeReply::Config(self.lock().config.clone()),
            BridgeQuery::GetAuditEntries { limit } => {
                let state = self.lock();
                let entries = state
                    .recent_audit
                    .iter()
                    .rev()
                    .take(limit)
                    .cloned()
                    .collect();
                BridgeReply::AuditEntries(entries)
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn broadcast(state: &mut BridgeState, message: BridgeMessage) {
        state
            .observers
            .retain(|observer| observer.send(message.clone()).is_ok());
    }

    fn event_kind(event: &ProxyEvent) -> &'static str {
        match event {
            ProxyEvent::Allowed { .. } => "allowed",
            ProxyEvent::Denied { .. } => "denied",
            ProxyEvent::Prompted { .. } => "prompted",
            ProxyEvent::ResponseBlocked { .. } => "responseBlocked",
            ProxyEvent::ResponseRedacted { .. } => "responseRedacted",
            ProxyEvent::InjectionDetected { .. } => "injectionDetected",
            ProxyEvent::EgressBlocked { .. } => "egressBlocked",
            ProxyEvent::KillSwitchActive { .. } => "killSwitchActive",
            ProxyEvent::ChainDetected { .. } => "chainDetected",
            ProxyEvent::EngineError { .. } => "engineError",
            ProxyEvent::ChildExited { .. } => "childExited",
        }
    }
}

impl EventSink for DashboardBridge {
    fn on_event(&self, event: &ProxyEvent) {
        let mut state = self.lock();
        *state
            .events
            .entry(Self::event_kind(event).to_string())
            .or_default() += 1;

        let rule = match event {
            ProxyEvent::Allowed { rule, .. } | ProxyEvent::Denied { rule, .. } => {
                Some(rule.clone().unwrap_or_else(|| "(default)".to_string()))
            }
            _ => None,
        };
        if let Some(rule) = rule {
            *state.rule_hits.entry(rule).or_default() += 1;
        }

        Self::broadcast(&mut state, BridgeMessage::Event(event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::audit::Direction;

    fn allowed(rule: Option<&str>) -> ProxyEvent {
        ProxyEvent::Allowed {
            tool: "read_file".to_string(),
            rule: rule.map(String::from),
        }
    }

    fn denied(rule: Option<&str>) -> ProxyEvent {
        ProxyEvent::Denied {
            tool: "read_file".to_string(),
            rule: rule.map(String::from),
            message: "denied".to_string(),
        }
    }

    fn audit_entry() -> AuditEntry {
        AuditEntry {
            timestamp: 1.0,
            session_id: "s".to_string(),
            direction: Direction::Request,
            method: "tools/call".to_string(),
            tool: Some("read_file".to_string()),
            arguments: None,
            verdict: None,
            response_preview: None,
            latency_ms: None,
            error: None,
        }
    }

    #[test]
    fn tallies_events_and_rule_hits() {
        let bridge = DashboardBridge::new(None);
        bridge.on_event(&allowed(Some("allow-reads")));
        bridge.on_event(&allowed(Some("allow-reads")));
        bridge.on_event(&denied(None));
        bridge.on_event(&ProxyEvent::EngineError {
            message: "x".to_string(),
        });

        let stats = bridge.stats();
        assert_eq!(stats.events["allowed"], 2);
        assert_eq!(stats.events["denied"], 1);
        assert_eq!(stats.events["engineError"], 1);
        assert_eq!(stats.rule_hits["allow-reads"], 2);
        assert_eq!(stats.rule_hits["(default)"], 1);
    }

    #[tokio::test]
    async fn observers_receive_events_audit_and_stats() {
        let bridge = DashboardBridge::new(None);
        let mut rx = bridge.subscribe();

        bridge.on_event(&allowed(Some("r")));
        bridge.on_audit_entry(&audit_entry());
        bridge.publish_stats();

        assert!(matches!(rx.recv().await, Some(BridgeMessage::Event(_))));
        assert!(matches!(rx.recv().await, Some(BridgeMessage::Audit(_))));
        match rx.recv().await {
            Some(BridgeMessage::Stats(stats)) => {
                assert_eq!(stats.audit_entries_seen, 1);
            }
            other => panic!("expected stats, got {:?}", other),
        }
    }

    #[test]
    fn dead_observers_are_pruned() {
        let bridge = DashboardBridge::new(None);
        let rx = bridge.subscribe();
        drop(rx);
        bridge.on_event(&allowed(None));
        assert_eq!(bridge.lock().observers.len(), 0);
    }

    #[test]
    fn audit_query_returns_most_recent_first() {
        let bridge = DashboardBridge::new(None);
        for i in 0..5 {
            let mut entry = audit_entry();
            entry.timestamp = i as f64;
            bridge.on_audit_entry(&entry);
        }
        match bridge.handle_query(BridgeQuery::GetAuditEntries { limit: 2 }) {
            BridgeReply::AuditEntries(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].timestamp, 4.0);
                assert_eq!(entries[1].timestamp, 3.0);
            }
            other => panic!("expected entries, got {:?}", other),
        }
    }

    #[test]
    fn audit_ring_is_bounded() {
        let bridge = DashboardBridge::new(None);
        for _ in 0..(AUDIT_RING_CAPACITY + 10) {
            bridge.on_audit_entry(&audit_entry());
        }
        assert_eq!(bridge.lock().recent_audit.len(), AUDIT_RING_CAPACITY);
        assert_eq!(bridge.stats().audit_entries_seen, (AUDIT_RING_CAPACITY + 10) as u64);
    }

    #[tokio::test]
    async fn kill_switch_toggle_roundtrip() {
        let kill = Arc::new(KillSwitch::new(&crate::config::KillSwitchConfig {
            enabled: false,
            ..crate::config::KillSwitchConfig::default()
        }));
        let bridge = DashboardBridge::new(Some(Arc::clone(&kill)));

        match bridge.handle_query(BridgeQuery::ToggleKillSwitch) {
            BridgeReply::KillSwitch(status) => assert!(status.active),
            other => panic!("unexpected reply {:?}", other),
        }
        assert!(kill.is_active());

        match bridge.handle_query(BridgeQuery::ToggleKillSwitch) {
            BridgeReply::KillSwitch(status) => assert!(!status.active),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn config_query_returns_snapshot() {
        let bridge = DashboardBridge::new(None);
        match bridge.handle_query(BridgeQuery::GetConfig) {
            BridgeReply::Config(None) => {}
            other => panic!("expected empty config, got {:?}", other),
        }
        bridge.set_config(Arc::new(PolicyConfig::default_policy()));
        match bridge.handle_query(BridgeQuery::GetConfig) {
            BridgeReply::Config(Some(config)) => {
                assert!(config.rules.iter().any(|r| r.name == "block-ssh-keys"));
            }
            other => panic!("expected config, got {:?}", other),
        }
    }
}

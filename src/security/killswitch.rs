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

//! Emergency kill switch.
//!
//! Activation is the OR of three sources: a programmatic flag, the presence
//! of a kill file in any watched directory, and SIGUSR2 (POSIX only; the
//! signal source is disabled elsewhere). The file poller runs as a plain
//! tokio task so it never keeps the process alive; `dispose()` detaches both
//! the poller and the signal subscription.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::KillSwitchConfig;
use crate::utils::time;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<f64>,
}

#[derive(Debug, Default)]
struct Info {
    manual_reason: Option<String>,
    file_reason: Option<String>,
    activated_at: Option<f64>,
}

#[derive(Debug, Default)]
struct Shared {
    manual: AtomicBool,
    file: AtomicBool,
    info: Mutex<Info>,
}

pub struct KillSwitch {
    shared: Arc<Shared>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    signal_task: Mutex<Option<JoinHandle<()>>>,
}

impl KillSwitch {
    pub fn new(config: &KillSwitchConfig) -> Self {
        let shared = Arc::new(Shared::default());
        let poll_task = if config.enabled && config.check_file {
            Some(spawn_file_poller(Arc::clone(&shared), config))
        } else {
            None
        };
        let signal_task = if config.enabled {
            spawn_signal_listener(Arc::clone(&shared))
        } else {
            None
        };

        Self {
            shared,
            poll_task: Mutex::new(poll_task),
            signal_task: Mutex::new(signal_task),
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.manual.load(Ordering::SeqCst) || self.shared.file.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> KillStatus {
        let active = self.is_active();
        let info = self.shared.info.lock().unwrap_or_else(|e| e.into_inner());
        let reason = info
            .manual_reason
            .clone()
            .or_else(|| info.file_reason.clone());
        KillStatus {
            active,
            reason: if active { reason } else { None },
            activated_at: if active { info.activated_at } else { None },
        }
    }

    /// Programmatic activation. The reason shows up in deny messages.
    pub fn activate(&self, reason: Option<String>) {
        self.shared.manual.store(true, Ordering::SeqCst);
        let mut info = self.shared.info.lock().unwrap_or_else(|e| e.into_inner());
        info.manual_reason = Some(reason.unwrap_or_else(|| "manual activation".to_string()));
        info.activated_at.get_or_insert_with(time::now);
        warn!("kill switch activated");
    }

    /// Clears the programmatic flag only; a present kill file keeps the
    /// switch active.
    pub fn deactivate(&self) {
        self.shared.manual.store(false, Ordering::SeqCst);
        let mut info = self.shared.info.lock().unwrap_or_else(|e| e.into_inner());
        info.manual_reason = None;
        if !self.shared.file.load(Ordering::SeqCst) {
            info.activated_at = None;
        }
        info!("kill switch deactivated");
    }

    /// Stop the file poller and detach the signal subscription.
    pub fn dispose(&self) {
        if let Some(task) = self
            .poll_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        if let Some(task) = self
            .signal_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }
}

impl Drop for KillSwitch {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn spawn_file_poller(shared: Arc<Shared>, config: &KillSwitchConfig) -> JoinHandle<()> {
    let dirs = config.watch_dirs.clone();
    let names = config.kill_file_names.clone();
    let interval = std::time::Duration::from_millis(config.poll_interval_ms.max(10));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match find_kill_file(&dirs, &names) {
                Some(path) => {
                    if !shared.file.swap(true, Ordering::SeqCst) {
                        let mut info = shared.info.lock().unwrap_or_else(|e| e.into_inner());
                        info.file_reason = Some(format!("kill file present: {}", path.display()));
                        info.activated_at.get_or_insert_with(time::now);
                        warn!(path = %path.display(), "kill file detected");
                    }
                }
                None => {
                    if shared.file.swap(false, Ordering::SeqCst) {
                        let mut info = shared.info.lock().unwrap_or_else(|e| e.into_inner());
                        info.file_reason = None;
                        if !shared.manual.load(Ordering::SeqCst) {
                            info.activated_at = None;
                        }
                        info!("kill file removed");
                    }
                }
            }
        }
    })
}

fn find_kill_file(dirs: &[PathBuf], names: &[String]) -> Option<PathBuf> {
    for dir in dirs {
        for name in names {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}

/// SIGUSR2 toggles the programmatic flag. Disabled on non-unix platforms.
#[cfg(unix)]
fn spawn_signal_listener(shared: Arc<Shared>) -> Option<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut stream = match signal(SignalKind::user_defined2()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "failed to install SIGUSR2 handler");
            return None;
        }
    };

    Some(tokio::spawn(async move {
        while stream.recv().await.is_some() {
            let was_active = shared.manual.swap(true, Ordering::SeqCst);
            let mut info = shared.info.lock().unwrap_or_else(|e| e.into_inner());
            if was_active {
                shared.manual.store(false, Ordering::SeqCst);
                info.manual_reason = None;
                info!("kill switch toggled off by SIGUSR2");
            } else {
                info.manual_reason = Some("SIGUSR2 received".to_string());
                info.activated_at.get_or_insert_with(time::now);
                warn!("kill switch toggled on by SIGUSR2");
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_signal_listener(_shared: Arc<Shared>) -> Option<JoinHandle<()>> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_config() -> KillSwitchConfig {
        KillSwitchConfig {
            enabled: false,
            ..KillSwitchConfig::default()
        }
    }

    #[tokio::test]
    async fn starts_inactive() {
        let ks = KillSwitch::new(&disabled_config());
        assert!(!ks.is_active());
        let status = ks.status();
        assert!(!status.active);
        assert!(status.reason.is_none());
    }

    #[tokio::test]
    async fn programmatic_activation_roundtrip() {
        let ks = KillSwitch::new(&disabled_config());
        ks.activate(Some("incident response".to_string()));
        assert!(ks.is_active());
        let status = ks.status();
        assert_eq!(status.reason.as_deref(), Some("incident response"));
        assert!(status.activated_at.is_some());

        ks.deactivate();
        assert!(!ks.is_active());
        assert!(ks.status().activated_at.is_none());
    }

    #[tokio::test]
    async fn file_detection_sets_and_clears_flag() {
        let dir = tempfile::tempdir().unwrap();
        let config = KillSwitchConfig {
            enabled: true,
            check_file: true,
            kill_file_names: vec!["KILL".to_string()],
            watch_dirs: vec![dir.path().to_path_buf()],
            poll_interval_ms: 20,
        };
        let ks = KillSwitch::new(&config);
        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        assert!(!ks.is_active());

        let kill_path = dir.path().join("KILL");
        std::fs::write(&kill_path, b"stop").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        assert!(ks.is_active());
        assert!(ks
            .status()
            .reason
            .unwrap()
            .contains("kill file present"));

        std::fs::remove_file(&kill_path).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        assert!(!ks.is_active());
        ks.dispose();
    }

    #[tokio::test]
    async fn file_removal_does_not_clear_programmatic_flag() {
        let dir = tempfile::tempdir().unwrap();
        let config = KillSwitchConfig {
            enabled: true,
            check_file: true,
            kill_file_names: vec!["KILL".to_string()],
            watch_dirs: vec![dir.path().to_path_buf()],
            poll_interval_ms: 20,
        };
        let ks = KillSwitch::new(&config);
        ks.activate(None);

        let kill_path = dir.path().join("KILL");
        std::fs::write(&kill_path, b"stop").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        std::fs::remove_file(&kill_path).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;

        assert!(ks.is_active());
        ks.dispose();
    }

    #[tokio::test]
    async fn dispose_stops_polling() {
        let dir = tempfile::tempdir().unwrap();
        let config = KillSwitchConfig {
            enabled: true,
            check_file: true,
            kill_file_names: vec!["KILL".to_string()],
            watch_dirs: vec![dir.path().to_path_buf()],
            poll_interval_ms: 20,
        };
        let ks = KillSwitch::new(&config);
        ks.dispose();
        std::fs::write(dir.path().join("KILL"), b"stop").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        assert!(!ks.is_active());
    }
}

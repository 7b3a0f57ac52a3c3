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

// Main entry point for the Agent Wall proxy.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use agent_wall::bridge::DashboardBridge;
use agent_wall::config::PolicyConfig;
use agent_wall::engine_core::events::EventSink;
use agent_wall::mcp::proxy::ProxyEngine;
use agent_wall::security::audit::{AuditLog, AuditOptions};

#[derive(Parser, Debug)]
#[command(name = "agent-wall", version, about = "Security firewall for tool servers")]
struct Cli {
    /// Path to the policy YAML file. Defaults to the built-in policy.
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Path to the JSON-lines audit log.
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Mirror audit entries to stderr.
    #[arg(long)]
    audit_stderr: bool,

    /// Log filter (tracing EnvFilter syntax).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Tool server command to wrap.
    #[arg(required = true)]
    server_cmd: String,

    /// Tool server arguments.
    #[arg(last = true)]
    server_args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    install_panic_hook();
    init_tracing(&cli.log_level);

    let config = match &cli.policy {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let config = PolicyConfig::from_yaml_str(&text)?;
            info!(path = %path.display(), version = config.version, "policy loaded");
            config
        }
        None => {
            info!("no policy file given, using the built-in default policy");
            PolicyConfig::default_policy()
        }
    };
    let config = Arc::new(config);

    let audit = AuditLog::new(AuditOptions {
        file_path: cli.audit_log.clone(),
        mirror_stderr: cli.audit_stderr,
        signing: config.security.signing,
        signing_key: config.security.signing_key.clone(),
        ..AuditOptions::default()
    });

    let mut engine = ProxyEngine::new(
        cli.server_cmd.clone(),
        cli.server_args.clone(),
        Arc::clone(&config),
        audit,
    );

    // Wire the dashboard bridge to events and audit entries. The transport
    // that exposes it to a browser lives outside the core.
    let bridge = Arc::new(DashboardBridge::new(engine.core().kill_switch()));
    bridge.set_config(Arc::clone(&config));
    engine.core_mut().add_sink(Arc::clone(&bridge) as Arc<dyn EventSink>);
    {
        let bridge = Arc::clone(&bridge);
        engine
            .core_mut()
            .audit_mut()
            .set_on_entry(Box::new(move |entry| bridge.on_audit_entry(entry)));
    }
    let publisher = Arc::clone(&bridge).spawn_publisher(None);

    info!(cmd = %cli.server_cmd, args = ?cli.server_args, "wrapping tool server");
    let result = engine.run().await;
    publisher.abort();
    result?;
    Ok(())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

fn init_tracing(level: &str) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("agent_wall=info"));

    // stdout belongs to the client protocol; all diagnostics go to stderr.
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

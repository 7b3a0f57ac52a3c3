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

//! Server process management with zombie protection.
//!
//! The wrapped tool server is spawned with piped stdin/stdout and inherited
//! stderr. On Linux the child is bound to the firewall's lifetime via
//! PR_SET_PDEATHSIG. Shutdown is staged: stdin EOF, then SIGTERM, then
//! SIGKILL, each with a grace period.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::engine_core::errors::WallError;

pub struct ServerProcess {
    child: Child,
}

impl ServerProcess {
    pub fn spawn(cmd: &str, args: &[String]) -> Result<Self, WallError> {
        debug!("spawning server process '{}' with args {:?}", cmd, args);

        let mut command = Command::new(cmd);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        // SAFETY: PR_SET_PDEATHSIG with SIGKILL is the standard Linux
        // mechanism to terminate the child when the parent dies. The integer
        // constants come from the libc crate and are valid on this platform.
        #[cfg(target_os = "linux")]
        unsafe {
            command.pre_exec(|| {
                let ret = libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL);
                if ret != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = command.spawn().map_err(WallError::ChildSpawn)?;
        Ok(Self { child })
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the child to exit, returning its exit code.
    pub async fn wait(&mut self) -> Option<i32> {
        match self.child.wait().await {
            Ok(status) => status.code(),
            Err(_) => None,
        }
    }

    /// Staged shutdown. The caller must already have dropped the stdin
    /// handle (EOF is the first, politest signal).
    pub async fn shutdown(&mut self, grace: Duration) -> Option<i32> {
        if let Ok(Ok(status)) = tokio::time::timeout(grace, self.child.wait()).await {
            return status.code();
        }

        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            debug!(pid, "server still running after stdin EOF, sending SIGTERM");
            // SAFETY: plain kill(2) on a pid we own.
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
            if let Ok(Ok(status)) = tokio::time::timeout(grace, self.child.wait()).await {
                return status.code();
            }
        }

        warn!("server ignored graceful shutdown, killing");
        let _ = self.child.start_kill();
        match self.child.wait().await {
            Ok(status) => status.code(),
            Err(_) => None,
        }
    }
}

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

//! Sliding-window rate limiter.
//!
//! One bucket of push timestamps per rule name plus the `__global__` bucket.
//! Buckets are pruned on every check; a config swap resets them all so a
//! tightened rule cannot be bypassed by an old window.

use std::collections::HashMap;

pub const GLOBAL_BUCKET: &str = "__global__";

#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: HashMap<String, Vec<u64>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to consume one unit from `key`'s window. Returns `false` when the
    /// window already holds `max_calls` timestamps.
    pub fn try_consume(&mut self, key: &str, max_calls: u32, window_ms: u64, now_ms: u64) -> bool {
        let bucket = self.buckets.entry(key.to_string()).or_default();
        let cutoff = now_ms.saturating_sub(window_ms);
        bucket.retain(|&t| t > cutoff);

        if bucket.len() >= max_calls as usize {
            return false;
        }
        bucket.push(now_ms);
        true
    }

    pub fn reset(&mut self) {
        self.buckets.clear();
    }
}

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

//! agent-wall: a security firewall for tool-invocation traffic.
//!
//! This library provides the core of the Agent Wall proxy, which sits
//! between an AI-agent host and a JSON-RPC tool server, enforcing a
//! defense-in-depth pipeline on tool calls and scanning responses for
//! secrets, PII, and size abuse.

pub mod bridge;
pub mod config;
pub mod engine;
pub mod engine_core;
pub mod mcp;
pub mod security;
pub mod utils;

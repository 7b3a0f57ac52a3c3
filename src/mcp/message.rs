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

//! JSON-RPC 2.0 message model.
//!
//! Messages are immutable after parsing. A message is discriminated into a
//! tagged variant by shape:
//!   - has `id` + `method` -> Request
//!   - has `id` without `method` -> Response
//!   - has `method` without `id` -> Notification

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine_core::constants::{jsonrpc, methods};
use crate::engine_core::models::ToolCall;

/// A request/response identifier. Per JSON-RPC 2.0 the `id` can be a string,
/// a number, or `null` (the latter only on error responses whose originating
/// id could not be determined).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    Null,
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
            RequestId::Null => write!(f, "null"),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A parsed JSON-RPC 2.0 message.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl Serialize for WireMessage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WireMessage::Request(r) => r.serialize(serializer),
            WireMessage::Response(r) => r.serialize(serializer),
            WireMessage::Notification(n) => n.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for WireMessage {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(deserializer)?;
        let obj = v
            .as_object()
            .ok_or_else(|| serde::de::Error::custom("JSON-RPC message must be an object"))?;

        let has_id = obj.contains_key("id");
        let has_method = obj.contains_key("method");

        if has_id && has_method {
            let req: Request = serde_json::from_value(v).map_err(serde::de::Error::custom)?;
            Ok(WireMessage::Request(req))
        } else if has_id {
            let resp: Response = serde_json::from_value(v).map_err(serde::de::Error::custom)?;
            Ok(WireMessage::Response(resp))
        } else if has_method {
            let notif: Notification =
                serde_json::from_value(v).map_err(serde::de::Error::custom)?;
            Ok(WireMessage::Notification(notif))
        } else {
            Err(serde::de::Error::custom(
                "JSON-RPC message must have 'id' and/or 'method'",
            ))
        }
    }
}

impl WireMessage {
    /// The message id, if the variant carries one.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            WireMessage::Request(r) => Some(&r.id),
            WireMessage::Response(r) => Some(&r.id),
            WireMessage::Notification(_) => None,
        }
    }

    /// Serialize to a single JSON line ready to write to a byte stream.
    pub fn to_line(&self) -> Vec<u8> {
        let mut buf = serde_json::to_vec(self).unwrap_or_default();
        buf.push(b'\n');
        buf
    }
}

impl Request {
    /// Extract a [`ToolCall`] from a `tools/call` request.
    ///
    /// Returns `None` for any other method, or when `params.name` is missing
    /// or not a string. A missing `arguments` object is treated as empty.
    pub fn tool_call(&self) -> Option<ToolCall> {
        if self.method != methods::TOOLS_CALL {
            return None;
        }
        let params = self.params.as_ref()?.as_object()?;
        let name = params.get("name")?.as_str()?.to_string();
        let arguments = params
            .get("arguments")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_else(Map::new);
        Some(ToolCall { name, arguments })
    }
}

/// Synthesize a firewall error response. The message is prefixed with
/// `"Agent Wall: "` so clients can attribute the denial.
pub fn wall_error(id: RequestId, code: i32, message: &str) -> WireMessage {
    WireMessage::Response(Response {
        jsonrpc: "2.0".to_string(),
        id,
        result: None,
        error: Some(RpcError {
            code,
            message: format!("{}{}", jsonrpc::ERROR_PREFIX, message),
            data: None,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_request_numeric_id() {
        let json = r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"read"}}"#;
        let msg: WireMessage = serde_json::from_str(json).unwrap();
        match msg {
            WireMessage::Request(r) => {
                assert_eq!(r.id, RequestId::Number(1));
                assert_eq!(r.method, "tools/call");
            }
            _ => panic!("expected Request"),
        }
    }

    #[test]
    fn deserialize_request_string_id() {
        let json = r#"{"jsonrpc":"2.0","id":"abc","method":"initialize"}"#;
        let msg: WireMessage = serde_json::from_str(json).unwrap();
        match msg {
            WireMessage::Request(r) => assert_eq!(r.id, RequestId::String("abc".into())),
            _ => panic!("expected Request"),
        }
    }

    #[test]
    fn deserialize_response_with_error() {
        let json = r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32001,"message":"blocked"}}"#;
        let msg: WireMessage = serde_json::from_str(json).unwrap();
        match msg {
            WireMessage::Response(r) => {
                assert_eq!(r.error.unwrap().code, -32001);
            }
            _ => panic!("expected Response"),
        }
    }

    #[test]
    fn deserialize_response_null_id() {
        let json = r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#;
        let msg: WireMessage = serde_json::from_str(json).unwrap();
        match msg {
            WireMessage::Response(r) => assert_eq!(r.id, RequestId::Null),
            _ => panic!("expected Response"),
        }
    }

    #[test]
    fn deserialize_notification() {
        let json = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let msg: WireMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, WireMessage::Notification(_)));
    }

    #[test]
    fn reject_missing_id_and_method() {
        let result: Result<WireMessage, _> = serde_json::from_str(r#"{"jsonrpc":"2.0"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn reject_non_object() {
        let result: Result<WireMessage, _> = serde_json::from_str("42");
        assert!(result.is_err());
    }

    #[test]
    fn tool_call_extraction() {
        let req = Request {
            jsonrpc: "2.0".into(),
            id: RequestId::Number(7),
            method: "tools/call".into(),
            params: Some(json!({"name": "read_file", "arguments": {"path": "/tmp/a"}})),
        };
        let call = req.tool_call().unwrap();
        assert_eq!(call.name, "read_file");
        assert_eq!(call.arguments["path"], json!("/tmp/a"));
    }

    #[test]
    fn tool_call_other_method_is_none() {
        let req = Request {
            jsonrpc: "2.0".into(),
            id: RequestId::Number(7),
            method: "tools/list".into(),
            params: None,
        };
        assert!(req.tool_call().is_none());
    }

    #[test]
    fn tool_call_missing_arguments_is_empty() {
        let req = Request {
            jsonrpc: "2.0".into(),
            id: RequestId::Number(7),
            method: "tools/call".into(),
            params: Some(json!({"name": "ping"})),
        };
        assert!(req.tool_call().unwrap().arguments.is_empty());
    }

    #[test]
    fn wall_error_is_prefixed() {
        let msg = wall_error(RequestId::Number(1), -32001, "denied by policy");
        match msg {
            WireMessage::Response(r) => {
                let err = r.error.unwrap();
                assert_eq!(err.code, -32001);
                assert!(err.message.starts_with("Agent Wall: "));
            }
            _ => panic!("expected Response"),
        }
    }

    #[test]
    fn roundtrip_request_line() {
        let original = WireMessage::Request(Request {
            jsonrpc: "2.0".into(),
            id: RequestId::Number(42),
            method: "tools/call".into(),
            params: Some(json!({"name": "exec", "arguments": {"cmd": "ls"}})),
        });
        let line = original.to_line();
        assert!(line.ends_with(b"\n"));
        let parsed: WireMessage = serde_json::from_slice(&line[..line.len() - 1]).unwrap();
        assert_eq!(parsed, original);
    }
}

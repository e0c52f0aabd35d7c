// src/protocol.rs - JSON-RPC 2.0 wire format for the headset service
//
// Inbound frames are classified once here; everything downstream matches on
// `Inbound` instead of probing fields.
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Warning code the service sends when headset discovery finishes.
pub const WARNING_DISCOVERY_COMPLETE: i64 = 142;

/// Request ids are fixed per handshake step, so each id has at most one
/// call in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestId {
    Access = 1,
    QueryHeadsets = 2,
    ControlDevice = 3,
    Authorize = 4,
    CreateSession = 5,
    Subscribe = 6,
}

impl RequestId {
    pub const ALL: [RequestId; 6] = [
        RequestId::Access,
        RequestId::QueryHeadsets,
        RequestId::ControlDevice,
        RequestId::Authorize,
        RequestId::CreateSession,
        RequestId::Subscribe,
    ];

    pub fn as_u64(self) -> u64 {
        self as u64
    }

    pub fn from_u64(id: u64) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.as_u64() == id)
    }

    pub fn method(self) -> &'static str {
        match self {
            Self::Access => "requestAccess",
            Self::QueryHeadsets => "queryHeadsets",
            Self::ControlDevice => "controlDevice",
            Self::Authorize => "authorize",
            Self::CreateSession => "createSession",
            Self::Subscribe => "subscribe",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: RequestId, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: id.as_u64(),
            method: id.method(),
            params,
        }
    }

    pub fn to_text(&self) -> String {
        // Serializing a struct of strings, integers and a Value cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandEvent {
    pub name: String,
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WarningBody {
    pub code: i64,
    #[serde(default)]
    pub message: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Warning(WarningBody),
    Error { id: Option<u64>, error: ErrorBody },
    Response { id: u64, result: Value },
    Command(CommandEvent),
}

#[derive(Deserialize)]
struct RawInbound {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    warning: Option<WarningBody>,
    #[serde(default)]
    error: Option<ErrorBody>,
    #[serde(default)]
    com: Option<Value>,
}

impl Inbound {
    /// Decode one text frame. Returns `None` for frames matching no known
    /// shape; callers drop those.
    pub fn decode(text: &str) -> Option<Inbound> {
        let raw: RawInbound = serde_json::from_str(text).ok()?;

        if let Some(warning) = raw.warning {
            return Some(Inbound::Warning(warning));
        }
        if let Some(error) = raw.error {
            let id = raw.id.as_ref().and_then(Value::as_u64);
            return Some(Inbound::Error { id, error });
        }
        match raw.id {
            Some(Value::Null) | None => {}
            Some(id) => {
                let id = id.as_u64()?;
                return Some(Inbound::Response {
                    id,
                    result: raw.result.unwrap_or(Value::Null),
                });
            }
        }
        raw.com.as_ref().and_then(decode_command).map(Inbound::Command)
    }
}

fn decode_command(com: &Value) -> Option<CommandEvent> {
    let items = com.as_array()?;
    let name = items.first()?.as_str()?;
    let intensity = items.get(1)?.as_f64()?;
    Some(CommandEvent {
        name: name.to_string(),
        intensity,
    })
}

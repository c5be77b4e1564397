//! Engine.IO v4 / Socket.IO v5 text packets.
//!
//! Every WebSocket text frame is one Engine.IO packet: a type digit followed
//! by its data. Socket.IO packets ride inside Engine.IO `message` packets,
//! so a server event arrives as `42["agent_message",{...}]` and, when the
//! server asked for an acknowledgment, as `4217["agent_message",{...}]`; the
//! reply to that is `4317[]`.
//!
//! Binary packets are not supported.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StageError};

/// The default namespace.
pub const ROOT_NAMESPACE: &str = "/";

fn bad(msg: impl Into<String>) -> StageError {
    StageError::Protocol(msg.into())
}

/// Session parameters the server sends in its `open` packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Interval between server pings, in ms.
    pub ping_interval: u64,
    /// How long the server waits for a pong, in ms.
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// An Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or_else(|| bad("empty engine packet"))?;
        let data = chars.as_str();
        match kind {
            '0' => serde_json::from_str(data)
                .map(Self::Open)
                .map_err(|e| bad(format!("bad open packet: {e}"))),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(data.to_string())),
            '3' => Ok(Self::Pong(data.to_string())),
            '4' => Ok(Self::Message(data.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(bad(format!("unknown engine packet type {other:?}"))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Open(handshake) => {
                let data = serde_json::to_value(handshake).unwrap_or_default();
                format!("0{data}")
            }
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

/// A Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        /// Present when the sender wants an acknowledgment.
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    /// Decode the data of an Engine.IO `message` packet.
    pub fn decode(text: &str) -> Result<Self> {
        let kind = text
            .chars()
            .next()
            .ok_or_else(|| bad("empty socket packet"))?;
        if !kind.is_ascii_digit() {
            return Err(bad(format!("unknown socket packet type {kind:?}")));
        }
        if kind == '5' || kind == '6' {
            return Err(bad("binary packets are not supported"));
        }
        let mut rest = &text[1..];

        // Namespace, when not the root one: `/name,` (the comma may be
        // missing when nothing follows).
        let namespace = if rest.starts_with('/') {
            let end = rest.find(',').unwrap_or(rest.len());
            let namespace = rest[..end].to_string();
            rest = rest.get(end + 1..).unwrap_or("");
            namespace
        } else {
            ROOT_NAMESPACE.to_string()
        };

        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        let id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| bad(format!("bad packet id: {e}")))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data: Option<Value> = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest).map_err(|e| bad(format!("bad packet data: {e}")))?)
        };

        match kind {
            '0' => Ok(Self::Connect { namespace, data }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => {
                let Some(Value::Array(mut args)) = data else {
                    return Err(bad("event data must be an array"));
                };
                if args.is_empty() {
                    return Err(bad("event without a name"));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => return Err(bad(format!("event name must be a string, got {other}"))),
                };
                Ok(Self::Event {
                    namespace,
                    id,
                    name,
                    args,
                })
            }
            '3' => {
                let id = id.ok_or_else(|| bad("ack without an id"))?;
                let args = match data {
                    Some(Value::Array(args)) => args,
                    None => Vec::new(),
                    Some(other) => return Err(bad(format!("ack data must be an array, got {other}"))),
                };
                Ok(Self::Ack {
                    namespace,
                    id,
                    args,
                })
            }
            '4' => Ok(Self::ConnectError { namespace, data }),
            other => Err(bad(format!("unknown socket packet type {other:?}"))),
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::Ack { namespace, .. }
            | Self::ConnectError { namespace, .. } => namespace,
        }
    }

    pub fn encode(&self) -> String {
        let (kind, id, data) = match self {
            Self::Connect { data, .. } => ('0', None, data.clone()),
            Self::Disconnect { .. } => ('1', None, None),
            Self::Event { id, name, args, .. } => {
                let mut all = Vec::with_capacity(args.len() + 1);
                all.push(Value::String(name.clone()));
                all.extend(args.iter().cloned());
                ('2', *id, Some(Value::Array(all)))
            }
            Self::Ack { id, args, .. } => ('3', Some(*id), Some(Value::Array(args.clone()))),
            Self::ConnectError { data, .. } => ('4', None, data.clone()),
        };

        let mut out = String::new();
        out.push(kind);
        let namespace = self.namespace();
        if namespace != ROOT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }
        if let Some(id) = id {
            let _ = write!(out, "{id}");
        }
        if let Some(data) = data {
            let _ = write!(out, "{data}");
        }
        out
    }

    /// This packet wrapped in an Engine.IO `message` packet.
    pub fn to_engine(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        let EnginePacket::Open(handshake) = packet else {
            panic!("expected open packet");
        };
        assert_eq!(handshake.sid, "lv_VI97HAXpY6yYWAAAC");
        assert_eq!(handshake.ping_interval, 25_000);
        assert_eq!(handshake.ping_timeout, 20_000);
        assert_eq!(handshake.max_payload, Some(1_000_000));
    }

    #[test]
    fn test_engine_control_packets() {
        assert_eq!(EnginePacket::decode("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(EnginePacket::decode("2hb").unwrap(), EnginePacket::Ping("hb".into()));
        assert_eq!(EnginePacket::decode("1").unwrap(), EnginePacket::Close);
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
        assert!(EnginePacket::decode("").is_err());
        assert!(EnginePacket::decode("9").is_err());
        assert!(EnginePacket::decode("0{not json").is_err());
    }

    #[test]
    fn test_decode_event_from_flask_socketio() {
        let EnginePacket::Message(data) = EnginePacket::decode(r#"42["start_agent",{"agent_id":1}]"#).unwrap()
        else {
            panic!("expected message packet");
        };
        assert_eq!(
            SocketPacket::decode(&data).unwrap(),
            SocketPacket::Event {
                namespace: "/".into(),
                id: None,
                name: "start_agent".into(),
                args: vec![json!({"agent_id": 1})],
            }
        );
    }

    #[test]
    fn test_decode_event_with_ack_and_namespace() {
        let packet = SocketPacket::decode(r#"2/stage,17["agent_message",{"agent_id":"a","text":"hi"}]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                namespace: "/stage".into(),
                id: Some(17),
                name: "agent_message".into(),
                args: vec![json!({"agent_id": "a", "text": "hi"})],
            }
        );
    }

    #[test]
    fn test_decode_namespace_without_comma() {
        assert_eq!(
            SocketPacket::decode("1/stage").unwrap(),
            SocketPacket::Disconnect {
                namespace: "/stage".into()
            }
        );
        assert_eq!(
            SocketPacket::decode(r#"0/stage,{"sid":"x"}"#).unwrap(),
            SocketPacket::Connect {
                namespace: "/stage".into(),
                data: Some(json!({"sid": "x"})),
            }
        );
    }

    #[test]
    fn test_encode_client_packets() {
        let connect = SocketPacket::Connect {
            namespace: "/".into(),
            data: None,
        };
        assert_eq!(connect.to_engine(), "40");

        let connect = SocketPacket::Connect {
            namespace: "/stage".into(),
            data: None,
        };
        assert_eq!(connect.to_engine(), "40/stage,");

        let ack = SocketPacket::Ack {
            namespace: "/".into(),
            id: 17,
            args: Vec::new(),
        };
        assert_eq!(ack.to_engine(), "4317[]");

        let disconnect = SocketPacket::Disconnect {
            namespace: "/stage".into(),
        };
        assert_eq!(disconnect.to_engine(), "41/stage,");
    }

    #[test]
    fn test_event_encoding_matches_decoding() {
        let event = SocketPacket::Event {
            namespace: "/".into(),
            id: Some(3),
            name: "clear_agent".into(),
            args: vec![json!({"agent_id": 2})],
        };
        assert_eq!(event.encode(), r#"23["clear_agent",{"agent_id":2}]"#);
        assert_eq!(SocketPacket::decode(&event.encode()).unwrap(), event);
    }

    #[test]
    fn test_decode_errors() {
        assert!(SocketPacket::decode("").is_err());
        assert!(SocketPacket::decode("zz").is_err());
        assert!(SocketPacket::decode(r#"2{"agent_id":1}"#).is_err());
        assert!(SocketPacket::decode("2[]").is_err());
        assert!(SocketPacket::decode("2[5]").is_err());
        assert!(SocketPacket::decode("3[]").is_err());
        // Ack ids past u64.
        assert!(SocketPacket::decode("299999999999999999999999[\"x\"]").is_err());

        let err = SocketPacket::decode(r#"51-["start_agent",{"_placeholder":true,"num":0}]"#).unwrap_err();
        assert!(err.to_string().contains("binary"));
    }

    #[test]
    fn test_decode_connect_error() {
        let packet = SocketPacket::decode(r#"4{"message":"Not authorized"}"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::ConnectError {
                namespace: "/".into(),
                data: Some(json!({"message": "Not authorized"})),
            }
        );
    }
}

//! Engine.IO v4 / Socket.IO v5 packet codec.
//!
//! Only the text subset used over a WebSocket is supported: the Engine.IO
//! `open`, `close`, `ping`, `pong`, `message` and `noop` packets, and the
//! Socket.IO `CONNECT`, `DISCONNECT`, `EVENT`, `ACK` and `CONNECT_ERROR`
//! packets carried inside `message`. Binary attachments are rejected.
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,..}   open
//! 2 / 3                                   ping / pong
//! 40/cells,                               connect to /cells
//! 42/cells,7["subscribeToMetrics",{..}]   event with ack id 7
//! 43/cells,7[{"ok":true}]                 ack 7
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl Handshake {
    /// How long the link may stay silent before it is considered dead.
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

/// A Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl Packet {
    pub fn namespace(&self) -> &str {
        match self {
            Packet::Connect { namespace, .. }
            | Packet::Disconnect { namespace }
            | Packet::Event { namespace, .. }
            | Packet::Ack { namespace, .. }
            | Packet::ConnectError { namespace, .. } => namespace,
        }
    }

    fn type_digit(&self) -> char {
        match self {
            Packet::Connect { .. } => '0',
            Packet::Disconnect { .. } => '1',
            Packet::Event { .. } => '2',
            Packet::Ack { .. } => '3',
            Packet::ConnectError { .. } => '4',
        }
    }
}

/// One WebSocket text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Message(Packet),
    Upgrade,
    Noop,
}

/// Encode a frame for the wire.
pub fn encode(frame: &Frame) -> String {
    match frame {
        Frame::Open(handshake) => {
            format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
        }
        Frame::Close => "1".to_string(),
        Frame::Ping => "2".to_string(),
        Frame::Pong => "3".to_string(),
        Frame::Message(packet) => format!("4{}", encode_packet(packet)),
        Frame::Upgrade => "5".to_string(),
        Frame::Noop => "6".to_string(),
    }
}

fn encode_packet(packet: &Packet) -> String {
    let mut out = String::new();
    out.push(packet.type_digit());
    if packet.namespace() != "/" {
        out.push_str(packet.namespace());
        out.push(',');
    }
    match packet {
        Packet::Connect { data, .. } | Packet::ConnectError { data, .. } => {
            if let Some(data) = data {
                out.push_str(&data.to_string());
            }
        }
        Packet::Disconnect { .. } => {}
        Packet::Event {
            ack_id, name, args, ..
        } => {
            if let Some(id) = ack_id {
                out.push_str(&id.to_string());
            }
            let mut items = Vec::with_capacity(args.len() + 1);
            items.push(Value::String(name.clone()));
            items.extend(args.iter().cloned());
            out.push_str(&Value::Array(items).to_string());
        }
        Packet::Ack { ack_id, args, .. } => {
            out.push_str(&ack_id.to_string());
            out.push_str(&Value::Array(args.clone()).to_string());
        }
    }
    out
}

/// Decode a WebSocket text frame.
pub fn decode(text: &str) -> Result<Frame> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| Error::channel("empty frame"))?;
    let rest = chars.as_str();
    match kind {
        '0' => {
            let handshake = serde_json::from_str(rest)
                .map_err(|e| Error::channel(format!("bad open packet: {}", e)))?;
            Ok(Frame::Open(handshake))
        }
        '1' => Ok(Frame::Close),
        '2' => Ok(Frame::Ping),
        '3' => Ok(Frame::Pong),
        '4' => decode_packet(rest).map(Frame::Message),
        '5' => Ok(Frame::Upgrade),
        '6' => Ok(Frame::Noop),
        other => Err(Error::channel(format!(
            "unknown engine packet type '{}'",
            other
        ))),
    }
}

fn decode_packet(text: &str) -> Result<Packet> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| Error::channel("empty socket packet"))?;
    let mut rest = chars.as_str();

    if matches!(kind, '5' | '6') {
        return Err(Error::channel("binary packets are not supported"));
    }

    let namespace = if rest.starts_with('/') {
        match rest.find(',') {
            Some(idx) => {
                let ns = &rest[..idx];
                rest = &rest[idx + 1..];
                ns.to_string()
            }
            None => {
                let ns = rest.to_string();
                rest = "";
                ns
            }
        }
    } else {
        "/".to_string()
    };

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let ack_id = if digits > 0 {
        let id = rest[..digits]
            .parse::<u64>()
            .map_err(|e| Error::channel(format!("bad ack id: {}", e)))?;
        rest = &rest[digits..];
        Some(id)
    } else {
        None
    };

    let data = if rest.trim().is_empty() {
        None
    } else {
        Some(serde_json::from_str::<Value>(rest)?)
    };

    match kind {
        '0' => Ok(Packet::Connect { namespace, data }),
        '1' => Ok(Packet::Disconnect { namespace }),
        '2' => {
            let Some(Value::Array(mut items)) = data else {
                return Err(Error::channel("event payload must be an array"));
            };
            if items.is_empty() {
                return Err(Error::channel("event payload is missing its name"));
            }
            let name = match items.remove(0) {
                Value::String(name) => name,
                other => return Err(Error::channel(format!("event name must be a string, got {}", other))),
            };
            Ok(Packet::Event {
                namespace,
                ack_id,
                name,
                args: items,
            })
        }
        '3' => {
            let ack_id = ack_id.ok_or_else(|| Error::channel("ack without id"))?;
            let args = match data {
                Some(Value::Array(items)) => items,
                Some(other) => vec![other],
                None => Vec::new(),
            };
            Ok(Packet::Ack {
                namespace,
                ack_id,
                args,
            })
        }
        '4' => Ok(Packet::ConnectError { namespace, data }),
        other => Err(Error::channel(format!(
            "unknown socket packet type '{}'",
            other
        ))),
    }
}

/// Human-readable reason carried by a `CONNECT_ERROR`.
pub fn connect_error_message(data: Option<&Value>) -> String {
    match data {
        Some(Value::String(s)) => s.clone(),
        Some(value) => value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        None => "connection refused".to_string(),
    }
}

//! 协议编解码模块
//!
//! 文本帧格式（engine.io / socket.io v2）：
//!
//! | 前缀 | 含义 |
//! | --- | --- |
//! | `0` | open，后接 JSON 握手头 |
//! | `1` | close |
//! | `2` | ping |
//! | `3` | pong |
//! | `40` | 空消息 |
//! | `42[id]` | 事件（带 id 时为需要回复的调用） |
//! | `43id` | 调用回复 |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// ping 帧
pub const PING_FRAME: &str = "2";
/// pong 帧
pub const PONG_FRAME: &str = "3";
/// close 帧
pub const CLOSE_FRAME: &str = "1";
/// 空消息帧
pub const EMPTY_FRAME: &str = "40";

const OPEN_PREFIX: char = '0';
const EMIT_PREFIX: &str = "42";
const ACK_RESPONSE_PREFIX: &str = "43";

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Open,
    Close,
    Ping,
    Pong,
    Empty,
    Emit,
    AckRequest,
    AckResponse,
}

impl MessageKind {
    /// 是否为协议控制消息（由入站泵内联处理）
    pub fn is_control(self) -> bool {
        matches!(self, MessageKind::Open | MessageKind::Ping | MessageKind::Pong)
    }
}

/// 解码后的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    /// 调用 id（`AckRequest` / `AckResponse`）
    pub ack_id: Option<u32>,
    /// 事件名（`Emit` / `AckRequest`）
    pub method: String,
    /// 参数（JSON 数组文本）
    pub args: String,
    /// 原始帧
    pub source: String,
}

impl Message {
    fn control(kind: MessageKind, source: &str) -> Self {
        Self {
            kind,
            ack_id: None,
            method: String::new(),
            args: String::new(),
            source: source.to_string(),
        }
    }

    /// open 消息的负载（去掉类型前缀）
    pub fn payload(&self) -> &str {
        self.source.get(1..).unwrap_or_default()
    }
}

/// 握手头
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// 会话 ID
    pub sid: String,
    /// 支持的升级方式
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// 心跳间隔（毫秒）
    pub ping_interval: u64,
    /// 心跳超时（毫秒）
    pub ping_timeout: u64,
}

impl Header {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout)
    }
}

/// 解析握手头
pub fn parse_header(payload: &str) -> Result<Header, ProtocolError> {
    serde_json::from_str(payload).map_err(|err| ProtocolError::WrongHeader(err.to_string()))
}

/// 解码一帧
pub fn decode(frame: &str) -> Result<Message, ProtocolError> {
    let mut chars = frame.chars();
    let Some(first) = chars.next() else {
        return Err(ProtocolError::EmptyFrame);
    };

    match first {
        OPEN_PREFIX => Ok(Message::control(MessageKind::Open, frame)),
        '1' => Ok(Message::control(MessageKind::Close, frame)),
        '2' => Ok(Message::control(MessageKind::Ping, frame)),
        '3' => Ok(Message::control(MessageKind::Pong, frame)),
        '4' => decode_message(frame),
        _ => Err(ProtocolError::UnknownPacketType(truncate(frame))),
    }
}

fn decode_message(frame: &str) -> Result<Message, ProtocolError> {
    if frame == EMPTY_FRAME {
        return Ok(Message::control(MessageKind::Empty, frame));
    }

    if let Some(rest) = frame.strip_prefix(EMIT_PREFIX) {
        let (ack_id, body) = split_ack_id(rest)?;
        let (method, args) = split_event(body)?;
        let kind = if ack_id.is_some() {
            MessageKind::AckRequest
        } else {
            MessageKind::Emit
        };
        return Ok(Message {
            kind,
            ack_id,
            method,
            args,
            source: frame.to_string(),
        });
    }

    if let Some(rest) = frame.strip_prefix(ACK_RESPONSE_PREFIX) {
        let (ack_id, body) = split_ack_id(rest)?;
        let Some(ack_id) = ack_id else {
            return Err(ProtocolError::MalformedPayload(
                "ack response without id".to_string(),
            ));
        };
        // 回复参数保持原样，只校验是合法 JSON 数组
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Array(_)) => {}
            _ => {
                return Err(ProtocolError::MalformedPayload(format!(
                    "ack response args must be a json array: {}",
                    truncate(body)
                )));
            }
        }
        return Ok(Message {
            kind: MessageKind::AckResponse,
            ack_id: Some(ack_id),
            method: String::new(),
            args: body.to_string(),
            source: frame.to_string(),
        });
    }

    Err(ProtocolError::UnknownPacketType(truncate(frame)))
}

/// 拆出前导数字形式的调用 id
fn split_ack_id(rest: &str) -> Result<(Option<u32>, &str), ProtocolError> {
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Ok((None, rest));
    }
    let id = rest[..digits]
        .parse::<u32>()
        .map_err(|err| ProtocolError::MalformedPayload(format!("bad ack id: {err}")))?;
    Ok((Some(id), &rest[digits..]))
}

/// 拆出事件名与参数数组
fn split_event(body: &str) -> Result<(String, String), ProtocolError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| ProtocolError::MalformedPayload(err.to_string()))?;
    let Value::Array(mut items) = value else {
        return Err(ProtocolError::MalformedPayload(
            "event payload must be a json array".to_string(),
        ));
    };
    if items.is_empty() {
        return Err(ProtocolError::MalformedPayload(
            "event payload without name".to_string(),
        ));
    }
    let Value::String(method) = items.remove(0) else {
        return Err(ProtocolError::MalformedPayload(
            "event name must be a string".to_string(),
        ));
    };
    let args = Value::Array(items).to_string();
    Ok((method, args))
}

fn truncate(frame: &str) -> String {
    frame.chars().take(32).collect()
}

/// 编码 open 帧
pub fn encode_open(header: &Header) -> Result<String, serde_json::Error> {
    Ok(format!("{OPEN_PREFIX}{}", serde_json::to_string(header)?))
}

/// 编码事件帧
pub fn encode_emit<T: Serialize + ?Sized>(method: &str, args: &T) -> Result<String, serde_json::Error> {
    Ok(format!("{EMIT_PREFIX}{}", serde_json::to_string(&(method, args))?))
}

/// 编码需要回复的调用帧
pub fn encode_ack_request<T: Serialize + ?Sized>(
    id: u32,
    method: &str,
    args: &T,
) -> Result<String, serde_json::Error> {
    Ok(format!(
        "{EMIT_PREFIX}{id}{}",
        serde_json::to_string(&(method, args))?
    ))
}

/// 编码调用回复帧（`raw_args` 必须是 JSON 数组文本）
pub fn encode_ack_response(id: u32, raw_args: &str) -> String {
    format!("{ACK_RESPONSE_PREFIX}{id}{raw_args}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_control_frames() {
        assert_eq!(decode(PING_FRAME).unwrap().kind, MessageKind::Ping);
        assert_eq!(decode(PONG_FRAME).unwrap().kind, MessageKind::Pong);
        assert_eq!(decode(CLOSE_FRAME).unwrap().kind, MessageKind::Close);
        assert_eq!(decode(EMPTY_FRAME).unwrap().kind, MessageKind::Empty);
        assert!(MessageKind::Ping.is_control());
        assert!(!MessageKind::Emit.is_control());
    }

    #[test]
    fn test_decode_empty_and_unknown() {
        assert_eq!(decode(""), Err(ProtocolError::EmptyFrame));
        assert!(matches!(decode("9xyz"), Err(ProtocolError::UnknownPacketType(_))));
        assert!(matches!(decode("45[]"), Err(ProtocolError::UnknownPacketType(_))));
    }

    #[test]
    fn test_decode_open_and_header() {
        let frame = r#"0{"sid":"abc","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":60000}"#;
        let msg = decode(frame).unwrap();
        assert_eq!(msg.kind, MessageKind::Open);

        let header = parse_header(msg.payload()).unwrap();
        assert_eq!(header.sid, "abc");
        assert_eq!(header.upgrades, vec!["websocket".to_string()]);
        assert_eq!(header.ping_interval(), Duration::from_secs(25));
        assert_eq!(header.ping_timeout(), Duration::from_secs(60));

        assert_eq!(encode_open(&header).unwrap(), frame);
    }

    #[test]
    fn test_wrong_header() {
        let msg = decode("0{not json").unwrap();
        assert!(matches!(parse_header(msg.payload()), Err(ProtocolError::WrongHeader(_))));
        assert!(matches!(parse_header(""), Err(ProtocolError::WrongHeader(_))));
    }

    #[test]
    fn test_decode_emit() {
        let msg = decode(r#"42["chat",{"text":"hi"},1]"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Emit);
        assert_eq!(msg.ack_id, None);
        assert_eq!(msg.method, "chat");
        assert_eq!(msg.args, r#"[{"text":"hi"},1]"#);
    }

    #[test]
    fn test_decode_ack_request_and_response() {
        let req = decode(r#"4217["sum",[1,2]]"#).unwrap();
        assert_eq!(req.kind, MessageKind::AckRequest);
        assert_eq!(req.ack_id, Some(17));
        assert_eq!(req.method, "sum");
        assert_eq!(req.args, "[[1,2]]");

        let resp = decode(r#"4317[3]"#).unwrap();
        assert_eq!(resp.kind, MessageKind::AckResponse);
        assert_eq!(resp.ack_id, Some(17));
        assert_eq!(resp.args, "[3]");
    }

    #[test]
    fn test_decode_malformed_messages() {
        assert!(matches!(decode("42{}"), Err(ProtocolError::MalformedPayload(_))));
        assert!(matches!(decode("42[]"), Err(ProtocolError::MalformedPayload(_))));
        assert!(matches!(decode("42[1,2]"), Err(ProtocolError::MalformedPayload(_))));
        assert!(matches!(decode("43[1]"), Err(ProtocolError::MalformedPayload(_))));
        assert!(matches!(decode("435{}"), Err(ProtocolError::MalformedPayload(_))));
        assert!(matches!(
            decode("4299999999999[\"x\"]"),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_encode_frames() {
        assert_eq!(encode_emit("chat", "hi").unwrap(), r#"42["chat","hi"]"#);
        assert_eq!(encode_ack_request(5, "sum", &[1, 2]).unwrap(), r#"425["sum",[1,2]]"#);
        assert_eq!(encode_ack_response(5, "[3]"), "435[3]");

        let decoded = decode(&encode_ack_request(5, "sum", &[1, 2]).unwrap()).unwrap();
        assert_eq!(decoded.ack_id, Some(5));
        assert_eq!(decoded.args, "[[1,2]]");
    }
}

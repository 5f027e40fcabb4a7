//! 实时事件协议
//!
//! 所有帧都是 `{"event": <名称>, "data": <载荷>}`。客户端事件按名称显式分派，
//! 未知名称被忽略；WebRTC 协商载荷以 `RawValue` 原样透传，从不解析。

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;

use crate::entities::{display_timestamp, FileDescriptor, Message, MessageKind};
use crate::value_objects::{CallId, ConnectionId, RoomSlug};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("malformed payload for {event}: {reason}")]
    MalformedPayload { event: &'static str, reason: String },
}

#[derive(Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Option<Box<RawValue>>,
}

/// WebRTC 协商信令的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

/// 待转发的信令；`payload` 与客户端发来的字节完全一致
#[derive(Debug, Clone)]
pub struct Signal {
    pub kind: SignalKind,
    pub call: CallId,
    pub to: Option<ConnectionId>,
    pub payload: Box<RawValue>,
}

/// 客户端 → 服务端事件
#[derive(Debug, Clone)]
pub enum ClientEvent {
    JoinChat { room: RoomSlug },
    LeaveChat { room: RoomSlug },
    SendMessage { room: RoomSlug, message: String },
    JoinCall { call: CallId },
    LeaveCall { call: CallId },
    Signal(Signal),
}

#[derive(Deserialize)]
struct RoomPayload {
    room: RoomSlug,
}

#[derive(Deserialize)]
struct MessagePayload {
    room: RoomSlug,
    message: String,
}

#[derive(Deserialize)]
struct CallPayload {
    room_id: CallId,
}

#[derive(Deserialize)]
struct OfferPayload {
    room_id: CallId,
    offer: Box<RawValue>,
    #[serde(default)]
    to: Option<ConnectionId>,
}

#[derive(Deserialize)]
struct AnswerPayload {
    room_id: CallId,
    answer: Box<RawValue>,
    #[serde(default)]
    to: Option<ConnectionId>,
}

#[derive(Deserialize)]
struct CandidatePayload {
    room_id: CallId,
    candidate: Box<RawValue>,
    #[serde(default)]
    to: Option<ConnectionId>,
}

fn payload<'a, T: Deserialize<'a>>(
    event: &'static str,
    data: &'a Option<Box<RawValue>>,
) -> Result<T, ProtocolError> {
    let raw = data.as_ref().ok_or_else(|| ProtocolError::MalformedPayload {
        event,
        reason: "missing data".to_owned(),
    })?;
    serde_json::from_str(raw.get()).map_err(|err| ProtocolError::MalformedPayload {
        event,
        reason: err.to_string(),
    })
}

impl ClientEvent {
    /// 解析一帧文本；未知事件名返回 `Ok(None)`
    pub fn parse(text: &str) -> Result<Option<Self>, ProtocolError> {
        let frame: Frame = serde_json::from_str(text)
            .map_err(|err| ProtocolError::MalformedFrame(err.to_string()))?;
        let data = &frame.data;

        let event = match frame.event.as_str() {
            "join_chat" => {
                let p: RoomPayload = payload("join_chat", data)?;
                ClientEvent::JoinChat { room: p.room }
            }
            "leave_chat" => {
                let p: RoomPayload = payload("leave_chat", data)?;
                ClientEvent::LeaveChat { room: p.room }
            }
            "send_message" => {
                let p: MessagePayload = payload("send_message", data)?;
                ClientEvent::SendMessage {
                    room: p.room,
                    message: p.message,
                }
            }
            "join_call" => {
                let p: CallPayload = payload("join_call", data)?;
                ClientEvent::JoinCall { call: p.room_id }
            }
            "leave_call" => {
                let p: CallPayload = payload("leave_call", data)?;
                ClientEvent::LeaveCall { call: p.room_id }
            }
            "webrtc_offer" => {
                let p: OfferPayload = payload("webrtc_offer", data)?;
                ClientEvent::Signal(Signal {
                    kind: SignalKind::Offer,
                    call: p.room_id,
                    to: p.to,
                    payload: p.offer,
                })
            }
            "webrtc_answer" => {
                let p: AnswerPayload = payload("webrtc_answer", data)?;
                ClientEvent::Signal(Signal {
                    kind: SignalKind::Answer,
                    call: p.room_id,
                    to: p.to,
                    payload: p.answer,
                })
            }
            "webrtc_ice_candidate" => {
                let p: CandidatePayload = payload("webrtc_ice_candidate", data)?;
                ClientEvent::Signal(Signal {
                    kind: SignalKind::IceCandidate,
                    call: p.room_id,
                    to: p.to,
                    payload: p.candidate,
                })
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinChat { .. } => "join_chat",
            ClientEvent::LeaveChat { .. } => "leave_chat",
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::JoinCall { .. } => "join_call",
            ClientEvent::LeaveCall { .. } => "leave_call",
            ClientEvent::Signal(signal) => match signal.kind {
                SignalKind::Offer => "webrtc_offer",
                SignalKind::Answer => "webrtc_answer",
                SignalKind::IceCandidate => "webrtc_ice_candidate",
            },
        }
    }
}

/// `receive_message` 载荷
#[derive(Debug, Clone, Serialize)]
pub struct ChatBroadcast {
    pub message: String,
    pub username: String,
    pub timestamp: String,
    pub message_type: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileDescriptor>,
}

impl ChatBroadcast {
    pub fn from_message(message: &Message) -> Self {
        Self {
            message: message.content.clone(),
            username: message.sender_name.clone(),
            timestamp: display_timestamp(&message.timestamp),
            message_type: message.kind,
            file: message.file.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallEventKind {
    UserJoined,
    UserLeft,
    Offer,
    Answer,
    IceCandidate,
}

impl From<SignalKind> for CallEventKind {
    fn from(kind: SignalKind) -> Self {
        match kind {
            SignalKind::Offer => CallEventKind::Offer,
            SignalKind::Answer => CallEventKind::Answer,
            SignalKind::IceCandidate => CallEventKind::IceCandidate,
        }
    }
}

/// `call_event` 载荷；信令字段按种类三选一
#[derive(Debug, Clone, Serialize)]
pub struct CallEventPayload {
    #[serde(rename = "type")]
    pub kind: CallEventKind,
    pub room_id: CallId,
    pub from: ConnectionId,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<Box<RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<Box<RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Box<RawValue>>,
}

impl CallEventPayload {
    pub fn presence(kind: CallEventKind, room_id: CallId, from: ConnectionId, username: &str) -> Self {
        Self {
            kind,
            room_id,
            from,
            username: username.to_owned(),
            offer: None,
            answer: None,
            candidate: None,
        }
    }

    pub fn signal(signal: Signal, from: ConnectionId, username: &str) -> Self {
        let mut event = Self::presence(signal.kind.into(), signal.call, from, username);
        match signal.kind {
            SignalKind::Offer => event.offer = Some(signal.payload),
            SignalKind::Answer => event.answer = Some(signal.payload),
            SignalKind::IceCandidate => event.candidate = Some(signal.payload),
        }
        event
    }
}

/// `video_call_available` / `video_call_ended` 载荷
#[derive(Debug, Clone, Serialize)]
pub struct CallNotice {
    pub video_room_id: CallId,
    pub chat_room: Option<RoomSlug>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

/// 服务端 → 客户端事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Status { msg: String },
    UserJoined { username: String },
    UserLeft { username: String },
    ReceiveMessage(ChatBroadcast),
    CallEvent(CallEventPayload),
    VideoCallAvailable(CallNotice),
    VideoCallEnded(CallNotice),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Status { .. } => "status",
            ServerEvent::UserJoined { .. } => "user_joined",
            ServerEvent::UserLeft { .. } => "user_left",
            ServerEvent::ReceiveMessage(_) => "receive_message",
            ServerEvent::CallEvent(_) => "call_event",
            ServerEvent::VideoCallAvailable(_) => "video_call_available",
            ServerEvent::VideoCallEnded(_) => "video_call_ended",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

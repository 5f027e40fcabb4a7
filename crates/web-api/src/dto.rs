//! HTTP 响应体

use domain::{Call, ChatRoom, FileDescriptor, Message};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct RoomView {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub is_system: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl From<ChatRoom> for RoomView {
    fn from(room: ChatRoom) -> Self {
        Self {
            is_system: room.is_system(),
            slug: room.slug.into(),
            name: room.display_name,
            description: room.description,
            is_private: room.is_private,
            owner_id: room.owner_id.map(Uuid::from),
            created_at: room.created_at.map(|ts| ts.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SenderView {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub content: String,
    pub timestamp: String,
    pub message_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileDescriptor>,
    pub sender: SenderView,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        Self {
            id: message.id.into(),
            content: message.content,
            timestamp: message.timestamp.to_rfc3339(),
            message_type: message.kind.as_str(),
            file: message.file,
            sender: SenderView {
                id: message.sender_id.into(),
                username: message.sender_name,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CallView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub host_id: Uuid,
    pub chat_room: Option<String>,
    pub is_active: bool,
    pub max_participants: u32,
    pub participants: usize,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    /// 仅在通话已结束时给出
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl CallView {
    pub fn new(call: Call, participants: usize) -> Self {
        let redirect = (!call.is_active).then(|| call.redirect_target());
        Self {
            id: call.id.into(),
            title: call.title,
            description: call.description,
            host_id: call.host_id.into(),
            chat_room: call.chat_room.map(String::from),
            is_active: call.is_active,
            max_participants: call.max_participants,
            participants,
            created_at: call.created_at.to_rfc3339(),
            ended_at: call.ended_at.map(|ts| ts.to_rfc3339()),
            redirect,
        }
    }
}

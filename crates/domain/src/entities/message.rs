//! 消息实体定义

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{MessageId, RoomSlug, Timestamp, UserId};

const MESSAGE_MAX_LEN: usize = 10_000;

/// 消息类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::File => "file",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "text" => Ok(MessageKind::Text),
            "file" => Ok(MessageKind::File),
            other => Err(DomainError::invalid_argument(
                "message_type",
                format!("unknown kind {other}"),
            )),
        }
    }
}

/// 外部存储返回的附件描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub url: String,
    pub filename: String,
    pub extension: String,
}

/// 一条已持久化（或仅广播）的聊天消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room: RoomSlug,
    pub sender_id: UserId,
    /// 发送时的用户名快照
    pub sender_name: String,
    pub content: String,
    pub kind: MessageKind,
    pub file: Option<FileDescriptor>,
    pub timestamp: Timestamp,
}

impl Message {
    pub fn text(
        room: RoomSlug,
        sender_id: UserId,
        sender_name: impl Into<String>,
        content: impl Into<String>,
        timestamp: Timestamp,
    ) -> DomainResult<Self> {
        let content = validate_content(content.into(), false)?;
        Ok(Self {
            id: MessageId::generate(),
            room,
            sender_id,
            sender_name: sender_name.into(),
            content,
            kind: MessageKind::Text,
            file: None,
            timestamp,
        })
    }

    /// 文件消息允许正文为空
    pub fn file(
        room: RoomSlug,
        sender_id: UserId,
        sender_name: impl Into<String>,
        content: impl Into<String>,
        file: FileDescriptor,
        timestamp: Timestamp,
    ) -> DomainResult<Self> {
        let content = validate_content(content.into(), true)?;
        Ok(Self {
            id: MessageId::generate(),
            room,
            sender_id,
            sender_name: sender_name.into(),
            content,
            kind: MessageKind::File,
            file: Some(file),
            timestamp,
        })
    }
}

/// 校验正文；`allow_empty` 用于附件消息
pub fn validate_content(content: String, allow_empty: bool) -> DomainResult<String> {
    if !allow_empty && content.trim().is_empty() {
        return Err(DomainError::invalid_argument("message", "cannot be empty"));
    }
    if content.chars().count() > MESSAGE_MAX_LEN {
        return Err(DomainError::invalid_argument("message", "too long"));
    }
    Ok(content)
}

/// 客户端展示用的时间格式
pub fn display_timestamp(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn text_message_requires_content() {
        let room = RoomSlug::parse("general").unwrap();
        let result = Message::text(room, UserId::generate(), "bob", "   ", Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn file_message_may_have_empty_caption() {
        let room = RoomSlug::parse("general").unwrap();
        let file = FileDescriptor {
            url: "/uploads/chat/a.pdf".into(),
            filename: "report.pdf".into(),
            extension: "pdf".into(),
        };
        let msg = Message::file(room, UserId::generate(), "bob", "", file, Utc::now()).unwrap();
        assert_eq!(msg.kind, MessageKind::File);
    }

    #[test]
    fn timestamp_uses_second_precision() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 5).unwrap();
        assert_eq!(display_timestamp(&ts), "2024-03-01 10:00:05");
    }
}

//! 进程内通知总线上传递的领域事件

use crate::entities::{Call, ChatRoom, Message};

#[derive(Debug, Clone)]
pub enum ChatEvent {
    RoomCreated(ChatRoom),
    MessagePosted(Message),
    CallStarted(Call),
    CallEnded(Call),
}

impl ChatEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::RoomCreated(_) => "room_created",
            ChatEvent::MessagePosted(_) => "message_posted",
            ChatEvent::CallStarted(_) => "call_started",
            ChatEvent::CallEnded(_) => "call_ended",
        }
    }
}

//! 审计日志观察者：把领域事件写成结构化日志

use application::{ApplicationError, NotificationObserver};
use async_trait::async_trait;
use domain::ChatEvent;

#[derive(Debug, Default, Clone)]
pub struct AuditLogObserver;

#[async_trait]
impl NotificationObserver for AuditLogObserver {
    fn name(&self) -> &'static str {
        "audit-log"
    }

    async fn notify(&self, event: &ChatEvent) -> Result<(), ApplicationError> {
        match event {
            ChatEvent::RoomCreated(room) => tracing::info!(
                target: "audit",
                room = %room.slug,
                private = room.is_private,
                "room created"
            ),
            ChatEvent::MessagePosted(message) => tracing::info!(
                target: "audit",
                room = %message.room,
                message_id = %message.id,
                sender = %message.sender_id,
                kind = message.kind.as_str(),
                "message posted"
            ),
            ChatEvent::CallStarted(call) => tracing::info!(
                target: "audit",
                call_id = %call.id,
                host = %call.host_id,
                chat_room = call.chat_room.as_ref().map(|r| r.as_str()).unwrap_or("-"),
                "call started"
            ),
            ChatEvent::CallEnded(call) => tracing::info!(
                target: "audit",
                call_id = %call.id,
                ended_at = ?call.ended_at,
                "call ended"
            ),
        }
        Ok(())
    }
}

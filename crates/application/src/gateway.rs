//! 连接网关中与传输无关的部分
//!
//! 传输层（WebSocket）只负责收发文本帧；这里按事件名分派到对应服务，
//! 并把错误分类为日志级别。任何错误都不会终止连接。

use std::sync::Arc;

use domain::{ClientEvent, ConnectionId, DomainError};

use crate::{
    error::ApplicationError,
    presence::PresenceTracker,
    registry::ConnectionHandle,
    services::{CallRelay, MessageBroker, RoomService},
};

pub struct Gateway {
    presence: Arc<PresenceTracker>,
    rooms: Arc<RoomService>,
    broker: Arc<MessageBroker>,
    calls: Arc<CallRelay>,
}

impl Gateway {
    pub fn new(
        presence: Arc<PresenceTracker>,
        rooms: Arc<RoomService>,
        broker: Arc<MessageBroker>,
        calls: Arc<CallRelay>,
    ) -> Self {
        Self {
            presence,
            rooms,
            broker,
            calls,
        }
    }

    pub async fn connect(&self, connection: ConnectionHandle) {
        self.presence.connect(connection).await;
    }

    pub async fn disconnect(&self, id: ConnectionId) {
        self.presence.disconnect(id).await;
    }

    /// 处理一帧入站文本
    pub async fn dispatch(&self, connection: &ConnectionHandle, text: &str) {
        let event = match ClientEvent::parse(text) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::debug!(connection_id = %connection.id, "忽略未知事件");
                return;
            }
            Err(err) => {
                tracing::debug!(connection_id = %connection.id, error = %err, "丢弃格式错误的事件");
                return;
            }
        };

        let name = event.name();
        if let Err(err) = self.handle(connection, event).await {
            log_failure(connection.id, name, &err);
        }
    }

    pub async fn handle(
        &self,
        connection: &ConnectionHandle,
        event: ClientEvent,
    ) -> Result<(), ApplicationError> {
        match event {
            ClientEvent::JoinChat { room } => {
                self.rooms.join_chat(connection, &room).await?;
            }
            ClientEvent::LeaveChat { room } => {
                self.rooms.leave_chat(connection, &room).await;
            }
            ClientEvent::SendMessage { room, message } => {
                self.broker
                    .post_message(&connection.identity, &room, message)
                    .await?;
            }
            ClientEvent::JoinCall { call } => {
                if let Err(err) = self.calls.join_call(connection, call).await {
                    if matches!(err, ApplicationError::Domain(DomainError::CallEnded)) {
                        if let Some(notice) = self.calls.redirect_notice(call).await {
                            connection.deliver(Arc::new(notice));
                        }
                    }
                    return Err(err);
                }
            }
            ClientEvent::LeaveCall { call } => {
                self.calls.leave_call(connection, call).await;
            }
            ClientEvent::Signal(signal) => {
                self.calls.relay(connection, signal).await?;
            }
        }
        Ok(())
    }
}

fn log_failure(connection_id: ConnectionId, event: &'static str, err: &ApplicationError) {
    match err {
        ApplicationError::Repository(_) | ApplicationError::Storage(_) => {
            tracing::warn!(%connection_id, event, error = %err, "事件处理失败");
        }
        _ if err.is_denial() || err.is_not_found() => {
            tracing::debug!(%connection_id, event, error = %err, "事件被拒绝");
        }
        _ => {
            tracing::debug!(%connection_id, event, error = %err, "事件未生效");
        }
    }
}

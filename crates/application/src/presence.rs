//! 在线状态跟踪
//!
//! 连接建立时登记身份并加入用户私有频道；断开时离开所有频道，
//! 并向每个还有人的频道发出离开通知。状态完全来自活动连接，从不落库。

use std::sync::Arc;

use domain::{CallEventKind, CallEventPayload, ConnectionId, RoomSlug, ServerEvent};

use crate::clock::Clock;
use crate::registry::{Channel, ConnectionHandle, RoomRegistry};
use crate::repository::UserRepository;

pub struct PresenceTracker {
    registry: Arc<RoomRegistry>,
    users: Arc<dyn UserRepository>,
    clock: Arc<dyn Clock>,
}

impl PresenceTracker {
    pub fn new(
        registry: Arc<RoomRegistry>,
        users: Arc<dyn UserRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            users,
            clock,
        }
    }

    pub async fn connect(&self, handle: ConnectionHandle) {
        let id = handle.id;
        let profile = handle.identity.profile().cloned();
        self.registry.register(handle).await;

        let Some(profile) = profile else {
            tracing::info!(connection_id = %id, "匿名连接已建立");
            return;
        };

        // 用户目录只服务于历史记录的用户名解析，失败不影响连接
        if let Err(err) = self.users.upsert(&profile, self.clock.now()).await {
            tracing::warn!(user_id = %profile.id, error = %err, "更新用户目录失败");
        }

        let channel = Channel::User(profile.id);
        self.registry.join(&channel, id, None).await;
        self.registry
            .broadcast(
                &channel,
                ServerEvent::Status {
                    msg: format!("{} has connected", profile.username),
                },
                None,
            )
            .await;
        tracing::info!(connection_id = %id, user_id = %profile.id, "连接已建立");
    }

    /// 断开连接，返回它离开的频道数
    pub async fn disconnect(&self, id: ConnectionId) -> usize {
        let Some(departure) = self.registry.unregister(id).await else {
            return 0;
        };
        let name = departure.handle.display_name().to_owned();

        for channel in &departure.channels {
            let event = match channel {
                Channel::Chat(_) => ServerEvent::UserLeft {
                    username: name.clone(),
                },
                Channel::Call(call) => ServerEvent::CallEvent(CallEventPayload::presence(
                    CallEventKind::UserLeft,
                    *call,
                    id,
                    &name,
                )),
                Channel::User(_) => ServerEvent::Status {
                    msg: format!("{name} has disconnected"),
                },
            };
            self.registry.broadcast(channel, event, None).await;
        }

        tracing::info!(
            connection_id = %id,
            channels = departure.channels.len(),
            "连接已断开"
        );
        departure.channels.len()
    }

    /// 房间当前成员的展示名，按名称排序
    pub async fn online_users(&self, room: &RoomSlug) -> Vec<String> {
        let mut names: Vec<String> = self
            .registry
            .members(&Channel::Chat(room.clone()))
            .await
            .iter()
            .map(|handle| handle.display_name().to_owned())
            .collect();
        names.sort();
        names
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.connection_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::memory::InMemoryUserRepository;
    use crate::registry::tests::handle;

    fn tracker() -> (PresenceTracker, Arc<RoomRegistry>, Arc<InMemoryUserRepository>) {
        let registry = Arc::new(RoomRegistry::new());
        let users = Arc::new(InMemoryUserRepository::default());
        let tracker = PresenceTracker::new(registry.clone(), users.clone(), Arc::new(SystemClock));
        (tracker, registry, users)
    }

    #[tokio::test]
    async fn connect_records_user_and_greets_private_channel() {
        let (tracker, _registry, users) = tracker();
        let (conn, mut rx) = handle("amy");
        let user_id = conn.identity.user_id().unwrap();
        tracker.connect(conn).await;

        assert!(users.find_by_id(user_id).await.unwrap().is_some());
        let greeting = rx.try_recv().unwrap();
        assert!(matches!(&*greeting, ServerEvent::Status { msg } if msg == "amy has connected"));
    }

    #[tokio::test]
    async fn disconnect_announces_to_remaining_members() {
        let (tracker, registry, _users) = tracker();
        let (amy, _rx_amy) = handle("amy");
        let (bob, mut rx_bob) = handle("bob");
        tracker.connect(amy.clone()).await;
        tracker.connect(bob.clone()).await;
        let _ = rx_bob.try_recv();

        let room = RoomSlug::parse("general").unwrap();
        registry.join(&Channel::Chat(room.clone()), amy.id, None).await;
        registry.join(&Channel::Chat(room.clone()), bob.id, None).await;
        assert_eq!(tracker.online_users(&room).await, vec!["amy", "bob"]);

        // 私有频道 + 聊天室
        assert_eq!(tracker.disconnect(amy.id).await, 2);
        let notice = rx_bob.try_recv().unwrap();
        assert!(matches!(&*notice, ServerEvent::UserLeft { username } if username == "amy"));
        assert_eq!(tracker.online_users(&room).await, vec!["bob"]);
        assert_eq!(tracker.disconnect(amy.id).await, 0);
    }
}

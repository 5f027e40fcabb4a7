//! 房间注册表
//!
//! 进程内唯一持有「频道 → 连接」映射的地方。聊天室、通话、用户私有通知
//! 都是频道，区别只在于标识的命名空间。所有出站投递都走有界队列的
//! `try_send`，慢连接只会丢自己的帧，不会阻塞其他房间的广播。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use domain::{CallId, ConnectionId, Identity, RoomSlug, ServerEvent, UserId};
use tokio::sync::{mpsc, RwLock};

/// 出站事件队列，事件以 `Arc` 共享，一次序列化可以投递给所有成员
pub type Outbound = mpsc::Sender<Arc<ServerEvent>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Chat(RoomSlug),
    Call(CallId),
    /// 每个已认证用户的私有通知频道（同一用户的多个连接共享）
    User(UserId),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Chat(slug) => write!(f, "chat:{slug}"),
            Channel::Call(id) => write!(f, "call:{id}"),
            Channel::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// 一条活动连接的句柄，只有网关创建它
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub identity: Identity,
    sender: Outbound,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, identity: Identity, sender: Outbound) -> Self {
        Self {
            id,
            identity,
            sender,
        }
    }

    pub fn display_name(&self) -> &str {
        self.identity.display_name()
    }

    /// 非阻塞投递；队列满或连接已关闭时返回 false
    pub fn deliver(&self, event: Arc<ServerEvent>) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    connection_id = %self.id,
                    event = event.name(),
                    "出站队列已满，丢弃事件"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(connection_id = %self.id, "连接已关闭，跳过投递");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinResult {
    Joined,
    AlreadyMember,
    /// 频道已达到容量上限
    Full,
    /// 连接已注销（例如断开与加入并发）
    UnknownConnection,
}

struct ConnectionEntry {
    handle: ConnectionHandle,
    channels: HashSet<Channel>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    channels: HashMap<Channel, HashSet<ConnectionId>>,
}

impl RegistryState {
    fn remove_member(&mut self, channel: &Channel, id: ConnectionId) -> bool {
        let Some(members) = self.channels.get_mut(channel) else {
            return false;
        };
        let removed = members.remove(&id);
        if members.is_empty() {
            self.channels.remove(channel);
        }
        removed
    }

    fn targets(&self, channel: &Channel, exclude: Option<ConnectionId>) -> Vec<&ConnectionHandle> {
        self.channels
            .get(channel)
            .into_iter()
            .flatten()
            .filter(|id| Some(**id) != exclude)
            .filter_map(|id| self.connections.get(id).map(|entry| &entry.handle))
            .collect()
    }
}

/// 注销连接时返回的快照，用于向离开的频道发送告别事件
#[derive(Debug, Clone)]
pub struct Departure {
    pub handle: ConnectionHandle,
    pub channels: Vec<Channel>,
}

#[derive(Default)]
pub struct RoomRegistry {
    state: RwLock<RegistryState>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handle: ConnectionHandle) {
        let mut state = self.state.write().await;
        state.connections.insert(
            handle.id,
            ConnectionEntry {
                handle,
                channels: HashSet::new(),
            },
        );
    }

    /// 注销连接并把它移出所有频道
    pub async fn unregister(&self, id: ConnectionId) -> Option<Departure> {
        let mut state = self.state.write().await;
        let entry = state.connections.remove(&id)?;
        let channels: Vec<Channel> = entry.channels.into_iter().collect();
        for channel in &channels {
            state.remove_member(channel, id);
        }
        Some(Departure {
            handle: entry.handle,
            channels,
        })
    }

    pub async fn connection(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        let state = self.state.read().await;
        state.connections.get(&id).map(|entry| entry.handle.clone())
    }

    /// 加入频道；`capacity` 为 None 表示不限
    pub async fn join(
        &self,
        channel: &Channel,
        id: ConnectionId,
        capacity: Option<usize>,
    ) -> JoinResult {
        let mut state = self.state.write().await;
        if !state.connections.contains_key(&id) {
            return JoinResult::UnknownConnection;
        }
        let current = state.channels.get(channel).map_or(0, HashSet::len);
        if state
            .channels
            .get(channel)
            .is_some_and(|members| members.contains(&id))
        {
            return JoinResult::AlreadyMember;
        }
        if capacity.is_some_and(|cap| current >= cap) {
            return JoinResult::Full;
        }
        state.channels.entry(channel.clone()).or_default().insert(id);
        if let Some(entry) = state.connections.get_mut(&id) {
            entry.channels.insert(channel.clone());
        }
        JoinResult::Joined
    }

    /// 幂等；返回是否真的移除了成员
    pub async fn leave(&self, channel: &Channel, id: ConnectionId) -> bool {
        let mut state = self.state.write().await;
        if let Some(entry) = state.connections.get_mut(&id) {
            entry.channels.remove(channel);
        }
        state.remove_member(channel, id)
    }

    /// 清空频道，返回被移出的连接
    pub async fn close_channel(&self, channel: &Channel) -> Vec<ConnectionId> {
        let mut state = self.state.write().await;
        let members: Vec<ConnectionId> = state
            .channels
            .remove(channel)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for id in &members {
            if let Some(entry) = state.connections.get_mut(id) {
                entry.channels.remove(channel);
            }
        }
        members
    }

    /// 投递给频道内除 `exclude` 之外的所有成员，返回成功投递数
    pub async fn broadcast(
        &self,
        channel: &Channel,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let event = Arc::new(event);
        let state = self.state.read().await;
        state
            .targets(channel, exclude)
            .into_iter()
            .filter(|handle| handle.deliver(Arc::clone(&event)))
            .count()
    }

    /// 点对点投递；目标必须是该频道成员
    pub async fn send_to(&self, channel: &Channel, target: ConnectionId, event: ServerEvent) -> bool {
        let state = self.state.read().await;
        let is_member = state
            .channels
            .get(channel)
            .is_some_and(|members| members.contains(&target));
        if !is_member {
            return false;
        }
        state
            .connections
            .get(&target)
            .is_some_and(|entry| entry.handle.deliver(Arc::new(event)))
    }

    /// 投递给若干频道的并集，每个连接最多收到一次
    pub async fn broadcast_union(&self, channels: &[Channel], event: ServerEvent) -> usize {
        let event = Arc::new(event);
        let state = self.state.read().await;
        let mut seen = HashSet::new();
        let mut delivered = 0;
        for channel in channels {
            for handle in state.targets(channel, None) {
                if seen.insert(handle.id) && handle.deliver(Arc::clone(&event)) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub async fn broadcast_all(&self, event: ServerEvent) -> usize {
        let event = Arc::new(event);
        let state = self.state.read().await;
        state
            .connections
            .values()
            .filter(|entry| entry.handle.deliver(Arc::clone(&event)))
            .count()
    }

    pub async fn members(&self, channel: &Channel) -> Vec<ConnectionHandle> {
        let state = self.state.read().await;
        state
            .targets(channel, None)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn member_count(&self, channel: &Channel) -> usize {
        let state = self.state.read().await;
        state.channels.get(channel).map_or(0, HashSet::len)
    }

    pub async fn is_member(&self, channel: &Channel, id: ConnectionId) -> bool {
        let state = self.state.read().await;
        state
            .channels
            .get(channel)
            .is_some_and(|members| members.contains(&id))
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use domain::{UserProfile, UserRole};

    pub(crate) fn handle(name: &str) -> (ConnectionHandle, mpsc::Receiver<Arc<ServerEvent>>) {
        let (tx, rx) = mpsc::channel(8);
        let identity = Identity::Authenticated(UserProfile::new(
            UserId::generate(),
            name,
            UserRole::User,
        ));
        (ConnectionHandle::new(ConnectionId::generate(), identity, tx), rx)
    }

    fn general() -> Channel {
        Channel::Chat(RoomSlug::parse("general").unwrap())
    }

    fn status(msg: &str) -> ServerEvent {
        ServerEvent::Status { msg: msg.into() }
    }

    #[tokio::test]
    async fn broadcast_skips_excluded_connection() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = handle("a");
        let (b, mut rx_b) = handle("b");
        registry.register(a.clone()).await;
        registry.register(b.clone()).await;
        assert_eq!(registry.join(&general(), a.id, None).await, JoinResult::Joined);
        assert_eq!(registry.join(&general(), b.id, None).await, JoinResult::Joined);
        assert_eq!(
            registry.join(&general(), b.id, None).await,
            JoinResult::AlreadyMember
        );

        let delivered = registry.broadcast(&general(), status("hi"), Some(a.id)).await;
        assert_eq!(delivered, 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap().name(), "status");
    }

    #[tokio::test]
    async fn unregister_leaves_every_channel() {
        let registry = RoomRegistry::new();
        let (a, _rx) = handle("a");
        registry.register(a.clone()).await;
        let call = Channel::Call(CallId::generate());
        registry.join(&general(), a.id, None).await;
        registry.join(&call, a.id, None).await;

        let departure = registry.unregister(a.id).await.unwrap();
        assert_eq!(departure.channels.len(), 2);
        assert_eq!(registry.member_count(&general()).await, 0);
        assert_eq!(registry.member_count(&call).await, 0);
        assert!(registry.unregister(a.id).await.is_none());
        assert_eq!(
            registry.join(&general(), a.id, None).await,
            JoinResult::UnknownConnection
        );
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let registry = RoomRegistry::new();
        let call = Channel::Call(CallId::generate());
        let (a, _ra) = handle("a");
        let (b, _rb) = handle("b");
        registry.register(a.clone()).await;
        registry.register(b.clone()).await;
        assert_eq!(registry.join(&call, a.id, Some(1)).await, JoinResult::Joined);
        assert_eq!(registry.join(&call, b.id, Some(1)).await, JoinResult::Full);
    }

    #[tokio::test]
    async fn send_to_requires_membership() {
        let registry = RoomRegistry::new();
        let call = Channel::Call(CallId::generate());
        let (a, mut rx_a) = handle("a");
        registry.register(a.clone()).await;
        assert!(!registry.send_to(&call, a.id, status("x")).await);
        registry.join(&call, a.id, None).await;
        assert!(registry.send_to(&call, a.id, status("x")).await);
        assert!(rx_a.try_recv().is_ok());
    }

    #[tokio::test]
    async fn union_delivers_once_per_connection() {
        let registry = RoomRegistry::new();
        let call = Channel::Call(CallId::generate());
        let (a, mut rx_a) = handle("a");
        registry.register(a.clone()).await;
        registry.join(&general(), a.id, None).await;
        registry.join(&call, a.id, None).await;

        let delivered = registry
            .broadcast_union(&[general(), call.clone()], status("bye"))
            .await;
        assert_eq!(delivered, 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());

        let removed = registry.close_channel(&call).await;
        assert_eq!(removed, vec![a.id]);
        assert!(!registry.is_member(&call, a.id).await);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let slow = ConnectionHandle::new(ConnectionId::generate(), Identity::Anonymous, tx);
        registry.register(slow.clone()).await;
        registry.join(&general(), slow.id, None).await;

        assert_eq!(registry.broadcast(&general(), status("1"), None).await, 1);
        assert_eq!(registry.broadcast(&general(), status("2"), None).await, 0);
    }
}

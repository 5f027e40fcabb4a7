use async_trait::async_trait;
use domain::{Call, CallId, ChatRoom, Message, RepositoryError, RoomSlug, Timestamp, UserId, UserProfile};

#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// slug 已存在时返回 `RepositoryError::Conflict`
    async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError>;
    async fn find_by_slug(&self, slug: &RoomSlug) -> Result<Option<ChatRoom>, RepositoryError>;
    /// 按创建时间倒序
    async fn list_newest_first(&self) -> Result<Vec<ChatRoom>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn save(&self, message: Message) -> Result<(), RepositoryError>;

    /// 房间最近的消息，按时间倒序（最新在前）
    async fn list_latest(&self, room: &RoomSlug, limit: u32) -> Result<Vec<Message>, RepositoryError>;

    async fn count_by_room(&self, room: &RoomSlug) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait CallRepository: Send + Sync {
    /// 同一聊天室已有进行中的通话时返回 `RepositoryError::Conflict`
    async fn create(&self, call: Call) -> Result<Call, RepositoryError>;
    async fn find_by_id(&self, id: CallId) -> Result<Option<Call>, RepositoryError>;
    async fn find_active_by_chat_room(&self, room: &RoomSlug) -> Result<Option<Call>, RepositoryError>;
    /// 仅当通话仍为 active 时生效；返回是否发生了状态迁移
    async fn mark_ended(&self, id: CallId, ended_at: Timestamp) -> Result<bool, RepositoryError>;
    /// 按创建时间倒序
    async fn list_active(&self) -> Result<Vec<Call>, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn upsert(&self, profile: &UserProfile, seen_at: Timestamp) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError>;
}

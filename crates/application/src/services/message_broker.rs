use std::sync::Arc;

use domain::{
    display_timestamp, validate_content, ChatBroadcast, ChatEvent, FileDescriptor, Identity,
    Message, MessageKind, RoomSlug, ServerEvent, ANONYMOUS_NAME,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    notifications::NotificationBus,
    registry::{Channel, RoomRegistry},
    repository::MessageRepository,
    services::room_service::RoomService,
    storage::{BlobStore, UploadPolicy},
};

/// 历史记录条数：未指定时取 `default`，上限 `max`
#[derive(Debug, Clone, Copy)]
pub struct HistoryLimits {
    pub default: u32,
    pub max: u32,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            default: 50,
            max: 100,
        }
    }
}

impl HistoryLimits {
    pub fn clamp(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.default).clamp(1, self.max)
    }
}

/// 一次投递的结果
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub broadcast: ChatBroadcast,
    /// 匿名消息或写库失败时为 false
    pub persisted: bool,
    pub recipients: usize,
}

pub struct MessageBrokerDependencies {
    pub rooms: Arc<RoomService>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub registry: Arc<RoomRegistry>,
    pub blob_store: Arc<dyn BlobStore>,
    pub upload_policy: UploadPolicy,
    pub clock: Arc<dyn Clock>,
    pub notifications: NotificationBus,
    pub history: HistoryLimits,
}

pub struct MessageBroker {
    deps: MessageBrokerDependencies,
}

impl MessageBroker {
    pub fn new(deps: MessageBrokerDependencies) -> Self {
        Self { deps }
    }

    pub async fn post_message(
        &self,
        sender: &Identity,
        room: &RoomSlug,
        content: String,
    ) -> Result<PostedMessage, ApplicationError> {
        self.post(sender, room, content, None).await
    }

    pub async fn post_file(
        &self,
        sender: &Identity,
        room: &RoomSlug,
        caption: String,
        file: FileDescriptor,
    ) -> Result<PostedMessage, ApplicationError> {
        self.post(sender, room, caption, Some(file)).await
    }

    /// 先校验权限和文件，再交给附件存储，最后作为文件消息投递
    pub async fn post_upload(
        &self,
        sender: &Identity,
        room: &RoomSlug,
        caption: String,
        original_name: &str,
        bytes: Vec<u8>,
    ) -> Result<PostedMessage, ApplicationError> {
        self.deps.rooms.authorize(sender, room).await?;
        let upload = self.deps.upload_policy.check(original_name, bytes)?;
        let descriptor = self.deps.blob_store.store(upload).await?;
        tracing::info!(room = %room, url = %descriptor.url, "附件已保存");
        self.post(sender, room, caption, Some(descriptor)).await
    }

    /// 按时间正序返回最近的消息
    pub async fn list_recent(
        &self,
        reader: &Identity,
        room: &RoomSlug,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ApplicationError> {
        self.deps.rooms.authorize(reader, room).await?;
        let limit = self.deps.history.clamp(limit);
        let mut messages = self
            .deps
            .message_repository
            .list_latest(room, limit)
            .await?;
        messages.reverse();
        Ok(messages)
    }

    pub async fn count(&self, room: &RoomSlug) -> Result<u64, ApplicationError> {
        Ok(self.deps.message_repository.count_by_room(room).await?)
    }

    async fn post(
        &self,
        sender: &Identity,
        room: &RoomSlug,
        content: String,
        file: Option<FileDescriptor>,
    ) -> Result<PostedMessage, ApplicationError> {
        self.deps.rooms.authorize(sender, room).await?;
        let now = self.deps.clock.now();

        let (broadcast, persisted) = match sender.profile() {
            Some(profile) => {
                let message = match file {
                    Some(file) => Message::file(
                        room.clone(),
                        profile.id,
                        profile.username.clone(),
                        content,
                        file,
                        now,
                    )?,
                    None => Message::text(
                        room.clone(),
                        profile.id,
                        profile.username.clone(),
                        content,
                        now,
                    )?,
                };
                let broadcast = ChatBroadcast::from_message(&message);
                // 写库失败不影响实时广播
                let persisted = match self.deps.message_repository.save(message.clone()).await {
                    Ok(()) => {
                        self.deps
                            .notifications
                            .publish(ChatEvent::MessagePosted(message))
                            .await;
                        true
                    }
                    Err(err) => {
                        tracing::warn!(
                            room = %room,
                            message_id = %message.id,
                            error = %err,
                            "消息持久化失败，仍然广播"
                        );
                        false
                    }
                };
                (broadcast, persisted)
            }
            None => {
                let kind = if file.is_some() {
                    MessageKind::File
                } else {
                    MessageKind::Text
                };
                let content = validate_content(content, file.is_some())?;
                let broadcast = ChatBroadcast {
                    message: content,
                    username: ANONYMOUS_NAME.to_owned(),
                    timestamp: display_timestamp(&now),
                    message_type: kind,
                    file,
                };
                (broadcast, false)
            }
        };

        let recipients = self
            .deps
            .registry
            .broadcast(
                &Channel::Chat(room.clone()),
                ServerEvent::ReceiveMessage(broadcast.clone()),
                None,
            )
            .await;

        Ok(PostedMessage {
            broadcast,
            persisted,
            recipients,
        })
    }
}

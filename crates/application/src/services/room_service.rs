use std::sync::Arc;

use domain::{
    ChatEvent, ChatRoom, DomainError, Identity, RepositoryError, RoomSlug, RoomVisibility,
    ServerEvent, UserProfile,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    locks::KeyedLocks,
    notifications::NotificationBus,
    registry::{Channel, ConnectionHandle, JoinResult, RoomRegistry},
    repository::RoomRepository,
};

#[derive(Debug, Clone)]
pub struct CreateRoomRequest {
    pub name: String,
    pub description: String,
    pub visibility: RoomVisibility,
}

/// create-or-find 的结果；`created` 为 false 表示返回的是已有房间
#[derive(Debug, Clone)]
pub struct RoomCreation {
    pub room: ChatRoom,
    pub created: bool,
}

pub struct RoomServiceDependencies {
    pub room_repository: Arc<dyn RoomRepository>,
    pub registry: Arc<RoomRegistry>,
    pub clock: Arc<dyn Clock>,
    pub notifications: NotificationBus,
}

pub struct RoomService {
    deps: RoomServiceDependencies,
    creation_locks: KeyedLocks<RoomSlug>,
}

impl RoomService {
    pub fn new(deps: RoomServiceDependencies) -> Self {
        Self {
            deps,
            creation_locks: KeyedLocks::new(),
        }
    }

    /// 系统默认房间优先，其次是持久化的用户房间
    pub async fn resolve(&self, slug: &RoomSlug) -> Result<ChatRoom, ApplicationError> {
        if let Some(room) = ChatRoom::system_default(slug) {
            return Ok(room);
        }
        self.deps
            .room_repository
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| DomainError::RoomNotFound.into())
    }

    /// 解析房间并检查私有房间的访问权限
    pub async fn authorize(
        &self,
        identity: &Identity,
        slug: &RoomSlug,
    ) -> Result<ChatRoom, ApplicationError> {
        let room = self.resolve(slug).await?;
        if !room.permits(identity) {
            return Err(DomainError::permission_denied("private room").into());
        }
        Ok(room)
    }

    pub async fn create_room(
        &self,
        creator: &UserProfile,
        request: CreateRoomRequest,
    ) -> Result<RoomCreation, ApplicationError> {
        let candidate = ChatRoom::new_user_room(
            request.name,
            request.description,
            request.visibility,
            creator.id,
            self.deps.clock.now(),
        )?;

        if let Some(room) = ChatRoom::system_default(&candidate.slug) {
            return Ok(RoomCreation {
                room,
                created: false,
            });
        }

        let _guard = self.creation_locks.lock(&candidate.slug).await;
        if let Some(room) = self
            .deps
            .room_repository
            .find_by_slug(&candidate.slug)
            .await?
        {
            tracing::debug!(room = %room.slug, "房间已存在，返回已有房间");
            return Ok(RoomCreation {
                room,
                created: false,
            });
        }

        match self.deps.room_repository.create(candidate.clone()).await {
            Ok(room) => {
                tracing::info!(room = %room.slug, owner = %creator.id, "房间已创建");
                self.deps
                    .notifications
                    .publish(ChatEvent::RoomCreated(room.clone()))
                    .await;
                Ok(RoomCreation {
                    room,
                    created: true,
                })
            }
            // 其他进程抢先写入了同名房间
            Err(RepositoryError::Conflict) => {
                let room = self
                    .deps
                    .room_repository
                    .find_by_slug(&candidate.slug)
                    .await?
                    .ok_or(RepositoryError::NotFound)?;
                Ok(RoomCreation {
                    room,
                    created: false,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// 默认房间在前，其余按创建时间倒序
    pub async fn list_rooms(&self) -> Result<Vec<ChatRoom>, ApplicationError> {
        let mut rooms = ChatRoom::system_defaults();
        rooms.extend(self.deps.room_repository.list_newest_first().await?);
        Ok(rooms)
    }

    /// 加入聊天室；首次加入时向其他成员宣布
    pub async fn join_chat(
        &self,
        connection: &ConnectionHandle,
        slug: &RoomSlug,
    ) -> Result<JoinResult, ApplicationError> {
        self.authorize(&connection.identity, slug).await?;
        let channel = Channel::Chat(slug.clone());
        let result = self.deps.registry.join(&channel, connection.id, None).await;
        if result == JoinResult::Joined {
            self.deps
                .registry
                .broadcast(
                    &channel,
                    ServerEvent::UserJoined {
                        username: connection.display_name().to_owned(),
                    },
                    Some(connection.id),
                )
                .await;
            tracing::debug!(room = %slug, connection_id = %connection.id, "加入聊天室");
        }
        Ok(result)
    }

    /// 幂等；只有真正离开时才通知剩余成员
    pub async fn leave_chat(&self, connection: &ConnectionHandle, slug: &RoomSlug) -> bool {
        let channel = Channel::Chat(slug.clone());
        let removed = self.deps.registry.leave(&channel, connection.id).await;
        if removed {
            self.deps
                .registry
                .broadcast(
                    &channel,
                    ServerEvent::UserLeft {
                        username: connection.display_name().to_owned(),
                    },
                    None,
                )
                .await;
        }
        removed
    }
}

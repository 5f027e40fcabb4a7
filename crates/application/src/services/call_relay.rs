use std::sync::Arc;

use domain::{
    Call, CallEventKind, CallEventPayload, CallId, CallNotice, ChatEvent, DomainError, EndOutcome,
    Identity, RepositoryError, RoomSlug, ServerEvent, Signal, UserProfile,
    DEFAULT_MAX_PARTICIPANTS,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    locks::KeyedLocks,
    notifications::NotificationBus,
    registry::{Channel, ConnectionHandle, JoinResult, RoomRegistry},
    repository::CallRepository,
    services::room_service::RoomService,
};

#[derive(Debug, Clone, Copy)]
pub struct CallSettings {
    pub default_max_participants: u32,
    /// 结束通知是否投递给所有连接；关闭时只投递给关联聊天室和通话成员
    pub broadcast_end_globally: bool,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            default_max_participants: DEFAULT_MAX_PARTICIPANTS,
            broadcast_end_globally: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateCallRequest {
    pub title: String,
    pub description: String,
    pub chat_room: Option<RoomSlug>,
    pub max_participants: Option<u32>,
}

/// create-or-find 的结果
#[derive(Debug, Clone)]
pub struct CallCreation {
    pub call: Call,
    pub created: bool,
}

pub struct CallRelayDependencies {
    pub call_repository: Arc<dyn CallRepository>,
    pub rooms: Arc<RoomService>,
    pub registry: Arc<RoomRegistry>,
    pub clock: Arc<dyn Clock>,
    pub notifications: NotificationBus,
    pub settings: CallSettings,
}

pub struct CallRelay {
    deps: CallRelayDependencies,
    room_locks: KeyedLocks<RoomSlug>,
    call_locks: KeyedLocks<CallId>,
}

impl CallRelay {
    pub fn new(deps: CallRelayDependencies) -> Self {
        Self {
            deps,
            room_locks: KeyedLocks::new(),
            call_locks: KeyedLocks::new(),
        }
    }

    /// 关联聊天室已有进行中的通话时直接返回它
    pub async fn create_call(
        &self,
        host: &UserProfile,
        request: CreateCallRequest,
    ) -> Result<CallCreation, ApplicationError> {
        let host_identity = Identity::Authenticated(host.clone());
        let _guard = match &request.chat_room {
            Some(room) => {
                self.deps.rooms.authorize(&host_identity, room).await?;
                let guard = self.room_locks.lock(room).await;
                if let Some(call) = self
                    .deps
                    .call_repository
                    .find_active_by_chat_room(room)
                    .await?
                {
                    return Ok(CallCreation {
                        call,
                        created: false,
                    });
                }
                Some(guard)
            }
            None => None,
        };

        let call = Call::start(
            request.title,
            request.description,
            host.id,
            request.chat_room.clone(),
            request
                .max_participants
                .unwrap_or(self.deps.settings.default_max_participants),
            self.deps.clock.now(),
        )?;

        let call = match self.deps.call_repository.create(call).await {
            Ok(call) => call,
            Err(RepositoryError::Conflict) => {
                let Some(room) = &request.chat_room else {
                    return Err(RepositoryError::Conflict.into());
                };
                let call = self
                    .deps
                    .call_repository
                    .find_active_by_chat_room(room)
                    .await?
                    .ok_or(RepositoryError::Conflict)?;
                return Ok(CallCreation {
                    call,
                    created: false,
                });
            }
            Err(err) => {
                tracing::error!(host = %host.id, error = %err, "通话创建写库失败");
                return Err(err.into());
            }
        };

        tracing::info!(call_id = %call.id, host = %host.id, "通话已创建");
        if let Some(room) = &call.chat_room {
            let notice = CallNotice {
                video_room_id: call.id,
                chat_room: Some(room.clone()),
                title: call.title.clone(),
                host: Some(host.username.clone()),
                redirect: None,
            };
            self.deps
                .registry
                .broadcast(
                    &Channel::Chat(room.clone()),
                    ServerEvent::VideoCallAvailable(notice),
                    None,
                )
                .await;
        }
        self.deps
            .notifications
            .publish(ChatEvent::CallStarted(call.clone()))
            .await;

        Ok(CallCreation {
            call,
            created: true,
        })
    }

    pub async fn join_call(
        &self,
        connection: &ConnectionHandle,
        call_id: CallId,
    ) -> Result<JoinResult, ApplicationError> {
        let _guard = self.call_locks.lock(&call_id).await;
        let call = self.active_call(call_id).await?;
        if let Some(room) = &call.chat_room {
            self.deps.rooms.authorize(&connection.identity, room).await?;
        }

        let channel = Channel::Call(call_id);
        let capacity = usize::try_from(call.max_participants).ok();
        let result = self
            .deps
            .registry
            .join(&channel, connection.id, capacity)
            .await;
        match result {
            JoinResult::Full => return Err(DomainError::CallFull.into()),
            JoinResult::Joined => {
                let event = CallEventPayload::presence(
                    CallEventKind::UserJoined,
                    call_id,
                    connection.id,
                    connection.display_name(),
                );
                self.deps
                    .registry
                    .broadcast(&channel, ServerEvent::CallEvent(event), Some(connection.id))
                    .await;
                tracing::debug!(call_id = %call_id, connection_id = %connection.id, "加入通话");
            }
            JoinResult::AlreadyMember | JoinResult::UnknownConnection => {}
        }
        Ok(result)
    }

    pub async fn leave_call(&self, connection: &ConnectionHandle, call_id: CallId) -> bool {
        let channel = Channel::Call(call_id);
        let removed = self.deps.registry.leave(&channel, connection.id).await;
        if removed {
            let event = CallEventPayload::presence(
                CallEventKind::UserLeft,
                call_id,
                connection.id,
                connection.display_name(),
            );
            self.deps
                .registry
                .broadcast(&channel, ServerEvent::CallEvent(event), None)
                .await;
        }
        removed
    }

    /// 原样转发信令：指定 `to` 时点对点，否则发给除发送者外的所有参与者
    pub async fn relay(
        &self,
        connection: &ConnectionHandle,
        signal: Signal,
    ) -> Result<usize, ApplicationError> {
        let call_id = signal.call;
        let channel = Channel::Call(call_id);
        let _guard = self.call_locks.lock(&call_id).await;

        if !self.deps.registry.is_member(&channel, connection.id).await {
            // 通话结束时频道会被清空，这里区分出具体原因
            self.active_call(call_id).await?;
            return Err(DomainError::permission_denied("not a call participant").into());
        }

        let target = signal.to;
        let event = ServerEvent::CallEvent(CallEventPayload::signal(
            signal,
            connection.id,
            connection.display_name(),
        ));
        let delivered = match target {
            Some(target) => usize::from(self.deps.registry.send_to(&channel, target, event).await),
            None => {
                self.deps
                    .registry
                    .broadcast(&channel, event, Some(connection.id))
                    .await
            }
        };
        Ok(delivered)
    }

    /// 仅主持人可结束；写库失败视为整个操作失败
    pub async fn end_call(
        &self,
        identity: &Identity,
        call_id: CallId,
    ) -> Result<EndOutcome, ApplicationError> {
        let user = identity.user_id().ok_or(ApplicationError::Authentication)?;
        let _guard = self.call_locks.lock(&call_id).await;
        let mut call = self
            .deps
            .call_repository
            .find_by_id(call_id)
            .await?
            .ok_or(DomainError::CallNotFound)?;

        let now = self.deps.clock.now();
        if call.end(user, now)? == EndOutcome::AlreadyEnded {
            return Ok(EndOutcome::AlreadyEnded);
        }
        let transitioned = self
            .deps
            .call_repository
            .mark_ended(call_id, now)
            .await
            .map_err(|err| {
                tracing::error!(call_id = %call_id, error = %err, "通话结束写库失败");
                err
            })?;
        if !transitioned {
            return Ok(EndOutcome::AlreadyEnded);
        }

        let notice = ServerEvent::VideoCallEnded(self.ended_notice(&call));
        let channel = Channel::Call(call_id);
        if self.deps.settings.broadcast_end_globally {
            self.deps.registry.broadcast_all(notice).await;
        } else {
            let mut targets = vec![channel.clone()];
            if let Some(room) = &call.chat_room {
                targets.push(Channel::Chat(room.clone()));
            }
            self.deps.registry.broadcast_union(&targets, notice).await;
        }
        let removed = self.deps.registry.close_channel(&channel).await;
        tracing::info!(call_id = %call_id, participants = removed.len(), "通话已结束");

        self.deps
            .notifications
            .publish(ChatEvent::CallEnded(call))
            .await;
        Ok(EndOutcome::Ended)
    }

    pub async fn find_active_for_chat_room(
        &self,
        room: &RoomSlug,
    ) -> Result<Option<Call>, ApplicationError> {
        Ok(self
            .deps
            .call_repository
            .find_active_by_chat_room(room)
            .await?)
    }

    pub async fn list_active(&self) -> Result<Vec<Call>, ApplicationError> {
        Ok(self.deps.call_repository.list_active().await?)
    }

    /// 进行中的通话里调用者可以看到的部分：关联私有房间的通话只对房主和管理员可见
    pub async fn list_active_for(&self, viewer: &Identity) -> Result<Vec<Call>, ApplicationError> {
        let mut visible = Vec::new();
        for call in self.list_active().await? {
            if self.visible_to(viewer, &call).await? {
                visible.push(call);
            }
        }
        Ok(visible)
    }

    /// 带权限检查的 `get_call`
    pub async fn get_call_for(
        &self,
        viewer: &Identity,
        call_id: CallId,
    ) -> Result<Call, ApplicationError> {
        let call = self.get_call(call_id).await?;
        if let Some(room) = &call.chat_room {
            self.deps.rooms.authorize(viewer, room).await?;
        }
        Ok(call)
    }

    /// 包含已结束的通话，调用方据此决定是否重定向
    pub async fn get_call(&self, call_id: CallId) -> Result<Call, ApplicationError> {
        self.deps
            .call_repository
            .find_by_id(call_id)
            .await?
            .ok_or_else(|| DomainError::CallNotFound.into())
    }

    /// 已结束通话的重定向通知，发给仍试图加入的连接
    pub async fn redirect_notice(&self, call_id: CallId) -> Option<ServerEvent> {
        let call = self.get_call(call_id).await.ok()?;
        (!call.is_active).then(|| ServerEvent::VideoCallEnded(self.ended_notice(&call)))
    }

    pub async fn participant_count(&self, call_id: CallId) -> usize {
        self.deps
            .registry
            .member_count(&Channel::Call(call_id))
            .await
    }

    async fn visible_to(&self, viewer: &Identity, call: &Call) -> Result<bool, ApplicationError> {
        let Some(room) = &call.chat_room else {
            return Ok(true);
        };
        match self.deps.rooms.authorize(viewer, room).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_denial() || err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn ended_notice(&self, call: &Call) -> CallNotice {
        CallNotice {
            video_room_id: call.id,
            chat_room: call.chat_room.clone(),
            title: call.title.clone(),
            host: None,
            redirect: Some(call.redirect_target()),
        }
    }

    async fn active_call(&self, call_id: CallId) -> Result<Call, ApplicationError> {
        let call = self
            .deps
            .call_repository
            .find_by_id(call_id)
            .await?
            .ok_or(DomainError::CallNotFound)?;
        if !call.is_active {
            return Err(DomainError::CallEnded.into());
        }
        Ok(call)
    }
}

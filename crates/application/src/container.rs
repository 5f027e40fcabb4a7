//! 依赖注入容器
//!
//! 把仓储、附件存储和通知总线装配成一组共享同一个房间注册表的服务。
//! 传输层只需要持有容器即可。

use std::sync::Arc;

use crate::{
    clock::{Clock, SystemClock},
    gateway::Gateway,
    memory::{
        InMemoryBlobStore, InMemoryCallRepository, InMemoryMessageRepository,
        InMemoryRoomRepository, InMemoryUserRepository,
    },
    notifications::NotificationBus,
    presence::PresenceTracker,
    registry::RoomRegistry,
    repository::{CallRepository, MessageRepository, RoomRepository, UserRepository},
    services::{
        CallRelay, CallRelayDependencies, CallSettings, HistoryLimits, MessageBroker,
        MessageBrokerDependencies, RoomService, RoomServiceDependencies,
    },
    storage::{BlobStore, UploadPolicy},
};

/// 持久化协作方
#[derive(Clone)]
pub struct Repositories {
    pub rooms: Arc<dyn RoomRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub calls: Arc<dyn CallRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            rooms: Arc::new(InMemoryRoomRepository::default()),
            messages: Arc::new(InMemoryMessageRepository::default()),
            calls: Arc::new(InMemoryCallRepository::default()),
            users: Arc::new(InMemoryUserRepository::default()),
        }
    }
}

/// 容器配置
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    pub history: HistoryLimits,
    pub calls: CallSettings,
    pub upload_policy: UploadPolicy,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            history: HistoryLimits::default(),
            calls: CallSettings::default(),
            upload_policy: UploadPolicy::new(
                16 * 1024 * 1024,
                ["txt", "pdf", "png", "jpg", "jpeg", "gif", "doc", "docx", "xls", "xlsx"],
            ),
        }
    }
}

pub struct ServiceContainer {
    pub registry: Arc<RoomRegistry>,
    pub presence: Arc<PresenceTracker>,
    pub rooms: Arc<RoomService>,
    pub messages: Arc<MessageBroker>,
    pub calls: Arc<CallRelay>,
    pub gateway: Arc<Gateway>,
}

impl ServiceContainer {
    pub fn new(
        repositories: Repositories,
        blob_store: Arc<dyn BlobStore>,
        notifications: NotificationBus,
        clock: Arc<dyn Clock>,
        settings: ContainerSettings,
    ) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        let presence = Arc::new(PresenceTracker::new(
            registry.clone(),
            repositories.users.clone(),
            clock.clone(),
        ));
        let rooms = Arc::new(RoomService::new(RoomServiceDependencies {
            room_repository: repositories.rooms.clone(),
            registry: registry.clone(),
            clock: clock.clone(),
            notifications: notifications.clone(),
        }));
        let messages = Arc::new(MessageBroker::new(MessageBrokerDependencies {
            rooms: rooms.clone(),
            message_repository: repositories.messages.clone(),
            registry: registry.clone(),
            blob_store,
            upload_policy: settings.upload_policy,
            clock: clock.clone(),
            notifications: notifications.clone(),
            history: settings.history,
        }));
        let calls = Arc::new(CallRelay::new(CallRelayDependencies {
            call_repository: repositories.calls.clone(),
            rooms: rooms.clone(),
            registry: registry.clone(),
            clock,
            notifications,
            settings: settings.calls,
        }));
        let gateway = Arc::new(Gateway::new(
            presence.clone(),
            rooms.clone(),
            messages.clone(),
            calls.clone(),
        ));

        tracing::debug!("服务容器初始化完成");
        Self {
            registry,
            presence,
            rooms,
            messages,
            calls,
            gateway,
        }
    }

    /// 全内存装配，供测试和无数据库的本地运行使用
    pub fn in_memory(settings: ContainerSettings) -> Self {
        Self::new(
            Repositories::in_memory(),
            Arc::new(InMemoryBlobStore::default()),
            NotificationBus::new(),
            Arc::new(SystemClock),
            settings,
        )
    }
}

//! 应用层实现。
//!
//! 围绕领域模型的用例服务：房间注册表、在线状态、消息投递、通话信令，
//! 以及对外部协作方（持久化、附件存储、通知）的抽象。

pub mod clock;
pub mod container;
pub mod error;
pub mod gateway;
pub mod locks;
pub mod memory;
pub mod notifications;
pub mod presence;
pub mod registry;
pub mod repository;
pub mod services;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use container::{ContainerSettings, Repositories, ServiceContainer};
pub use error::ApplicationError;
pub use gateway::Gateway;
pub use notifications::{NotificationBus, NotificationObserver};
pub use presence::PresenceTracker;
pub use registry::{Channel, ConnectionHandle, JoinResult, Outbound, RoomRegistry};
pub use repository::{CallRepository, MessageRepository, RoomRepository, UserRepository};
pub use services::{
    CallCreation, CallRelay, CallSettings, CreateCallRequest, CreateRoomRequest, HistoryLimits,
    MessageBroker, PostedMessage, RoomCreation, RoomService,
};
pub use storage::{BlobStore, StorageError, UploadPolicy, UploadedFile};

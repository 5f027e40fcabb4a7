//! 并发数据一致性测试
//!
//! 验证多个任务同时创建、加入、结束时，房间和通话状态保持一致

use std::sync::Arc;

use application::{
    ApplicationError, Channel, ConnectionHandle, ContainerSettings, CreateCallRequest,
    CreateRoomRequest, JoinResult, ServiceContainer,
};
use domain::{
    ConnectionId, DomainError, EndOutcome, Identity, RoomSlug, RoomVisibility, ServerEvent,
    UserId, UserProfile, UserRole,
};
use tokio::sync::mpsc;

const TASKS: usize = 16;

/// 测试辅助结构：封装测试服务
struct TestServices {
    container: Arc<ServiceContainer>,
}

impl TestServices {
    fn new() -> Self {
        Self {
            container: Arc::new(ServiceContainer::in_memory(ContainerSettings::default())),
        }
    }

    fn profile(name: &str) -> UserProfile {
        UserProfile::new(UserId::generate(), name, UserRole::User)
    }

    /// 连接并返回句柄和事件接收端
    async fn connect(
        &self,
        profile: &UserProfile,
    ) -> (ConnectionHandle, mpsc::Receiver<Arc<ServerEvent>>) {
        let (tx, rx) = mpsc::channel(64);
        let handle = ConnectionHandle::new(
            ConnectionId::generate(),
            Identity::Authenticated(profile.clone()),
            tx,
        );
        self.container.gateway.connect(handle.clone()).await;
        (handle, rx)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_room_creation_yields_single_room() {
    let services = TestServices::new();
    let owner = TestServices::profile("owner");

    let mut tasks = Vec::new();
    for i in 0..TASKS {
        let container = services.container.clone();
        let owner = owner.clone();
        tasks.push(tokio::spawn(async move {
            container
                .rooms
                .create_room(
                    &owner,
                    CreateRoomRequest {
                        // 不同写法推导出同一个 slug
                        name: if i % 2 == 0 { "Night Owls" } else { "night  owls!" }.to_owned(),
                        description: String::new(),
                        visibility: RoomVisibility::Public,
                    },
                )
                .await
        }));
    }

    let mut created = 0;
    for task in tasks {
        let creation = task.await.unwrap().unwrap();
        assert_eq!(creation.room.slug.as_str(), "night-owls");
        created += usize::from(creation.created);
    }
    assert_eq!(created, 1);

    let rooms = services.container.rooms.list_rooms().await.unwrap();
    let persisted = rooms.iter().filter(|room| !room.is_system()).count();
    assert_eq!(persisted, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_call_creation_yields_single_active_call() {
    let services = TestServices::new();
    let room = RoomSlug::parse("general").unwrap();

    let mut tasks = Vec::new();
    for i in 0..TASKS {
        let container = services.container.clone();
        let host = TestServices::profile(&format!("host{i}"));
        let room = room.clone();
        tasks.push(tokio::spawn(async move {
            container
                .calls
                .create_call(
                    &host,
                    CreateCallRequest {
                        title: format!("call {i}"),
                        chat_room: Some(room),
                        ..CreateCallRequest::default()
                    },
                )
                .await
        }));
    }

    let mut ids = Vec::new();
    let mut created = 0;
    for task in tasks {
        let creation = task.await.unwrap().unwrap();
        created += usize::from(creation.created);
        ids.push(creation.call.id);
    }
    assert_eq!(created, 1);
    ids.dedup();
    assert_eq!(ids.len(), 1);

    let active = services.container.calls.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_end_transitions_once() {
    let services = TestServices::new();
    let host = TestServices::profile("host");
    let call = services
        .container
        .calls
        .create_call(
            &host,
            CreateCallRequest {
                title: "retro".to_owned(),
                ..CreateCallRequest::default()
            },
        )
        .await
        .unwrap()
        .call;

    let mut tasks = Vec::new();
    for _ in 0..TASKS {
        let container = services.container.clone();
        let identity = Identity::Authenticated(host.clone());
        tasks.push(tokio::spawn(async move {
            container.calls.end_call(&identity, call.id).await
        }));
    }

    let mut ended = 0;
    for task in tasks {
        if task.await.unwrap().unwrap() == EndOutcome::Ended {
            ended += 1;
        }
    }
    assert_eq!(ended, 1);

    let stored = services.container.calls.get_call(call.id).await.unwrap();
    assert!(!stored.is_active);
    assert!(stored.ended_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_respect_call_capacity() {
    let services = TestServices::new();
    let host = TestServices::profile("host");
    let call = services
        .container
        .calls
        .create_call(
            &host,
            CreateCallRequest {
                title: "small".to_owned(),
                max_participants: Some(3),
                ..CreateCallRequest::default()
            },
        )
        .await
        .unwrap()
        .call;

    let mut receivers = Vec::new();
    let mut tasks = Vec::new();
    for i in 0..10 {
        let (handle, rx) = services
            .connect(&TestServices::profile(&format!("guest{i}")))
            .await;
        receivers.push(rx);
        let container = services.container.clone();
        tasks.push(tokio::spawn(async move {
            container.calls.join_call(&handle, call.id).await
        }));
    }

    let mut joined = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(JoinResult::Joined) => joined += 1,
            Err(ApplicationError::Domain(DomainError::CallFull)) => refused += 1,
            other => panic!("unexpected join result: {other:?}"),
        }
    }
    assert_eq!(joined, 3);
    assert_eq!(refused, 7);
    assert_eq!(services.container.calls.participant_count(call.id).await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connect_disconnect_leaves_no_members() {
    let services = TestServices::new();
    let room = RoomSlug::parse("general").unwrap();

    let mut tasks = Vec::new();
    for i in 0..TASKS {
        let container = services.container.clone();
        let profile = TestServices::profile(&format!("user{i}"));
        let room = room.clone();
        tasks.push(tokio::spawn(async move {
            let (tx, _rx) = mpsc::channel(64);
            let handle = ConnectionHandle::new(
                ConnectionId::generate(),
                Identity::Authenticated(profile),
                tx,
            );
            container.gateway.connect(handle.clone()).await;
            container.rooms.join_chat(&handle, &room).await.unwrap();
            container.gateway.disconnect(handle.id).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(services.container.presence.connection_count().await, 0);
    assert!(services
        .container
        .registry
        .members(&Channel::Chat(room))
        .await
        .is_empty());
}

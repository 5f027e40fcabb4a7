//! 内存版仓储与附件存储
//!
//! 用于服务层测试、端到端测试，以及未配置数据库时的本地运行。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use domain::{
    Call, CallId, ChatRoom, FileDescriptor, Message, RepositoryError, RoomSlug, Timestamp, UserId,
    UserProfile,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repository::{CallRepository, MessageRepository, RoomRepository, UserRepository};
use crate::storage::{BlobStore, StorageError, UploadedFile};

#[derive(Default)]
pub struct InMemoryRoomRepository {
    rooms: RwLock<Vec<ChatRoom>>,
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let mut rooms = self.rooms.write().await;
        if rooms.iter().any(|existing| existing.slug == room.slug) {
            return Err(RepositoryError::Conflict);
        }
        rooms.push(room.clone());
        Ok(room)
    }

    async fn find_by_slug(&self, slug: &RoomSlug) -> Result<Option<ChatRoom>, RepositoryError> {
        let rooms = self.rooms.read().await;
        Ok(rooms.iter().find(|room| &room.slug == slug).cloned())
    }

    async fn list_newest_first(&self) -> Result<Vec<ChatRoom>, RepositoryError> {
        let mut rooms = self.rooms.read().await.clone();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms)
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn save(&self, message: Message) -> Result<(), RepositoryError> {
        self.messages.write().await.push(message);
        Ok(())
    }

    async fn list_latest(&self, room: &RoomSlug, limit: u32) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut latest: Vec<Message> = messages
            .iter()
            .filter(|message| &message.room == room)
            .cloned()
            .collect();
        // 稳定排序：同一时间戳保持插入顺序
        latest.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        latest.reverse();
        latest.truncate(limit as usize);
        Ok(latest)
    }

    async fn count_by_room(&self, room: &RoomSlug) -> Result<u64, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.iter().filter(|message| &message.room == room).count() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryCallRepository {
    calls: RwLock<HashMap<CallId, Call>>,
}

#[async_trait]
impl CallRepository for InMemoryCallRepository {
    async fn create(&self, call: Call) -> Result<Call, RepositoryError> {
        let mut calls = self.calls.write().await;
        if let Some(room) = &call.chat_room {
            let taken = calls
                .values()
                .any(|existing| existing.is_active && existing.chat_room.as_ref() == Some(room));
            if taken {
                return Err(RepositoryError::Conflict);
            }
        }
        if calls.contains_key(&call.id) {
            return Err(RepositoryError::Conflict);
        }
        calls.insert(call.id, call.clone());
        Ok(call)
    }

    async fn find_by_id(&self, id: CallId) -> Result<Option<Call>, RepositoryError> {
        Ok(self.calls.read().await.get(&id).cloned())
    }

    async fn find_active_by_chat_room(&self, room: &RoomSlug) -> Result<Option<Call>, RepositoryError> {
        let calls = self.calls.read().await;
        Ok(calls
            .values()
            .find(|call| call.is_active && call.chat_room.as_ref() == Some(room))
            .cloned())
    }

    async fn mark_ended(&self, id: CallId, ended_at: Timestamp) -> Result<bool, RepositoryError> {
        let mut calls = self.calls.write().await;
        let call = calls.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if !call.is_active {
            return Ok(false);
        }
        call.is_active = false;
        call.ended_at = Some(ended_at);
        Ok(true)
    }

    async fn list_active(&self) -> Result<Vec<Call>, RepositoryError> {
        let calls = self.calls.read().await;
        let mut active: Vec<Call> = calls.values().filter(|c| c.is_active).cloned().collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, (UserProfile, Timestamp)>>,
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn upsert(&self, profile: &UserProfile, seen_at: Timestamp) -> Result<(), RepositoryError> {
        self.users
            .write()
            .await
            .insert(profile.id, (profile.clone(), seen_at));
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
        Ok(self.users.read().await.get(&id).map(|(p, _)| p.clone()))
    }
}

/// 只记录字节数的附件存储
#[derive(Default)]
pub struct InMemoryBlobStore {
    stored: RwLock<HashMap<String, Vec<u8>>>,
    writes: AtomicU64,
}

impl InMemoryBlobStore {
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub async fn get(&self, stored_name: &str) -> Option<Vec<u8>> {
        self.stored.read().await.get(stored_name).cloned()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn store(&self, file: UploadedFile) -> Result<FileDescriptor, StorageError> {
        let stored_name = format!("{}.{}", Uuid::new_v4(), file.extension);
        self.stored
            .write()
            .await
            .insert(stored_name.clone(), file.bytes);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(FileDescriptor {
            url: format!("/uploads/chat/{stored_name}"),
            filename: file.original_name,
            extension: file.extension,
        })
    }
}

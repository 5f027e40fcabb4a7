use std::sync::Arc;

use application::repository::{CallRepository, MessageRepository, RoomRepository, UserRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Call, CallId, ChatRoom, FileDescriptor, Message, MessageId, MessageKind, RepositoryError,
    RoomSlug, Timestamp, UserId, UserProfile, UserRole,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    let unique_violation = err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if unique_violation {
        RepositoryError::Conflict
    } else {
        RepositoryError::storage(err.to_string())
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    slug: String,
    display_name: String,
    description: String,
    is_private: bool,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<RoomRecord> for ChatRoom {
    type Error = RepositoryError;

    fn try_from(value: RoomRecord) -> Result<Self, Self::Error> {
        let slug = RoomSlug::parse(value.slug).map_err(|err| invalid_data(err.to_string()))?;
        Ok(ChatRoom {
            slug,
            display_name: value.display_name,
            description: value.description,
            is_private: value.is_private,
            owner_id: Some(UserId::from(value.owner_id)),
            created_at: Some(value.created_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    room_slug: String,
    sender_id: Uuid,
    sender_name: String,
    content: String,
    message_type: String,
    file_url: Option<String>,
    file_name: Option<String>,
    file_extension: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let room = RoomSlug::parse(value.room_slug).map_err(|err| invalid_data(err.to_string()))?;
        let kind =
            MessageKind::parse(&value.message_type).map_err(|err| invalid_data(err.to_string()))?;
        let file = match (value.file_url, value.file_name) {
            (Some(url), Some(filename)) => Some(FileDescriptor {
                url,
                filename,
                extension: value.file_extension.unwrap_or_default(),
            }),
            _ => None,
        };
        Ok(Message {
            id: MessageId::from(value.id),
            room,
            sender_id: UserId::from(value.sender_id),
            sender_name: value.sender_name,
            content: value.content,
            kind,
            file,
            timestamp: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CallRecord {
    id: Uuid,
    title: String,
    description: String,
    host_id: Uuid,
    chat_room: Option<String>,
    is_active: bool,
    max_participants: i32,
    created_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<CallRecord> for Call {
    type Error = RepositoryError;

    fn try_from(value: CallRecord) -> Result<Self, Self::Error> {
        let chat_room = value
            .chat_room
            .map(RoomSlug::parse)
            .transpose()
            .map_err(|err| invalid_data(err.to_string()))?;
        let max_participants = u32::try_from(value.max_participants)
            .map_err(|_| invalid_data("negative max_participants"))?;
        Ok(Call {
            id: CallId::from(value.id),
            title: value.title,
            description: value.description,
            host_id: UserId::from(value.host_id),
            chat_room,
            is_active: value.is_active,
            max_participants,
            created_at: value.created_at,
            ended_at: value.ended_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    role: String,
}

impl From<UserRecord> for UserProfile {
    fn from(value: UserRecord) -> Self {
        UserProfile::new(
            UserId::from(value.id),
            value.username,
            UserRole::parse(&value.role),
        )
    }
}

const ROOM_COLUMNS: &str = "slug, display_name, description, is_private, owner_id, created_at";
const CALL_COLUMNS: &str =
    "id, title, description, host_id, chat_room, is_active, max_participants, created_at, ended_at";

#[derive(Clone)]
pub struct PgRoomRepository {
    pool: PgPool,
}

impl PgRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomRepository for PgRoomRepository {
    async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let owner_id = room
            .owner_id
            .ok_or_else(|| invalid_data("system rooms are not persisted"))?;
        let created_at = room.created_at.unwrap_or_else(Utc::now);
        let record = sqlx::query_as::<_, RoomRecord>(&format!(
            r#"
            INSERT INTO chat_rooms (slug, display_name, description, is_private, owner_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ROOM_COLUMNS}
            "#
        ))
        .bind(room.slug.as_str())
        .bind(&room.display_name)
        .bind(&room.description)
        .bind(room.is_private)
        .bind(Uuid::from(owner_id))
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        ChatRoom::try_from(record)
    }

    async fn find_by_slug(&self, slug: &RoomSlug) -> Result<Option<ChatRoom>, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>(&format!(
            "SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE slug = $1"
        ))
        .bind(slug.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(ChatRoom::try_from).transpose()
    }

    async fn list_newest_first(&self) -> Result<Vec<ChatRoom>, RepositoryError> {
        let records = sqlx::query_as::<_, RoomRecord>(&format!(
            "SELECT {ROOM_COLUMNS} FROM chat_rooms ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(ChatRoom::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn save(&self, message: Message) -> Result<(), RepositoryError> {
        let file = message.file.as_ref();
        sqlx::query(
            r#"
            INSERT INTO messages (id, room_slug, sender_id, sender_name, content, message_type,
                                  file_url, file_name, file_extension, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(message.room.as_str())
        .bind(Uuid::from(message.sender_id))
        .bind(&message.sender_name)
        .bind(&message.content)
        .bind(message.kind.as_str())
        .bind(file.map(|f| f.url.as_str()))
        .bind(file.map(|f| f.filename.as_str()))
        .bind(file.map(|f| f.extension.as_str()))
        .bind(message.timestamp)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn list_latest(&self, room: &RoomSlug, limit: u32) -> Result<Vec<Message>, RepositoryError> {
        // 用户名以用户目录为准，目录缺失时退回发送时的快照
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT m.id, m.room_slug, m.sender_id,
                   COALESCE(u.username, m.sender_name) AS sender_name,
                   m.content, m.message_type, m.file_url, m.file_name, m.file_extension,
                   m.created_at
            FROM messages m
            LEFT JOIN users u ON u.id = m.sender_id
            WHERE m.room_slug = $1
            ORDER BY m.created_at DESC, m.seq DESC
            LIMIT $2
            "#,
        )
        .bind(room.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }

    async fn count_by_room(&self, room: &RoomSlug) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE room_slug = $1")
            .bind(room.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[derive(Clone)]
pub struct PgCallRepository {
    pool: PgPool,
}

impl PgCallRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallRepository for PgCallRepository {
    async fn create(&self, call: Call) -> Result<Call, RepositoryError> {
        let max_participants = i32::try_from(call.max_participants)
            .map_err(|_| invalid_data("max_participants out of range"))?;
        // 部分唯一索引保证同一聊天室只有一个进行中的通话
        let record = sqlx::query_as::<_, CallRecord>(&format!(
            r#"
            INSERT INTO calls (id, title, description, host_id, chat_room, is_active,
                               max_participants, created_at, ended_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(Uuid::from(call.id))
        .bind(&call.title)
        .bind(&call.description)
        .bind(Uuid::from(call.host_id))
        .bind(call.chat_room.as_ref().map(RoomSlug::as_str))
        .bind(call.is_active)
        .bind(max_participants)
        .bind(call.created_at)
        .bind(call.ended_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Call::try_from(record)
    }

    async fn find_by_id(&self, id: CallId) -> Result<Option<Call>, RepositoryError> {
        let record = sqlx::query_as::<_, CallRecord>(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Call::try_from).transpose()
    }

    async fn find_active_by_chat_room(&self, room: &RoomSlug) -> Result<Option<Call>, RepositoryError> {
        let record = sqlx::query_as::<_, CallRecord>(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE chat_room = $1 AND is_active LIMIT 1"
        ))
        .bind(room.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Call::try_from).transpose()
    }

    async fn mark_ended(&self, id: CallId, ended_at: Timestamp) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE calls SET is_active = FALSE, ended_at = $2 WHERE id = $1 AND is_active",
        )
        .bind(Uuid::from(id))
        .bind(ended_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM calls WHERE id = $1)")
            .bind(Uuid::from(id))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        if exists {
            Ok(false)
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    async fn list_active(&self) -> Result<Vec<Call>, RepositoryError> {
        let records = sqlx::query_as::<_, CallRecord>(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE is_active ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Call::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn upsert(&self, profile: &UserProfile, seen_at: Timestamp) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, role, created_at, last_seen)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (id) DO UPDATE
            SET username = EXCLUDED.username, role = EXCLUDED.role, last_seen = EXCLUDED.last_seen
            "#,
        )
        .bind(Uuid::from(profile.id))
        .bind(&profile.username)
        .bind(profile.role.as_str())
        .bind(seen_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, role FROM users WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(UserProfile::from))
    }
}

/// 所有 PostgreSQL 仓储，共享同一个连接池
#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub room_repository: Arc<PgRoomRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub call_repository: Arc<PgCallRepository>,
    pub user_repository: Arc<PgUserRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            room_repository: Arc::new(PgRoomRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            call_repository: Arc::new(PgCallRepository::new(pool.clone())),
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            pool,
        }
    }

    pub fn repositories(&self) -> application::Repositories {
        application::Repositories {
            rooms: self.room_repository.clone(),
            messages: self.message_repository.clone(),
            calls: self.call_repository.clone(),
            users: self.user_repository.clone(),
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

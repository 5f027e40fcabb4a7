//! 通话实体
//!
//! 生命周期：创建即 active，仅主持人可结束，结束后为终态。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{CallId, RoomSlug, Timestamp, UserId};

pub const DEFAULT_MAX_PARTICIPANTS: u32 = 10;
pub const MAX_PARTICIPANTS_RANGE: std::ops::RangeInclusive<u32> = 2..=50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub title: String,
    pub description: String,
    pub host_id: UserId,
    pub chat_room: Option<RoomSlug>,
    pub is_active: bool,
    pub max_participants: u32,
    pub created_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}

/// `end` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    Ended,
    /// 已经结束过，不重复打时间戳
    AlreadyEnded,
}

impl Call {
    pub fn start(
        title: impl Into<String>,
        description: impl Into<String>,
        host_id: UserId,
        chat_room: Option<RoomSlug>,
        max_participants: u32,
        created_at: Timestamp,
    ) -> DomainResult<Self> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(DomainError::invalid_argument("title", "cannot be empty"));
        }
        if title.chars().count() > 200 {
            return Err(DomainError::invalid_argument("title", "too long"));
        }
        if !MAX_PARTICIPANTS_RANGE.contains(&max_participants) {
            return Err(DomainError::invalid_argument(
                "max_participants",
                "must be between 2 and 50",
            ));
        }
        Ok(Self {
            id: CallId::generate(),
            title,
            description: description.into().trim().to_owned(),
            host_id,
            chat_room,
            is_active: true,
            max_participants,
            created_at,
            ended_at: None,
        })
    }

    pub fn is_host(&self, user_id: UserId) -> bool {
        self.host_id == user_id
    }

    /// 仅主持人可结束，通话是否已结束都一样；对主持人而言重复结束是幂等的空操作
    pub fn end(&mut self, by: UserId, now: Timestamp) -> DomainResult<EndOutcome> {
        if !self.is_host(by) {
            return Err(DomainError::permission_denied(
                "Only the host can end the call",
            ));
        }
        if !self.is_active {
            return Ok(EndOutcome::AlreadyEnded);
        }
        self.is_active = false;
        self.ended_at = Some(now);
        Ok(EndOutcome::Ended)
    }

    /// 已结束的通话应把客户端引回的位置
    pub fn redirect_target(&self) -> String {
        match &self.chat_room {
            Some(room) => format!("/chat/{room}"),
            None => "/calls".to_owned(),
        }
    }
}

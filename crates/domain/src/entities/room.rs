//! 聊天室实体

use serde::{Deserialize, Serialize};

use crate::entities::identity::Identity;
use crate::errors::DomainError;
use crate::value_objects::{RoomSlug, Timestamp, UserId};

const ROOM_NAME_MAX_LEN: usize = 200;

/// 系统默认房间：固定集合，总是公开，没有所有者，不落库。
pub const DEFAULT_ROOMS: [(&str, &str); 4] = [
    ("general", "General Discussion"),
    ("resources", "Resource Discussion"),
    ("help", "Help & Support"),
    ("announcements", "Announcements"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomVisibility {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub slug: RoomSlug,
    pub display_name: String,
    pub description: String,
    pub is_private: bool,
    /// 系统默认房间没有所有者
    pub owner_id: Option<UserId>,
    /// 系统默认房间没有创建时间
    pub created_at: Option<Timestamp>,
}

impl ChatRoom {
    /// 用户创建的房间，slug 由名称推导
    pub fn new_user_room(
        name: impl Into<String>,
        description: impl Into<String>,
        visibility: RoomVisibility,
        owner_id: UserId,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        let display_name = Self::validate_name(name.into())?;
        Ok(Self {
            slug: RoomSlug::from_name(&display_name),
            display_name,
            description: description.into().trim().to_owned(),
            is_private: visibility == RoomVisibility::Private,
            owner_id: Some(owner_id),
            created_at: Some(created_at),
        })
    }

    pub fn system_defaults() -> Vec<ChatRoom> {
        DEFAULT_ROOMS
            .iter()
            .filter_map(|(slug, name)| {
                Some(ChatRoom {
                    slug: RoomSlug::parse(*slug).ok()?,
                    display_name: (*name).to_owned(),
                    description: String::new(),
                    is_private: false,
                    owner_id: None,
                    created_at: None,
                })
            })
            .collect()
    }

    pub fn system_default(slug: &RoomSlug) -> Option<ChatRoom> {
        Self::system_defaults()
            .into_iter()
            .find(|room| &room.slug == slug)
    }

    pub fn is_system(&self) -> bool {
        self.owner_id.is_none()
    }

    pub fn visibility(&self) -> RoomVisibility {
        if self.is_private {
            RoomVisibility::Private
        } else {
            RoomVisibility::Public
        }
    }

    /// 私有房间只允许所有者或管理员进入、发言、发起通话
    pub fn permits(&self, identity: &Identity) -> bool {
        if !self.is_private {
            return true;
        }
        match identity {
            Identity::Authenticated(profile) => {
                profile.is_admin() || self.owner_id == Some(profile.id)
            }
            Identity::Anonymous => false,
        }
    }

    fn validate_name(name: String) -> Result<String, DomainError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_argument("room_name", "cannot be empty"));
        }
        if trimmed.chars().count() > ROOM_NAME_MAX_LEN {
            return Err(DomainError::invalid_argument("room_name", "too long"));
        }
        Ok(trimmed.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::identity::{UserProfile, UserRole};
    use chrono::Utc;

    fn profile(role: UserRole) -> UserProfile {
        UserProfile::new(UserId::generate(), "alice", role)
    }

    #[test]
    fn private_room_permits_owner_and_admin_only() {
        let owner = profile(UserRole::User);
        let room = ChatRoom::new_user_room(
            "Secret Plans",
            "",
            RoomVisibility::Private,
            owner.id,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(room.slug.as_str(), "secret-plans");
        assert!(room.permits(&Identity::Authenticated(owner)));
        assert!(room.permits(&Identity::Authenticated(profile(UserRole::Admin))));
        assert!(!room.permits(&Identity::Authenticated(profile(UserRole::Researcher))));
        assert!(!room.permits(&Identity::Anonymous));
    }

    #[test]
    fn system_defaults_are_public_and_ownerless() {
        let rooms = ChatRoom::system_defaults();
        assert_eq!(rooms.len(), 4);
        assert!(rooms.iter().all(|r| !r.is_private && r.is_system()));
        let general = RoomSlug::parse("general").unwrap();
        assert!(ChatRoom::system_default(&general).is_some());
    }

    #[test]
    fn blank_names_are_rejected() {
        let result = ChatRoom::new_user_room(
            "   ",
            "",
            RoomVisibility::Public,
            UserId::generate(),
            Utc::now(),
        );
        assert!(matches!(result, Err(DomainError::InvalidArgument { .. })));
    }
}

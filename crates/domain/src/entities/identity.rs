//! 连接身份
//!
//! 认证本身由外部身份服务完成，这里只描述解析后的结果。

use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 匿名连接的展示名称
pub const ANONYMOUS_NAME: &str = "Anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Researcher,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Researcher => "researcher",
            UserRole::Admin => "admin",
        }
    }

    /// 未知角色按普通用户处理
    pub fn parse(value: &str) -> Self {
        match value {
            "admin" => UserRole::Admin,
            "researcher" => UserRole::Researcher,
            _ => UserRole::User,
        }
    }
}

/// 已认证用户的档案
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub role: UserRole,
}

impl UserProfile {
    pub fn new(id: UserId, username: impl Into<String>, role: UserRole) -> Self {
        Self {
            id,
            username: username.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// 连接的身份：已认证用户或匿名（仅在显式开启的降级模式下出现）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Authenticated(UserProfile),
    Anonymous,
}

impl Identity {
    pub fn display_name(&self) -> &str {
        match self {
            Identity::Authenticated(profile) => &profile.username,
            Identity::Anonymous => ANONYMOUS_NAME,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Identity::Authenticated(profile) => Some(profile.id),
            Identity::Anonymous => None,
        }
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            Identity::Authenticated(profile) => Some(profile),
            Identity::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated(_))
    }

    pub fn is_admin(&self) -> bool {
        self.profile().is_some_and(UserProfile::is_admin)
    }
}

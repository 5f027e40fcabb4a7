use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| DomainError::invalid_argument(stringify!($name), "not a uuid"))
            }
        }
    };
}

uuid_id!(
    /// 用户唯一标识（由外部身份服务签发）。
    UserId
);
uuid_id!(
    /// 消息唯一标识。
    MessageId
);
uuid_id!(
    /// 通话标识，与聊天室 slug 属于不同的命名空间。
    CallId
);
uuid_id!(
    /// 单条传输连接的标识，仅在进程内有效。
    ConnectionId
);

const SLUG_MAX_LEN: usize = 100;

/// 聊天室标识：URL 安全的 slug，创建后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomSlug(String);

impl RoomSlug {
    /// 校验客户端传入的房间标识。
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let value = value.trim();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("room", "cannot be empty"));
        }
        if value.len() > SLUG_MAX_LEN {
            return Err(DomainError::invalid_argument("room", "too long"));
        }
        let valid = value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid || value.starts_with('-') || value.ends_with('-') {
            return Err(DomainError::invalid_argument("room", "not a valid slug"));
        }
        Ok(Self(value.to_owned()))
    }

    /// 从展示名称推导 slug：小写化，非字母数字的连续片段折叠为单个连字符，
    /// 去掉首尾连字符；结果为空时退化为随机短标识。
    ///
    /// 只保留 ASCII 字母数字，非 ASCII 字符（如 `é`、`Ω`）按分隔符处理，
    /// 保证 slug 在 URL 中无需转义。
    pub fn from_name(name: &str) -> Self {
        let mut slug = String::with_capacity(name.len());
        let mut pending_hyphen = false;
        for c in name.chars() {
            if c.is_ascii_alphanumeric() {
                if pending_hyphen && !slug.is_empty() {
                    slug.push('-');
                }
                pending_hyphen = false;
                slug.push(c.to_ascii_lowercase());
            } else {
                pending_hyphen = true;
            }
            if slug.len() >= SLUG_MAX_LEN {
                break;
            }
        }
        let slug = slug.trim_end_matches('-').to_owned();
        if slug.is_empty() {
            Self::random()
        } else {
            Self(slug)
        }
    }

    /// `room-` 加 6 位十六进制随机串。
    pub fn random() -> Self {
        let n: u32 = rand::rng().random_range(0..0x0100_0000);
        Self(format!("room-{n:06x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomSlug {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RoomSlug> for String {
    fn from(value: RoomSlug) -> Self {
        value.0
    }
}

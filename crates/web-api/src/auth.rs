//! JWT 身份解析
//!
//! 令牌由外部身份服务签发，这里只负责校验并还原出用户档案。
//! 校验失败时，只有开启匿名降级模式才会以匿名身份放行。

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use domain::{Identity, UserId, UserProfile, UserRole};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    /// 未知角色按普通用户处理
    #[serde(default)]
    pub role: String,
    pub exp: i64,
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// 签发令牌；生产环境由身份服务完成，这里供测试和运维脚本使用
    pub fn issue_token(
        &self,
        profile: &UserProfile,
        ttl: chrono::Duration,
    ) -> Result<String, ApiError> {
        let claims = Claims {
            sub: profile.id.into(),
            username: profile.username.clone(),
            role: profile.role.as_str().to_owned(),
            exp: (chrono::Utc::now() + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::internal_server_error(format!("Token generation failed: {err}")))
    }

    /// 验证并解析 JWT token
    pub fn verify_token(&self, token: &str) -> Result<UserProfile, ApiError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| ApiError::unauthorized(format!("Invalid token: {err}")))?;
        if claims.username.trim().is_empty() {
            return Err(ApiError::unauthorized("Token has no username"));
        }
        Ok(UserProfile::new(
            UserId::from(claims.sub),
            claims.username,
            UserRole::parse(&claims.role),
        ))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

/// 解析连接身份：优先 `?token=`，其次 Bearer 头
pub fn resolve_identity(
    state: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<Identity, ApiError> {
    let token = query_token
        .filter(|token| !token.is_empty())
        .or_else(|| bearer_token(headers));

    let result = match token {
        Some(token) => state.jwt_service.verify_token(token),
        None => Err(ApiError::unauthorized("Missing authorization token")),
    };

    match result {
        Ok(profile) => Ok(Identity::Authenticated(profile)),
        Err(_) if state.settings.allow_anonymous => Ok(Identity::Anonymous),
        Err(err) => Err(err),
    }
}

/// 必须是已认证用户
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserProfile);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;
        state.jwt_service.verify_token(token).map(AuthUser)
    }
}

/// 已认证用户，或匿名模式下的匿名访客
#[derive(Debug, Clone)]
pub struct Viewer(pub Identity);

impl FromRequestParts<AppState> for Viewer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve_identity(state, &parts.headers, None).map(Viewer)
    }
}

//! Web API 层。
//!
//! 提供 Axum 路由：WebSocket 升级与连接主循环、JWT 身份解析，
//! 以及历史消息、房间、通话和附件上传等 HTTP 端点。

mod auth;
mod dto;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{resolve_identity, AuthUser, Claims, JwtService, Viewer};
pub use dto::{CallView, MessageView, RoomView};
pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::{AppState, WebSettings};
pub use ws_connection::WebSocketConnection;

use axum::{
    extract::{ws::WebSocketUpgrade, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use uuid::Uuid;

use application::{CreateCallRequest, CreateRoomRequest};
use domain::{CallId, ChatBroadcast, EndOutcome, RoomSlug, RoomVisibility};

use crate::{
    auth::{resolve_identity, AuthUser, Viewer},
    dto::{CallView, MessageView, RoomView},
    error::ApiError,
    state::AppState,
    ws_connection::WebSocketConnection,
};

/// multipart 边界和表单字段的额外开销
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct CreateRoomPayload {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    visibility: RoomVisibility,
}

#[derive(Debug, Deserialize)]
struct CreateCallPayload {
    title: String,
    #[serde(default)]
    description: String,
    chat_room: Option<String>,
    max_participants: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    room: String,
    messages: Vec<MessageView>,
}

#[derive(Debug, Serialize)]
struct OnlineResponse {
    room: String,
    users: Vec<String>,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: ChatBroadcast,
    persisted: bool,
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes(&state));

    if let Some(dir) = &state.settings.upload_dir {
        router = router.nest_service(&state.settings.public_upload_url, ServeDir::new(dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes(state: &AppState) -> Router<AppState> {
    let upload_limit = state.settings.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{room}/messages", get(get_history))
        .route(
            "/rooms/{room}/files",
            post(upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/rooms/{room}/online", get(online_users))
        .route("/rooms/{room}/call", get(room_call))
        .route("/calls", get(list_calls).post(create_call))
        .route("/calls/{call_id}", get(get_call))
        .route("/calls/{call_id}/end", post(end_call))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

fn parse_room(raw: String) -> Result<RoomSlug, ApiError> {
    Ok(RoomSlug::parse(raw)?)
}

fn parse_call(raw: &str) -> Result<CallId, ApiError> {
    Ok(raw.parse::<CallId>()?)
}

async fn list_rooms(State(state): State<AppState>) -> Result<Json<Vec<RoomView>>, ApiError> {
    let rooms = state.services.rooms.list_rooms().await?;
    Ok(Json(rooms.into_iter().map(RoomView::from).collect()))
}

/// 同名房间已存在时返回 200 和已有房间
async fn create_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<(StatusCode, Json<RoomView>), ApiError> {
    let creation = state
        .services
        .rooms
        .create_room(
            &user,
            CreateRoomRequest {
                name: payload.name,
                description: payload.description,
                visibility: payload.visibility,
            },
        )
        .await?;

    let status = if creation.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(RoomView::from(creation.room))))
}

async fn get_history(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(room): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let room = parse_room(room)?;
    let messages = state
        .services
        .messages
        .list_recent(&viewer, &room, query.limit)
        .await?;

    Ok(Json(HistoryResponse {
        room: room.into(),
        messages: messages.into_iter().map(MessageView::from).collect(),
    }))
}

async fn upload_file(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(room): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let room = parse_room(room)?;
    let mut caption = String::new();
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(format!("Invalid multipart body: {err}")))?
    {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_owned();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::bad_request(format!("Failed to read file: {err}")))?;
                upload = Some((name, bytes.to_vec()));
            }
            Some("message") => {
                caption = field
                    .text()
                    .await
                    .map_err(|err| ApiError::bad_request(format!("Invalid message field: {err}")))?;
            }
            _ => {}
        }
    }

    let (name, bytes) = upload.ok_or_else(|| ApiError::bad_request("No file part"))?;
    let posted = state
        .services
        .messages
        .post_upload(&viewer, &room, caption, &name, bytes)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: posted.broadcast,
            persisted: posted.persisted,
        }),
    ))
}

async fn online_users(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(room): Path<String>,
) -> Result<Json<OnlineResponse>, ApiError> {
    let room = parse_room(room)?;
    state.services.rooms.authorize(&viewer, &room).await?;
    let users = state.services.presence.online_users(&room).await;
    Ok(Json(OnlineResponse {
        room: room.into(),
        users,
    }))
}

/// 聊天室当前进行中的通话，没有时 `call` 为 null
async fn room_call(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(room): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let room = parse_room(room)?;
    state.services.rooms.authorize(&viewer, &room).await?;
    let call = match state.services.calls.find_active_for_chat_room(&room).await? {
        Some(call) => {
            let participants = state.services.calls.participant_count(call.id).await;
            Some(CallView::new(call, participants))
        }
        None => None,
    };
    Ok(Json(json!({ "call": call })))
}

/// 关联私有房间的通话只列给有权进入该房间的用户
async fn list_calls(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
) -> Result<Json<Vec<CallView>>, ApiError> {
    let calls = state.services.calls.list_active_for(&viewer).await?;
    let mut views = Vec::with_capacity(calls.len());
    for call in calls {
        let participants = state.services.calls.participant_count(call.id).await;
        views.push(CallView::new(call, participants));
    }
    Ok(Json(views))
}

async fn create_call(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<CreateCallPayload>,
) -> Result<(StatusCode, Json<CallView>), ApiError> {
    let chat_room = payload.chat_room.map(parse_room).transpose()?;
    let creation = state
        .services
        .calls
        .create_call(
            &user,
            CreateCallRequest {
                title: payload.title,
                description: payload.description,
                chat_room,
                max_participants: payload.max_participants,
            },
        )
        .await?;

    let status = if creation.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let participants = state.services.calls.participant_count(creation.call.id).await;
    Ok((status, Json(CallView::new(creation.call, participants))))
}

/// 已结束的通话同样返回，并附带 `redirect`
async fn get_call(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(call_id): Path<String>,
) -> Result<Json<CallView>, ApiError> {
    let call_id = parse_call(&call_id)?;
    let call = state.services.calls.get_call_for(&viewer, call_id).await?;
    let participants = state.services.calls.participant_count(call_id).await;
    Ok(Json(CallView::new(call, participants)))
}

async fn end_call(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(call_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let call_id = parse_call(&call_id)?;
    let identity = domain::Identity::Authenticated(user);
    let outcome = state.services.calls.end_call(&identity, call_id).await?;
    let status = match outcome {
        EndOutcome::Ended => "ended",
        EndOutcome::AlreadyEnded => "already_ended",
    };
    Ok(Json(json!({ "id": Uuid::from(call_id), "status": status })))
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let identity = resolve_identity(&state, &headers, query.token.as_deref())?;
    tracing::debug!(user = identity.display_name(), "WebSocket 升级请求");
    let connection = WebSocketConnection::new(state, identity);
    Ok(ws.on_upgrade(move |socket| connection.run(socket)))
}

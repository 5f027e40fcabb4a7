#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{ContainerSettings, ServiceContainer};
use domain::{UserId, UserProfile, UserRole};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState, JwtService, WebSettings};

pub const TEST_SECRET: &str = "integration-test-secret-0123456789";
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TestServer {
    pub addr: SocketAddr,
    pub jwt: Arc<JwtService>,
    pub services: Arc<ServiceContainer>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(ContainerSettings::default(), WebSettings::default()).await
    }

    pub async fn spawn_anonymous() -> Self {
        let settings = WebSettings {
            allow_anonymous: true,
            ..WebSettings::default()
        };
        Self::spawn_with(ContainerSettings::default(), settings).await
    }

    pub async fn spawn_with(container: ContainerSettings, web: WebSettings) -> Self {
        let services = Arc::new(ServiceContainer::in_memory(container));
        Self::spawn_services(services, web).await
    }

    /// 使用调用方组装好的服务容器，便于替换单个仓储
    pub async fn spawn_services(services: Arc<ServiceContainer>, web: WebSettings) -> Self {
        let jwt = Arc::new(JwtService::new(TEST_SECRET));
        let app = router(AppState::new(services.clone(), jwt.clone(), web));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            jwt,
            services,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// 为新用户签发一小时有效的令牌
    pub fn login(&self, username: &str, role: UserRole) -> (UserProfile, String) {
        let profile = UserProfile::new(UserId::generate(), username, role);
        let token = self
            .jwt
            .issue_token(&profile, chrono::Duration::hours(1))
            .expect("issue token");
        (profile, token)
    }

    /// 轮询在线列表直到人数符合预期
    pub async fn wait_for_members(&self, room: &str, token: &str, expected: usize) -> Vec<String> {
        let client = reqwest::Client::new();
        for _ in 0..50 {
            let body: Value = client
                .get(self.http(&format!("/api/v1/rooms/{room}/online")))
                .bearer_auth(token)
                .send()
                .await
                .expect("online request")
                .json()
                .await
                .expect("online json");
            let users: Vec<String> = serde_json::from_value(body["users"].clone()).expect("users");
            if users.len() == expected {
                return users;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("room {room} never reached {expected} members");
    }

    /// 轮询通话参与者数量直到符合预期
    pub async fn wait_for_participants(&self, call_id: &str, token: &str, expected: u64) {
        let client = reqwest::Client::new();
        for _ in 0..50 {
            let body: Value = client
                .get(self.http(&format!("/api/v1/calls/{call_id}")))
                .bearer_auth(token)
                .send()
                .await
                .expect("call request")
                .json()
                .await
                .expect("call json");
            if body["participants"].as_u64() == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("call {call_id} never reached {expected} participants");
    }

    pub async fn connect(&self, token: Option<&str>) -> WsClient {
        let url = match token {
            Some(token) => format!("ws://{}/api/v1/ws?token={}", self.addr, token),
            None => format!("ws://{}/api/v1/ws", self.addr),
        };
        let (stream, _) = connect_async(url).await.expect("websocket connect");
        WsClient { stream }
    }

    /// 连接并等到自己的 `has connected` 状态，确保注册已完成
    pub async fn connect_user(&self, token: &str) -> WsClient {
        let mut client = self.connect(Some(token)).await;
        let status = client.recv_event("status").await;
        assert!(status["data"]["msg"]
            .as_str()
            .unwrap_or_default()
            .ends_with("has connected"));
        client
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl WsClient {
    pub async fn emit(&mut self, event: &str, data: Value) {
        self.send_raw(&json!({ "event": event, "data": data }).to_string())
            .await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.stream
            .send(TungsteniteMessage::Text(text.to_owned().into()))
            .await
            .expect("send frame");
    }

    /// 下一帧文本事件；超时视为测试失败
    pub async fn recv(&mut self) -> Value {
        self.try_recv(RECV_TIMEOUT)
            .await
            .expect("timed out waiting for event")
    }

    pub async fn try_recv(&mut self, wait: Duration) -> Option<Value> {
        let text = self.try_recv_text(wait).await?;
        Some(serde_json::from_str(&text).expect("json frame"))
    }

    /// 原始帧文本，用于校验透传载荷的字节
    pub async fn recv_text(&mut self) -> String {
        self.try_recv_text(RECV_TIMEOUT)
            .await
            .expect("timed out waiting for frame")
    }

    async fn try_recv_text(&mut self, wait: Duration) -> Option<String> {
        loop {
            let frame = timeout(wait, self.stream.next()).await.ok()??;
            match frame.expect("websocket error") {
                TungsteniteMessage::Text(text) => return Some(text.as_str().to_owned()),
                TungsteniteMessage::Close(_) => return None,
                _ => continue,
            }
        }
    }

    /// 跳过其它事件，直到收到指定名称的事件
    pub async fn recv_event(&mut self, name: &str) -> Value {
        loop {
            let event = self.recv().await;
            if event["event"] == name {
                return event;
            }
        }
    }

    /// 在给定时间内没有收到任何事件
    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Some(event) = self.try_recv(wait).await {
            panic!("unexpected event: {event}");
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

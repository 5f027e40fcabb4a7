use std::sync::Arc;

use application::{ConnectionHandle, Gateway};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ConnectionId, Identity, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::state::AppState;

/// WebSocket 连接管理器
///
/// 封装单个 WebSocket 连接的生命周期：
/// - 在网关注册连接（同时加入该用户的私有频道）
/// - 把注册表投递过来的事件写回客户端
/// - 按到达顺序分派客户端事件
/// - 断开时交给网关清理所有频道成员关系
///
/// 接收任务从不被中途取消：正在分派的帧（包括写库）总会执行完，
/// 写方向先断开时只在帧之间通知它退出。
pub struct WebSocketConnection {
    gateway: Arc<Gateway>,
    handle: ConnectionHandle,
    outbound: mpsc::Receiver<Arc<ServerEvent>>,
}

impl WebSocketConnection {
    /// 身份已在升级阶段解析完成
    pub fn new(state: AppState, identity: Identity) -> Self {
        let (sender, outbound) = mpsc::channel(state.settings.outbound_buffer.max(1));
        let handle = ConnectionHandle::new(ConnectionId::generate(), identity, sender);
        Self {
            gateway: state.services.gateway.clone(),
            handle,
            outbound,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }

    /// 运行 WebSocket 连接的主循环，任一方向结束即视为断开
    pub async fn run(self, socket: WebSocket) {
        let Self {
            gateway,
            handle,
            mut outbound,
        } = self;
        let connection_id = handle.id;

        tracing::info!(
            %connection_id,
            user = handle.display_name(),
            "WebSocket 连接已建立"
        );
        gateway.connect(handle.clone()).await;

        let (mut sender, mut incoming) = socket.split();

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    Some(event) = outbound.recv() => match event.to_json() {
                        Ok(json) => WsMessage::Text(json.into()),
                        Err(err) => {
                            tracing::warn!(error = %err, event = event.name(), "事件序列化失败");
                            continue;
                        }
                    },
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                    },
                    else => break,
                };
                if sender.send(frame).await.is_err() {
                    tracing::debug!(%connection_id, "WebSocket 写入失败");
                    break;
                }
            }
            tracing::debug!(%connection_id, "WebSocket发送任务结束");
        });

        // 写方向断开后通知接收任务在帧之间退出
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        // 接收任务：逐帧分派，保证同一连接的事件按到达顺序处理
        let mut recv_task = {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                loop {
                    let message = tokio::select! {
                        biased;
                        _ = &mut stop_rx => break,
                        frame = incoming.next() => match frame {
                            Some(Ok(message)) => message,
                            _ => break,
                        },
                    };
                    // 分派在 select 之外执行，停止信号不会打断它
                    match message {
                        WsMessage::Text(text) => gateway.dispatch(&handle, text.as_str()).await,
                        WsMessage::Ping(data) => {
                            if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                                break;
                            }
                        }
                        WsMessage::Close(_) => {
                            tracing::debug!(%connection_id, "WebSocket收到关闭消息");
                            break;
                        }
                        WsMessage::Pong(_) | WsMessage::Binary(_) => {}
                    }
                }
                tracing::debug!(%connection_id, "WebSocket接收任务结束");
            })
        };

        // 等待任意一个任务完成（连接断开）
        let send_finished = tokio::select! {
            _ = &mut send_task => true,
            _ = &mut recv_task => false,
        };
        if send_finished {
            let _ = stop_tx.send(());
            if let Err(err) = recv_task.await {
                tracing::warn!(%connection_id, error = %err, "WebSocket接收任务异常退出");
            }
        } else {
            // 发送任务不做持久化，直接取消
            send_task.abort();
        }

        gateway.disconnect(connection_id).await;
        tracing::info!(%connection_id, "WebSocket连接已断开，频道成员关系已清理");
    }
}

/// WebSocket 控制帧命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}

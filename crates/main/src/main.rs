//! 主应用程序入口
//!
//! 加载配置、连接数据库并装配服务，然后启动 Axum Web API 服务。

use std::sync::Arc;

use application::{
    CallSettings, ContainerSettings, HistoryLimits, ServiceContainer, SystemClock, UploadPolicy,
};
use config::AppConfig;
use infrastructure::{Infrastructure, InfrastructureConfig};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService, WebSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let infrastructure = Infrastructure::connect(InfrastructureConfig {
        database_url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        upload_dir: config.uploads.dir.clone(),
        public_upload_url: config.uploads.public_base_url.clone(),
    })
    .await?;

    let services = Arc::new(ServiceContainer::new(
        infrastructure.repositories(),
        infrastructure.blob_store(),
        infrastructure.notifications(),
        Arc::new(SystemClock),
        container_settings(&config),
    ));

    let jwt_service = Arc::new(JwtService::new(&config.auth.jwt_secret));
    let state = AppState::new(services, jwt_service, WebSettings::from_config(&config));

    // 启动 Web 服务器
    let app = router(state);
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        %address,
        anonymous = config.auth.allow_anonymous,
        "聊天室服务器已启动"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

fn container_settings(config: &AppConfig) -> ContainerSettings {
    ContainerSettings {
        history: HistoryLimits {
            default: config.chat.history_limit,
            max: config.chat.max_history_limit,
        },
        calls: CallSettings {
            default_max_participants: config.calls.default_max_participants,
            broadcast_end_globally: config.calls.broadcast_end_globally,
        },
        upload_policy: UploadPolicy::new(
            config.uploads.max_bytes,
            &config.uploads.allowed_extensions,
        ),
    }
}

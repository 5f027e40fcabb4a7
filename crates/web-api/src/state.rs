use std::path::PathBuf;
use std::sync::Arc;

use application::ServiceContainer;
use config::AppConfig;

use crate::JwtService;

/// 传输层自身的设置
#[derive(Debug, Clone)]
pub struct WebSettings {
    pub allow_anonymous: bool,
    /// 每条 WebSocket 连接的出站队列长度
    pub outbound_buffer: usize,
    pub max_upload_bytes: usize,
    /// 设置后以静态文件方式提供已上传的附件
    pub upload_dir: Option<PathBuf>,
    pub public_upload_url: String,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            allow_anonymous: false,
            outbound_buffer: 256,
            max_upload_bytes: 16 * 1024 * 1024,
            upload_dir: None,
            public_upload_url: "/uploads/chat".into(),
        }
    }
}

impl WebSettings {
    /// 公开地址是站内路径时才由本服务托管上传目录，否则交给外部静态服务
    pub fn from_config(config: &AppConfig) -> Self {
        let public_url = config.uploads.public_base_url.trim_end_matches('/');
        let serve_locally = public_url.starts_with('/') && public_url.len() > 1;
        Self {
            allow_anonymous: config.auth.allow_anonymous,
            outbound_buffer: config.chat.outbound_buffer,
            max_upload_bytes: config.uploads.max_bytes,
            upload_dir: serve_locally.then(|| PathBuf::from(&config.uploads.dir)),
            public_upload_url: public_url.to_owned(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<ServiceContainer>,
    pub jwt_service: Arc<JwtService>,
    pub settings: Arc<WebSettings>,
}

impl AppState {
    pub fn new(
        services: Arc<ServiceContainer>,
        jwt_service: Arc<JwtService>,
        settings: WebSettings,
    ) -> Self {
        Self {
            services,
            jwt_service,
            settings: Arc::new(settings),
        }
    }
}

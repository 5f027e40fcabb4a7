//! 进程内通知总线
//!
//! 消息与通话服务在主流程完成后发布领域事件，观察者的失败只记日志，
//! 永远不会中断发布方。

use std::sync::Arc;

use async_trait::async_trait;
use domain::ChatEvent;

use crate::error::ApplicationError;

#[async_trait]
pub trait NotificationObserver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, event: &ChatEvent) -> Result<(), ApplicationError>;
}

#[derive(Clone, Default)]
pub struct NotificationBus {
    observers: Vec<Arc<dyn NotificationObserver>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn NotificationObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub async fn publish(&self, event: ChatEvent) {
        for observer in &self.observers {
            if let Err(err) = observer.notify(&event).await {
                tracing::warn!(
                    observer = observer.name(),
                    event = event.name(),
                    error = %err,
                    "通知观察者处理失败，已忽略"
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

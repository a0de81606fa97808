//! 停止信号
//!
//! Ctrl+C / SIGTERM / quit 命令都会触发同一个 CancellationToken。交互循环只在两次查询之间检查它，
//! 正在进行的模型调用或工具调用允许跑完。

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// 停止原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// quit 命令或 Ctrl+C
    UserInitiated,
    /// SIGTERM 信号
    Signal,
    /// 输入流结束（EOF）
    InputClosed,
}

/// 停止信号管理器
#[derive(Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason: Arc<Mutex<Option<ShutdownReason>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发停止；只记录第一次的原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        if let Ok(mut slot) = self.reason.lock() {
            slot.get_or_insert(reason);
        }
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, stopping after the current query");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = self.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, stopping after the current query");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_manager_new() {
        let manager = ShutdownManager::new();
        assert!(!manager.is_shutdown());
        assert!(manager.reason().is_none());
    }

    #[test]
    fn test_shutdown_keeps_first_reason() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        manager.shutdown(ShutdownReason::InputClosed);
        manager.shutdown(ShutdownReason::Signal);
        assert!(token.is_cancelled());
        assert_eq!(manager.reason(), Some(ShutdownReason::InputClosed));
    }

    #[tokio::test]
    async fn test_wait_for_shutdown() {
        let manager = ShutdownManager::new();
        let waiter = manager.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_shutdown().await });
        manager.shutdown(ShutdownReason::UserInitiated);
        handle.await.unwrap();
    }
}

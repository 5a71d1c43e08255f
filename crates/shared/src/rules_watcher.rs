//! 规则文件热更新
//!
//! 监听规则集文件所在目录，目标文件变更后经 debounce 窗口去抖，再调用 `ReloadTarget`。
//! 重载失败只记录错误，引擎继续使用当前规则集。
//!
//! ```text
//! notify 事件 ──mpsc──▶ debounce 循环 ──▶ ReloadTarget::reload
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::AlertingError;

// ============================================================================
// 抽象
// ============================================================================

/// 文件变更后需要执行的重载动作
#[cfg_attr(test, mockall::automock)]
pub trait ReloadTarget: Send + Sync {
    fn reload(&self) -> std::result::Result<(), AlertingError>;
}

/// 配置监听器
#[async_trait]
pub trait ConfigWatcher: Send + Sync {
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

// ============================================================================
// RulesFileWatcher
// ============================================================================

/// 基于文件系统事件的规则集监听器
///
/// 监听父目录而不是文件本身：编辑器和 K8s ConfigMap 更新都会替换文件，
/// 直接监听文件会在第一次替换后失效。
pub struct RulesFileWatcher {
    path: PathBuf,
    debounce: Duration,
    target: Arc<dyn ReloadTarget>,
    /// notify watcher 需要在监听期间保持存活
    watcher: Mutex<Option<RecommendedWatcher>>,
    shutdown_tx: watch::Sender<bool>,
}

impl RulesFileWatcher {
    pub fn new(path: impl AsRef<Path>, debounce: Duration, target: Arc<dyn ReloadTarget>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            path: path.as_ref().to_path_buf(),
            debounce,
            target,
            watcher: Mutex::new(None),
            shutdown_tx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn watch_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[async_trait]
impl ConfigWatcher for RulesFileWatcher {
    async fn start(&self) -> Result<()> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .context("规则文件路径缺少文件名")?;
        let watch_dir = self.watch_dir();

        let (event_tx, mut event_rx) = mpsc::channel::<()>(16);

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let relevant = matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) && event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                    if relevant {
                        let _ = event_tx.try_send(());
                    }
                }
                Err(e) => {
                    warn!(error = %e, "文件监听器事件错误");
                }
            })
            .context("创建文件监听器失败")?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("监听目录 {} 失败", watch_dir.display()))?;
        *self.watcher.lock() = Some(watcher);

        info!(path = %self.path.display(), "规则文件监听已启动");

        let debounce = self.debounce;
        let target = self.target.clone();
        let path = self.path.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(()) = event_rx.recv() => {
                        tokio::time::sleep(debounce).await;
                        while event_rx.try_recv().is_ok() {}

                        debug!(path = %path.display(), "规则文件变更，开始重载");
                        // 读文件与编译正则都是阻塞操作
                        let reload_target = target.clone();
                        match tokio::task::spawn_blocking(move || reload_target.reload()).await {
                            Ok(Ok(())) => info!(path = %path.display(), "规则文件已重新加载"),
                            Ok(Err(e)) => error!(
                                path = %path.display(),
                                error = %e,
                                "规则文件重新加载失败，保留当前规则集"
                            ),
                            Err(e) => error!(path = %path.display(), error = %e, "重载任务异常退出"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("规则文件监听已停止");
                            break;
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.watcher.lock().take();
        let _ = self.shutdown_tx.send(true);
        Ok(())
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 服务生命周期
//!
//! ```text
//! Created ──start──▶ Running ──stop──▶ Stopping ──join──▶ Stopped
//!    │                  │
//!    └─ 初始化失败 ──────┴─ 输入/输出关闭 (自行退出) ──────▶ Stopped
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::bounded;
use log::{error, info};
use serde::Serialize;

use super::cancel::{stop_signal, StopHandle, StopToken};
use super::stats::StatsSnapshot;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum ServiceState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl ServiceState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// 可由编排器统一启停的后台服务
pub trait Service: Send {
    fn name(&self) -> &str;

    fn state(&self) -> ServiceState;

    /// 启动工作线程并等待初始化完成。
    /// 已在运行时为空操作; 已停止的服务不能再启动。
    fn start(&mut self) -> Result<(), PipelineError>;

    /// 只发出停止信号, 不等待
    fn request_stop(&mut self);

    /// 发出停止信号并阻塞到工作线程退出。未启动或已停止时为空操作。
    fn stop(&mut self);

    fn stats(&self) -> StatsSnapshot;
}

/// 工作线程退出 (包括 panic) 时把状态置为 Stopped
struct ExitGuard(Arc<AtomicU8>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.store(ServiceState::Stopped as u8, Ordering::SeqCst);
    }
}

/// 各服务共用的线程与状态管理
pub(crate) struct Worker {
    name: String,
    state: Arc<AtomicU8>,
    stop: Option<StopHandle>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(AtomicU8::new(ServiceState::Created as u8)),
            stop: None,
            handle: None,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> ServiceState {
        ServiceState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// `Ok(true)` 需要启动, `Ok(false)` 已在运行
    pub(crate) fn should_start(&self) -> Result<bool, PipelineError> {
        match self.state() {
            ServiceState::Created => Ok(true),
            ServiceState::Running => Ok(false),
            ServiceState::Stopping | ServiceState::Stopped => Err(PipelineError::NotRestartable {
                name: self.name.clone(),
            }),
        }
    }

    /// 启动工作线程: 先在线程内执行 `init`, 成功后进入 Running 再执行 `body`。
    /// 阻塞到 `init` 完成; `init` 失败时线程已退出, 状态为 Stopped。
    pub(crate) fn spawn<T, I, B>(&mut self, init: I, body: B) -> Result<(), PipelineError>
    where
        I: FnOnce() -> anyhow::Result<T> + Send + 'static,
        B: FnOnce(T, StopToken) + Send + 'static,
    {
        let (stop_handle, token) = stop_signal();
        let (ready_tx, ready_rx) = bounded::<anyhow::Result<()>>(1);
        let state = Arc::clone(&self.state);

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let _guard = ExitGuard(Arc::clone(&state));
                let resource = match init() {
                    Ok(resource) => resource,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                state.store(ServiceState::Running as u8, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(()));
                body(resource, token);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                self.state
                    .store(ServiceState::Stopped as u8, Ordering::SeqCst);
                return Err(PipelineError::Spawn {
                    name: self.name.clone(),
                    source,
                });
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.stop = Some(stop_handle);
                self.handle = Some(handle);
                info!("✅ [{}] 已启动", self.name);
                Ok(())
            }
            Ok(Err(source)) => {
                let _ = handle.join();
                error!("❌ [{}] 初始化失败: {:#}", self.name, source);
                Err(PipelineError::Startup {
                    name: self.name.clone(),
                    source,
                })
            }
            Err(_) => {
                let _ = handle.join();
                self.state
                    .store(ServiceState::Stopped as u8, Ordering::SeqCst);
                Err(PipelineError::WorkerPanicked {
                    name: self.name.clone(),
                })
            }
        }
    }

    pub(crate) fn request_stop(&mut self) {
        let _ = self.state.compare_exchange(
            ServiceState::Running as u8,
            ServiceState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if let Some(mut stop) = self.stop.take() {
            stop.stop();
        }
    }

    pub(crate) fn stop(&mut self) {
        self.request_stop();
        let Some(handle) = self.handle.take() else {
            return;
        };
        info!("🛑 [{}] 正在停止...", self.name);
        if handle.join().is_err() {
            error!("❌ [{}] 工作线程 panic", self.name);
        }
        self.state
            .store(ServiceState::Stopped as u8, Ordering::SeqCst);
        info!("✅ [{}] 已停止", self.name);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

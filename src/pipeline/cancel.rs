// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 一次性停止信号
//!
//! 基于零容量通道: 从不发送消息, 停止 = 丢弃发送端。
//! 断开状态对所有接收端永久可见, 不会像普通消息一样被错过, 重复停止也没有副作用。

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

pub fn stop_signal() -> (StopHandle, StopToken) {
    let (tx, rx) = bounded(0);
    (StopHandle { tx: Some(tx) }, StopToken { rx })
}

/// 停止信号的发出方 (由服务句柄持有)
#[derive(Debug)]
pub struct StopHandle {
    tx: Option<Sender<()>>,
}

impl StopHandle {
    pub fn stop(&mut self) {
        self.tx.take();
    }

    pub fn is_stopped(&self) -> bool {
        self.tx.is_none()
    }
}

/// 停止信号的观察方 (由工作线程持有), 可以放进 `select!`
#[derive(Debug, Clone)]
pub struct StopToken {
    rx: Receiver<()>,
}

impl StopToken {
    pub fn is_stopped(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// 用于 `select!` 的接收端, 停止后立即就绪
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 处理阶段: 从输入通道取帧 → 处理 → 转发到下游
//!
//! 每个阶段独占一个工作线程, 处理器 (例如检测器) 在线程内构造,
//! 因此处理器本身不需要 `Send`。

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use crossbeam_channel::{select, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};

use super::cancel::StopToken;
use super::service::{Service, ServiceState, Worker};
use super::stats::{FpsMeter, ServiceStats, StatsSnapshot};
use crate::error::PipelineError;
use crate::frame::Frame;

/// 帧处理器: 就地读写帧 (附加人物、身份等)。
/// 返回错误时该帧被丢弃, 阶段继续处理下一帧。
pub trait FrameProcessor {
    fn process(&mut self, frame: &mut Frame) -> Result<()>;
}

impl<P: FrameProcessor + ?Sized> FrameProcessor for Box<P> {
    fn process(&mut self, frame: &mut Frame) -> Result<()> {
        (**self).process(frame)
    }
}

type Factory<P> = Box<dyn FnOnce() -> Result<P> + Send>;

pub(crate) enum SendOutcome {
    Sent,
    /// 接收端已全部释放
    Closed,
    /// 阻塞等待期间收到停止信号, 帧被放弃
    Cancelled,
}

/// 发送一帧: 有空位直接发送, 输出满时阻塞 (背压), 但可被停止信号打断
pub(crate) fn send_or_stop(tx: &Sender<Frame>, frame: Frame, stop: &StopToken) -> SendOutcome {
    let frame = match tx.try_send(frame) {
        Ok(()) => return SendOutcome::Sent,
        Err(TrySendError::Disconnected(_)) => return SendOutcome::Closed,
        Err(TrySendError::Full(frame)) => frame,
    };
    select! {
        send(tx, frame) -> res => match res {
            Ok(()) => SendOutcome::Sent,
            Err(_) => SendOutcome::Closed,
        },
        recv(stop.receiver()) -> _ => SendOutcome::Cancelled,
    }
}

pub struct Stage<P> {
    worker: Worker,
    factory: Option<Factory<P>>,
    input: Option<Receiver<Frame>>,
    outputs: Vec<Sender<Frame>>,
    stats: Arc<ServiceStats>,
}

impl<P: FrameProcessor + 'static> Stage<P> {
    /// `outputs` 为空时该阶段是终点, 处理完的帧直接释放;
    /// 多个输出时每个下游都收到一份 (共享图像缓冲)。
    pub fn new<F>(
        name: impl Into<String>,
        input: Receiver<Frame>,
        outputs: Vec<Sender<Frame>>,
        factory: F,
    ) -> Self
    where
        F: FnOnce() -> Result<P> + Send + 'static,
    {
        Self {
            worker: Worker::new(name),
            factory: Some(Box::new(factory)),
            input: Some(input),
            outputs,
            stats: Arc::new(ServiceStats::default()),
        }
    }
}

impl<P: FrameProcessor + 'static> Service for Stage<P> {
    fn name(&self) -> &str {
        self.worker.name()
    }

    fn state(&self) -> ServiceState {
        self.worker.state()
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        if !self.worker.should_start()? {
            return Ok(());
        }
        let (Some(factory), Some(input)) = (self.factory.take(), self.input.take()) else {
            return Err(PipelineError::NotRestartable {
                name: self.name().to_string(),
            });
        };
        let outputs = std::mem::take(&mut self.outputs);
        let stats = Arc::clone(&self.stats);
        let name = self.name().to_string();

        self.worker.spawn(factory, move |processor, stop| {
            run_stage(&name, processor, input, outputs, &stop, &stats)
        })
    }

    fn request_stop(&mut self) {
        self.worker.request_stop();
    }

    fn stop(&mut self) {
        self.worker.stop();
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.name())
    }
}

fn run_stage<P: FrameProcessor>(
    name: &str,
    mut processor: P,
    input: Receiver<Frame>,
    mut outputs: Vec<Sender<Frame>>,
    stop: &StopToken,
    stats: &ServiceStats,
) {
    info!("🔍 [{}] 等待数据...", name);
    let is_sink = outputs.is_empty();
    let mut fps = FpsMeter::new();

    loop {
        // 停止信号优先于输入中排队的帧
        if stop.is_stopped() {
            break;
        }
        let received = select! {
            recv(stop.receiver()) -> _ => None,
            recv(input) -> msg => Some(msg),
        };
        let mut frame = match received {
            None => break,
            Some(Ok(frame)) => frame,
            Some(Err(_)) => {
                info!("📭 [{}] 输入通道已关闭", name);
                break;
            }
        };
        stats.record_received();

        let started = Instant::now();
        if let Err(e) = processor.process(&mut frame) {
            stats.record_failed();
            error!("❌ [{}] 帧 #{} 处理失败, 已丢弃: {:#}", name, frame.index, e);
            continue;
        }
        stats.record_processed(started.elapsed());
        if let Some(current) = fps.tick() {
            debug!("📊 [{}] {:.1} FPS", name, current);
        }

        if is_sink {
            continue;
        }
        if !fan_out(name, frame, &mut outputs, stop, stats) {
            break;
        }
    }

    info!(
        "👋 [{}] 退出 (已处理 {} 帧)",
        name,
        stats.snapshot(name).processed
    );
}

/// 转发到所有仍然打开的输出。返回 false 表示应当退出。
fn fan_out(
    name: &str,
    frame: Frame,
    outputs: &mut Vec<Sender<Frame>>,
    stop: &StopToken,
    stats: &ServiceStats,
) -> bool {
    let mut pending = Some(frame);
    let mut i = 0;
    while i < outputs.len() {
        let Some(frame) = (if i + 1 == outputs.len() {
            pending.take()
        } else {
            pending.clone()
        }) else {
            break;
        };
        let index = frame.index;
        match send_or_stop(&outputs[i], frame, stop) {
            SendOutcome::Sent => i += 1,
            SendOutcome::Closed => {
                outputs.remove(i);
            }
            SendOutcome::Cancelled => {
                stats.record_dropped();
                warn!("⚠️  [{}] 停止时下游已满, 丢弃帧 #{}", name, index);
                return false;
            }
        }
    }

    if outputs.is_empty() {
        info!("📭 [{}] 所有下游已关闭", name);
        return false;
    }
    stats.record_forwarded();
    true
}

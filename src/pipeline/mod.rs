// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 帧处理流水线 (Frame Processing Pipeline)
///
/// 每个服务一个线程, 相邻服务之间通过有界 crossbeam 通道传递 [`Frame`](crate::frame::Frame):
///
/// ```text
/// SourceService ──▶ Stage(pose) ──▶ Stage(face) ──▶ 输出
///   (帧源)            (姿态估计)        (人脸识别)
/// ```
///
/// - 背压: 下游满时上游阻塞在发送上
/// - 停止: 一次性停止信号, 可打断阻塞的接收/发送
/// - 级联: 服务退出时释放输出端, 下游读完剩余帧后自行退出
pub mod cancel;
pub mod orchestrator;
pub mod service;
pub mod source;
pub mod stage;
pub mod stats;
pub mod video;

pub use cancel::{stop_signal, StopHandle, StopToken};
pub use orchestrator::{Pipeline, PipelineBuilder, PipelineChain};
pub use service::{Service, ServiceState};
pub use source::{FrameSource, ImageDirSource, SourceService};
pub use stage::{FrameProcessor, Stage};
pub use stats::{FpsMeter, StatsSnapshot};
#[cfg(feature = "ffmpeg")]
pub use video::VideoSource;
pub use video::{open_source, SourceKind};

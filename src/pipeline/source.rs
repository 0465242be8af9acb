// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 帧源服务: 从相机/图片序列读取图像, 编号后送入流水线头部

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{RecvTimeoutError, Sender};
use image::RgbImage;
use log::{debug, error, info, warn};

use super::cancel::StopToken;
use super::service::{Service, ServiceState, Worker};
use super::stage::{send_or_stop, SendOutcome};
use super::stats::{FpsMeter, ServiceStats, StatsSnapshot};
use crate::error::PipelineError;
use crate::frame::{Frame, DEFAULT_KEYPOINT_CONF_THRESHOLD};

/// 连续读取失败超过该次数后放弃该帧源
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// 图像来源。`Ok(None)` 表示流结束。
pub trait FrameSource {
    fn next_image(&mut self) -> Result<Option<RgbImage>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_image(&mut self) -> Result<Option<RgbImage>> {
        (**self).next_image()
    }
}

/// 按文件名顺序回放目录中的图片 (也可以直接指定单个图片文件)
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    cursor: usize,
}

impl ImageDirSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let files = if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("failed to read image directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image_file(p))
                .collect();
            files.sort();
            files
        };
        if files.is_empty() {
            bail!("no images found in {}", path.display());
        }
        info!("📁 帧源 {}: {} 张图片", path.display(), files.len());
        Ok(Self { files, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

pub(crate) fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageDirSource {
    fn next_image(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let img = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        Ok(Some(img.to_rgb8()))
    }
}

type Factory<S> = Box<dyn FnOnce() -> Result<S> + Send>;

/// 帧源服务: 流水线的起点, 没有输入通道
pub struct SourceService<S> {
    worker: Worker,
    source_id: usize,
    factory: Option<Factory<S>>,
    output: Option<Sender<Frame>>,
    frame_interval: Option<Duration>,
    keypoint_conf_threshold: f32,
    stats: Arc<ServiceStats>,
}

impl<S: FrameSource + 'static> SourceService<S> {
    pub fn new<F>(name: impl Into<String>, source_id: usize, output: Sender<Frame>, factory: F) -> Self
    where
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        Self {
            worker: Worker::new(name),
            source_id,
            factory: Some(Box::new(factory)),
            output: Some(output),
            frame_interval: None,
            keypoint_conf_threshold: DEFAULT_KEYPOINT_CONF_THRESHOLD,
            stats: Arc::new(ServiceStats::default()),
        }
    }

    /// 两帧之间的最小间隔 (回放图片时模拟相机帧率)
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    pub fn with_keypoint_threshold(mut self, threshold: f32) -> Self {
        self.keypoint_conf_threshold = threshold;
        self
    }
}

impl<S: FrameSource + 'static> Service for SourceService<S> {
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
        let (Some(factory), Some(output)) = (self.factory.take(), self.output.take()) else {
            return Err(PipelineError::NotRestartable {
                name: self.name().to_string(),
            });
        };
        let settings = SourceSettings {
            name: self.name().to_string(),
            source_id: self.source_id,
            frame_interval: self.frame_interval,
            keypoint_conf_threshold: self.keypoint_conf_threshold,
        };
        let stats = Arc::clone(&self.stats);

        self.worker.spawn(factory, move |source, stop| {
            run_source(&settings, source, output, &stop, &stats)
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

struct SourceSettings {
    name: String,
    source_id: usize,
    frame_interval: Option<Duration>,
    keypoint_conf_threshold: f32,
}

fn run_source<S: FrameSource>(
    settings: &SourceSettings,
    mut source: S,
    output: Sender<Frame>,
    stop: &StopToken,
    stats: &ServiceStats,
) {
    let name = settings.name.as_str();
    info!("🎥 [{}] 开始采集 (source_id={})", name, settings.source_id);
    let mut index: u64 = 0;
    let mut consecutive_errors = 0;
    let mut fps = FpsMeter::new();

    loop {
        if stop.is_stopped() {
            break;
        }
        let started = Instant::now();
        let image = match source.next_image() {
            Ok(Some(image)) => {
                consecutive_errors = 0;
                image
            }
            Ok(None) => {
                info!("🏁 [{}] 帧源结束", name);
                break;
            }
            Err(e) => {
                stats.record_failed();
                consecutive_errors += 1;
                error!("❌ [{}] 读取失败 ({}/{}): {:#}", name, consecutive_errors, MAX_CONSECUTIVE_ERRORS, e);
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    error!("❌ [{}] 连续读取失败, 放弃该帧源", name);
                    break;
                }
                continue;
            }
        };
        stats.record_received();

        let frame = Frame::new(image, index)
            .with_source(settings.source_id)
            .with_keypoint_threshold(settings.keypoint_conf_threshold);
        index += 1;
        stats.record_processed(started.elapsed());
        if let Some(current) = fps.tick() {
            debug!("📊 [{}] {:.1} FPS", name, current);
        }

        match send_or_stop(&output, frame, stop) {
            SendOutcome::Sent => stats.record_forwarded(),
            SendOutcome::Closed => {
                info!("📭 [{}] 下游已关闭", name);
                break;
            }
            SendOutcome::Cancelled => {
                stats.record_dropped();
                warn!("⚠️  [{}] 停止时下游已满, 丢弃帧 #{}", name, index - 1);
                break;
            }
        }

        if let Some(interval) = settings.frame_interval {
            // 可被停止信号打断的等待
            let remaining = interval.saturating_sub(started.elapsed());
            if let Err(RecvTimeoutError::Disconnected) = stop.receiver().recv_timeout(remaining) {
                break;
            }
        }
    }

    info!("👋 [{}] 退出 (已发送 {} 帧)", name, index);
}

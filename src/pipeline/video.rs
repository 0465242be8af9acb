// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 帧源描述解析 + 视频/网络流/摄像头帧源 (需要 `ffmpeg` 特性)
//!
//! `camera_sources` 中的每一项按以下规则解析:
//! - 纯数字: 本地摄像头序号
//! - 含 `://`: 网络流 (rtsp/http/...)
//! - 目录或图片文件: 图片序列
//! - 其他: 视频文件

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use image::RgbImage;

use super::source::{is_image_file, FrameSource, ImageDirSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Camera(usize),
    Stream(String),
    Images(PathBuf),
    Video(PathBuf),
}

impl SourceKind {
    pub fn parse(entry: &str) -> Self {
        let entry = entry.trim();
        if !entry.is_empty() && entry.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = entry.parse() {
                return Self::Camera(index);
            }
        }
        if entry.contains("://") {
            return Self::Stream(entry.to_string());
        }
        let path = PathBuf::from(entry);
        if path.is_dir() || is_image_file(&path) {
            Self::Images(path)
        } else {
            Self::Video(path)
        }
    }

    /// 实时源: 下游跟不上时丢帧, 不阻塞解码
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Camera(_) | Self::Stream(_))
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera(index) => write!(f, "camera:{index}"),
            Self::Stream(url) => f.write_str(url),
            Self::Images(path) | Self::Video(path) => write!(f, "{}", path.display()),
        }
    }
}

/// 按描述打开帧源。图片序列总是可用, 其余类型需要 `ffmpeg` 特性。
pub fn open_source(kind: &SourceKind) -> Result<Box<dyn FrameSource>> {
    match kind {
        SourceKind::Images(path) => Ok(Box::new(ImageDirSource::open(path)?)),
        #[cfg(feature = "ffmpeg")]
        _ => Ok(Box::new(ffmpeg::VideoSource::open(kind)?)),
        #[cfg(not(feature = "ffmpeg"))]
        other => anyhow::bail!("source `{}` requires the `ffmpeg` feature", other),
    }
}

/// YUV420P → RGB (BT.601, 7 位定点系数)
///
/// `u_plane`/`v_plane` 为半分辨率色度平面。步长或平面长度不足时返回 `None`。
pub fn yuv420p_to_rgb(
    y_plane: &[u8],
    u_plane: &[u8],
    v_plane: &[u8],
    y_stride: usize,
    uv_stride: usize,
    width: u32,
    height: u32,
) -> Option<RgbImage> {
    let (w, h) = (width as usize, height as usize);
    let chroma_w = w.div_ceil(2);
    if w == 0 || h == 0 || y_stride < w || uv_stride < chroma_w {
        return None;
    }
    let chroma_len = uv_stride * (h.div_ceil(2) - 1) + chroma_w;
    if y_plane.len() < y_stride * (h - 1) + w
        || u_plane.len() < chroma_len
        || v_plane.len() < chroma_len
    {
        return None;
    }

    let mut rgb = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let luma = &y_plane[row * y_stride..row * y_stride + w];
        let uv_row = (row >> 1) * uv_stride;
        for (x, &y) in luma.iter().enumerate() {
            let y = y as i32;
            let u = u_plane[uv_row + (x >> 1)] as i32 - 128;
            let v = v_plane[uv_row + (x >> 1)] as i32 - 128;
            rgb.push((y + ((v * 179) >> 7)).clamp(0, 255) as u8);
            rgb.push((y - ((u * 44) >> 7) - ((v * 91) >> 7)).clamp(0, 255) as u8);
            rgb.push((y + ((u * 227) >> 7)).clamp(0, 255) as u8);
        }
    }
    RgbImage::from_raw(width, height, rgb)
}

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::VideoSource;

#[cfg(feature = "ffmpeg")]
mod ffmpeg {
    use anyhow::{bail, Result};
    use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
    use ez_ffmpeg::core::context::null_output::create_null_output;
    use ez_ffmpeg::filter::frame_filter::FrameFilter;
    use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
    use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
    use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame, Input};
    use image::RgbImage;
    use log::{debug, info, warn};

    use super::{yuv420p_to_rgb, SourceKind};
    use crate::pipeline::FrameSource;

    const AV_PIX_FMT_YUV420P: i32 = 0;
    const MAX_DIMENSION: i32 = 4096;
    /// 解码线程与帧源之间的缓冲帧数
    const FRAME_BUFFER: usize = 2;

    #[cfg(target_os = "windows")]
    const CAMERA_FORMAT: &str = "dshow";
    #[cfg(target_os = "macos")]
    const CAMERA_FORMAT: &str = "avfoundation";
    #[cfg(target_os = "linux")]
    const CAMERA_FORMAT: &str = "v4l2";
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    const CAMERA_FORMAT: &str = "video4linux2";

    /// FFmpeg 解码的帧源: 解码线程把每帧转成 RGB 后送入有界通道
    ///
    /// 帧源被释放后, 下一帧到达时解码线程随之退出。
    pub struct VideoSource {
        frames: Receiver<RgbImage>,
    }

    impl VideoSource {
        pub fn open(kind: &SourceKind) -> Result<Self> {
            let (url, format) = ffmpeg_input(kind)?;
            let live = kind.is_live();
            let label = kind.to_string();
            let (tx, frames) = bounded(FRAME_BUFFER);
            let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);
            let bridge = RgbBridge {
                tx,
                live,
                decoded: 0,
                dropped: 0,
            };

            let thread_label = label.clone();
            std::thread::Builder::new()
                .name(format!("decode-{label}"))
                .spawn(move || {
                    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
                    let pipe = pipe.filter("rgb", Box::new(bridge));
                    let out = create_null_output().add_frame_pipeline(pipe);

                    let mut input = Input::new(url.as_str());
                    if let Some(format) = format {
                        input = input.set_format(format);
                    }
                    if url.starts_with("rtsp://") {
                        input = input.set_input_opts(
                            [("rtsp_transport", "tcp"), ("rtsp_flags", "prefer_tcp")].into(),
                        );
                    }

                    let started = FfmpegContext::builder()
                        .input(input)
                        .filter_descs(["format=yuv420p"].into())
                        .output(out)
                        .build()
                        .map_err(|e| format!("build failed: {e}"))
                        .and_then(|ctx| ctx.start().map_err(|e| format!("start failed: {e}")));
                    let sch = match started {
                        Ok(sch) => sch,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));
                    match sch.wait() {
                        Ok(_) => info!("📹 [{}] 解码结束", thread_label),
                        Err(e) => warn!("⚠️  [{}] 解码中断: {}", thread_label, e),
                    }
                })?;

            match ready_rx.recv() {
                Ok(Ok(())) => {
                    info!("✅ 视频源已连接: {}", label);
                    Ok(Self { frames })
                }
                Ok(Err(e)) => bail!("failed to open {label}: {e}"),
                Err(_) => bail!("decoder for {label} exited during startup"),
            }
        }
    }

    impl FrameSource for VideoSource {
        fn next_image(&mut self) -> Result<Option<RgbImage>> {
            // 发送端随解码线程释放, 即流结束
            Ok(self.frames.recv().ok())
        }
    }

    fn ffmpeg_input(kind: &SourceKind) -> Result<(String, Option<&'static str>)> {
        Ok(match kind {
            SourceKind::Camera(index) => (camera_url(*index)?, Some(CAMERA_FORMAT)),
            SourceKind::Stream(url) => (url.clone(), None),
            SourceKind::Images(path) | SourceKind::Video(path) => {
                (path.display().to_string(), None)
            }
        })
    }

    #[cfg(target_os = "windows")]
    fn camera_url(index: usize) -> Result<String> {
        let devices = ez_ffmpeg::device::get_input_video_devices()
            .map_err(|e| anyhow::anyhow!("failed to list cameras: {e}"))?;
        let Some(name) = devices.get(index) else {
            bail!("camera {index} not found ({} devices)", devices.len());
        };
        Ok(format!("video={name}"))
    }

    #[cfg(target_os = "linux")]
    fn camera_url(index: usize) -> Result<String> {
        Ok(format!("/dev/video{index}"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    fn camera_url(index: usize) -> Result<String> {
        Ok(index.to_string())
    }

    struct RgbBridge {
        tx: Sender<RgbImage>,
        live: bool,
        decoded: u64,
        dropped: u64,
    }

    impl FrameFilter for RgbBridge {
        fn media_type(&self) -> AVMediaType {
            AVMediaType::AVMEDIA_TYPE_VIDEO
        }

        fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
            debug!("🎬 解码线程启动");
            Ok(())
        }

        fn filter_frame(
            &mut self,
            frame: Frame,
            _ctx: &FrameFilterContext,
        ) -> Result<Option<Frame>, String> {
            let Some(image) = to_rgb(&frame) else {
                self.dropped += 1;
                return Ok(None);
            };
            self.decoded += 1;

            if self.live {
                match self.tx.try_send(image) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => self.dropped += 1,
                    Err(TrySendError::Disconnected(_)) => return Err("frame source closed".into()),
                }
            } else if self.tx.send(image).is_err() {
                return Err("frame source closed".into());
            }
            Ok(Some(frame))
        }

        fn uninit(&mut self, _ctx: &FrameFilterContext) {
            info!(
                "📺 解码统计: 解码 {} 帧, 丢弃 {} 帧",
                self.decoded, self.dropped
            );
        }
    }

    /// 空帧、损坏帧、非 YUV420P 或尺寸异常时返回 `None`
    fn to_rgb(frame: &Frame) -> Option<RgbImage> {
        if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
            return None;
        }
        // SAFETY: 帧指针非空; 每个平面的可读长度为 linesize × 行数
        unsafe {
            let av = &*frame.as_ptr();
            if av.format != AV_PIX_FMT_YUV420P || av.decode_error_flags & 0x03 != 0 {
                return None;
            }
            if !(1..=MAX_DIMENSION).contains(&av.width) || !(1..=MAX_DIMENSION).contains(&av.height)
            {
                return None;
            }
            let (y_stride, uv_stride) = (av.linesize[0], av.linesize[1]);
            if y_stride <= 0 || uv_stride <= 0 || av.data[..3].iter().any(|p| p.is_null()) {
                return None;
            }

            let (w, h) = (av.width as u32, av.height as u32);
            let (y_stride, uv_stride) = (y_stride as usize, uv_stride as usize);
            let chroma_rows = (h as usize).div_ceil(2);
            let y = std::slice::from_raw_parts(av.data[0], y_stride * h as usize);
            let u = std::slice::from_raw_parts(av.data[1], uv_stride * chroma_rows);
            let v = std::slice::from_raw_parts(av.data[2], uv_stride * chroma_rows);
            yuv420p_to_rgb(y, u, v, y_stride, uv_stride, w, h)
        }
    }
}

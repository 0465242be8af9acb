// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 数字卫兵 (Digital Sentinel)
///
/// 多路帧源 → 姿态估计 → 标注快照
///
/// 系统架构:
/// 1. 帧源线程: 每路相机 (图片序列/视频/RTSP/摄像头) 一个线程
/// 2. 姿态线程: YOLOv8-pose 推理 + NMS
/// 3. 主线程:   消费流水线输出, 保存含有人的标注图与多路拼图
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use image::RgbImage;
use log::{info, warn};
use pose_sentinel::frame::render::{grid_image, LabelStyle};
use pose_sentinel::models::{OrtEngine, YoloPoseConfig, YoloPoseDetector};
use pose_sentinel::pipeline::{open_source, PipelineBuilder, SourceService, SourceKind};
use pose_sentinel::stages::PoseEstimation;
use pose_sentinel::{gen_time_string, PipelineConfig};

/// 数字卫兵参数 (命令行参数覆盖配置文件)
#[derive(Parser, Debug)]
#[command(author, version, about = "数字卫兵 - 多路人体姿态监控", long_about = None)]
struct Args {
    /// 配置文件 (不存在时写入默认配置)
    #[arg(short, long, default_value = "sentinel.json")]
    config: PathBuf,

    /// 帧源 (图片目录/文件, 视频文件, rtsp:// 地址或摄像头序号), 可重复
    #[arg(short, long)]
    source: Vec<String>,

    /// YOLOv8-pose ONNX 模型
    #[arg(short, long)]
    model: Option<String>,

    /// 标注快照输出目录
    #[arg(short, long)]
    output: Option<String>,

    /// 人体框置信度阈值
    #[arg(long)]
    conf: Option<f32>,

    /// 标签字体 (加载失败时只画框, 不画文字)
    #[arg(long, default_value = "assets/font/DejaVuSans.ttf")]
    font: PathBuf,

    /// 不保存单帧快照, 只输出拼图与统计
    #[arg(long, default_value_t = false)]
    no_snapshots: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = PipelineConfig::load_or_create(&args.config)?;
    if !args.source.is_empty() {
        config.camera_sources = args.source.clone();
    }
    if let Some(model) = args.model {
        config.model_path = model;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(conf) = args.conf {
        config.bbox_conf_threshold = conf;
    }
    config.validate()?;
    if config.camera_sources.is_empty() {
        bail!("no camera sources configured (use --source or camera_sources in config)");
    }
    config.print_summary();

    let output_dir = PathBuf::from(&config.output_dir);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let labels = match LabelStyle::from_file(&args.font, 16.0) {
        Ok(style) => {
            info!("✅ 标签字体加载成功: {}", args.font.display());
            Some(style)
        }
        Err(e) => {
            warn!("⚠️  未加载标签字体, 快照不含文字: {:#}", e);
            None
        }
    };

    info!("🚀 数字卫兵系统启动");

    // ========== 构建流水线 ==========
    let mut builder = PipelineBuilder::new(config.channel_capacity);
    for (source_id, entry) in config.camera_sources.iter().enumerate() {
        let kind = SourceKind::parse(entry);
        info!("📷 帧源 #{}: {}", source_id, kind);
        let interval = Duration::from_millis(config.frame_interval_ms);
        let kconf = config.keypoint_conf_threshold;
        builder = builder.source_with(move |tx| {
            Box::new(
                SourceService::new(format!("camera-{source_id}"), source_id, tx, move || {
                    open_source(&kind)
                })
                .with_frame_interval(interval)
                .with_keypoint_threshold(kconf),
            )
        });
    }

    let model_path = config.model_path.clone();
    let pose_config = YoloPoseConfig {
        input_width: config.input_width,
        input_height: config.input_height,
        conf_threshold: config.bbox_conf_threshold,
    };
    let nms = config.nms_iou_threshold;
    builder = builder.stage("pose", move || {
        let engine = OrtEngine::load(&model_path)?;
        Ok(PoseEstimation::new(YoloPoseDetector::new(engine, pose_config)).with_nms_threshold(nms))
    });

    let chain = builder.build();
    let mut pipeline = chain.pipeline;
    // 帧全部来自帧源, 不需要额外注入
    drop(chain.input);
    pipeline.start_all()?;

    // ========== 主线程: 消费输出 ==========
    let mut latest: BTreeMap<usize, RgbImage> = BTreeMap::new();
    let mut frames = 0u64;
    let mut persons = 0usize;
    for frame in chain.output.iter() {
        frames += 1;
        persons += frame.person_count();
        let annotated = frame.draw_persons(labels.as_ref(), 1.0, 1.0);

        if frame.person_count() > 0 && !args.no_snapshots {
            let file = output_dir.join(format!(
                "cam{}_{:06}_{}.jpg",
                frame.source_id,
                frame.index,
                gen_time_string("-")
            ));
            if let Err(e) = annotated.save(&file) {
                warn!("⚠️  快照保存失败 {}: {}", file.display(), e);
            }
        }
        latest.insert(frame.source_id, annotated);
    }

    pipeline.stop_all();
    info!("📊 共处理 {} 帧, 检出 {} 人次", frames, persons);
    for snapshot in pipeline.stats() {
        info!("📊 {}", serde_json::to_string(&snapshot)?);
    }

    save_grid(&latest, &output_dir)?;
    Ok(())
}

/// 每路相机最后一帧拼成一张总览图
fn save_grid(latest: &BTreeMap<usize, RgbImage>, output_dir: &Path) -> Result<()> {
    if latest.is_empty() {
        return Ok(());
    }
    let images: Vec<&RgbImage> = latest.values().collect();
    let cols = (images.len() as f32).sqrt().ceil() as u32;
    let rows = (images.len() as u32).div_ceil(cols);
    let grid = grid_image(&images, rows, cols, (640, 360));
    let file = output_dir.join(format!("grid_{}.jpg", gen_time_string("-")));
    grid.save(&file)
        .with_context(|| format!("failed to save {}", file.display()))?;
    info!("🖼️  总览图已保存: {}", file.display());
    Ok(())
}

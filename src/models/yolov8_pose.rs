// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8-pose 预处理与解码
// 包含: letterbox、张量构造、输出解码 (还原到原图坐标)

use anyhow::{bail, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array4, ArrayD, ArrayView2, Axis, Ix2};

use super::InferenceEngine;
use crate::detection::{Detection, Keypoint, PoseDetector, NUM_KEYPOINTS};
use crate::geometry::BoundingBox;

const CXYWH_OFFSET: usize = 4;
const KPT_STEP: usize = 3;
/// 每个候选框的行数: cx, cy, w, h, conf, 17 × (x, y, conf)
pub const POSE_ROWS: usize = CXYWH_OFFSET + 1 + KPT_STEP * NUM_KEYPOINTS;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloPoseConfig {
    pub input_width: u32,
    pub input_height: u32,
    /// 候选框置信度阈值
    pub conf_threshold: f32,
}

impl Default for YoloPoseConfig {
    fn default() -> Self {
        Self {
            input_width: 640,
            input_height: 640,
            conf_threshold: 0.5,
        }
    }
}

/// letterbox 变换参数: 保持长宽比缩放 + 两侧对称填充
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_w: u32,
    pub pad_h: u32,
    pub new_w: u32,
    pub new_h: u32,
}

impl Letterbox {
    /// 输入尺寸为 0 时按 1 处理
    pub fn new(w0: u32, h0: u32, input_w: u32, input_h: u32) -> Self {
        let (input_w, input_h) = (input_w.max(1), input_h.max(1));
        let scale = (input_w as f32 / w0 as f32).min(input_h as f32 / h0 as f32);
        let new_w = ((w0 as f32 * scale).round() as u32).clamp(1, input_w);
        let new_h = ((h0 as f32 * scale).round() as u32).clamp(1, input_h);
        Self {
            scale,
            pad_w: (input_w - new_w) / 2,
            pad_h: (input_h - new_h) / 2,
            new_w,
            new_h,
        }
    }

    /// 模型坐标 → 原图坐标
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_w as f32) / self.scale,
            (y - self.pad_h as f32) / self.scale,
        )
    }
}

/// 预处理: letterbox + 归一化, 输出 NCHW `[1, 3, H, W]`
pub fn preprocess(image: &RgbImage, config: &YoloPoseConfig) -> (Array4<f32>, Letterbox) {
    let (w0, h0) = image.dimensions();
    let lb = Letterbox::new(w0, h0, config.input_width, config.input_height);

    let resized = imageops::resize(image, lb.new_w, lb.new_h, FilterType::Triangle);
    let mut canvas = RgbImage::new(config.input_width, config.input_height);
    imageops::replace(&mut canvas, &resized, lb.pad_w as i64, lb.pad_h as i64);

    let mut xs = Array4::<f32>::zeros((
        1,
        3,
        config.input_height as usize,
        config.input_width as usize,
    ));
    for (x, y, rgb) in canvas.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = rgb.0;
        xs[[0, 0, y, x]] = (r as f32) / 255.0;
        xs[[0, 1, y, x]] = (g as f32) / 255.0;
        xs[[0, 2, y, x]] = (b as f32) / 255.0;
    }
    (xs, lb)
}

/// 解码模型输出 `[1, 56, N]` 或 `[56, N]`, 返回原图坐标下的候选检测 (未做 NMS)
pub fn decode(
    output: &ArrayD<f32>,
    lb: &Letterbox,
    original: (u32, u32),
    conf_threshold: f32,
) -> Result<Vec<Detection>> {
    let preds: ArrayView2<f32> = match output.ndim() {
        3 => output.index_axis(Axis(0), 0).into_dimensionality::<Ix2>()?,
        2 => output.view().into_dimensionality::<Ix2>()?,
        n => bail!("unexpected pose output rank {} (shape {:?})", n, output.shape()),
    };
    if preds.nrows() < POSE_ROWS {
        bail!(
            "pose output has {} rows, expected at least {}",
            preds.nrows(),
            POSE_ROWS
        );
    }

    let (w0, h0) = (original.0 as f32, original.1 as f32);
    let mut detections = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        let confidence = pred[CXYWH_OFFSET];
        // NaN 置信度同样跳过
        if !(confidence > conf_threshold) {
            continue;
        }

        let boxed = BoundingBox::from_cxcywh(pred[0], pred[1], pred[2], pred[3]);
        let (x_min, y_min) = lb.to_original(boxed.x_min(), boxed.y_min());
        let (x_max, y_max) = lb.to_original(boxed.x_max(), boxed.y_max());
        let bbox = BoundingBox::from_xyxy(x_min, y_min, x_max, y_max).clamp_to(w0, h0);

        let keypoints = (0..NUM_KEYPOINTS)
            .map(|i| {
                let base = CXYWH_OFFSET + 1 + KPT_STEP * i;
                let (kx, ky) = lb.to_original(pred[base], pred[base + 1]);
                Keypoint::new(kx, ky, pred[base + 2])
            })
            .collect();

        detections.push(Detection::new(bbox, keypoints, confidence));
    }
    Ok(detections)
}

/// YOLOv8-pose 检测器: 任意推理引擎 + letterbox 预处理/解码
pub struct YoloPoseDetector<E> {
    engine: E,
    config: YoloPoseConfig,
}

impl<E: InferenceEngine> YoloPoseDetector<E> {
    pub fn new(engine: E, mut config: YoloPoseConfig) -> Self {
        config.input_width = config.input_width.max(1);
        config.input_height = config.input_height.max(1);
        Self { engine, config }
    }

    pub fn config(&self) -> &YoloPoseConfig {
        &self.config
    }
}

impl<E: InferenceEngine> PoseDetector for YoloPoseDetector<E> {
    fn get_poses(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let (xs, lb) = preprocess(image, &self.config);
        let ys = self.engine.run(xs)?;
        decode(&ys, &lb, image.dimensions(), self.config.conf_threshold)
    }
}

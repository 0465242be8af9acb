// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 模型接口 (Model layer)
///
/// # 架构说明
///
/// 推理引擎本身是外部协作方, 这里只定义 [`InferenceEngine`] 接口:
/// NCHW 张量进, 原始输出张量出。
///
/// ```text
/// 原始图片 → letterbox 预处理 → [1,3,H,W] 张量
///          ↓
///     InferenceEngine::run
///          ↓
///     原始输出 [1,56,N] → 解码 (去 letterbox) → Vec<Detection>
/// ```
///
/// - `yolov8_pose`: YOLOv8-pose 预处理/解码, 以及组合成 `PoseDetector` 的 `YoloPoseDetector`
/// - `ort_engine`:  ONNX Runtime 引擎 (需要 `onnx` feature)
use anyhow::Result;
use ndarray::{Array4, ArrayD};

pub mod yolov8_pose;

#[cfg(feature = "onnx")]
pub mod ort_engine;

#[cfg(feature = "onnx")]
pub use ort_engine::OrtEngine;
pub use yolov8_pose::{Letterbox, YoloPoseConfig, YoloPoseDetector};

/// 推理引擎: 执行一次前向传播
pub trait InferenceEngine {
    fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        (**self).run(input)
    }
}

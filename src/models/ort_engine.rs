// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX Runtime 推理引擎 (需要 `onnx` feature)

use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use ndarray::{Array4, ArrayD, IxDyn};
use ort::session::Session;
use ort::value::Tensor;

use super::InferenceEngine;

pub struct OrtEngine {
    session: Session,
}

impl OrtEngine {
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let session = Session::builder()
            .context("failed to create ORT session builder")?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ONNX model {}", model_path.display()))?;
        info!("✅ ONNX 模型加载成功: {}", model_path.display());
        Ok(Self { session })
    }
}

impl InferenceEngine for OrtEngine {
    fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        let (n, c, h, w) = input.dim();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_array(([n, c, h, w], data.into_boxed_slice()))
            .context("failed to create input tensor")?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("ONNX inference failed")?;

        let (_name, value) = outputs.iter().next().context("model produced no outputs")?;
        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .context("failed to extract output tensor")?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();

        Ok(ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())?)
    }
}

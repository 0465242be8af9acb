// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测器接口 (Detector contract)
///
/// 流水线本身不做推理, 只规定检测器必须满足的契约:
/// - PoseDetector:     原始图像 → (bbox, keypoints, confidence) 列表
/// - FaceLocator:      原始图像 → 人脸框列表
/// - IdentityResolver: 人脸裁剪图 → 可选身份
pub mod types;

use anyhow::Result;
use image::RgbImage;

use crate::frame::Identity;
use crate::geometry::BoundingBox;
pub use types::{Detection, Keypoint, KEYPOINT_NAMES, NUM_KEYPOINTS, POSE_CONNECTIONS};

/// 姿态检测器
///
/// 实现内部可以自行 resize / pad / normalize, 但返回的检测必须是原始图像坐标。
pub trait PoseDetector {
    fn get_poses(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}

impl<D: PoseDetector + ?Sized> PoseDetector for Box<D> {
    fn get_poses(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        (**self).get_poses(image)
    }
}

/// 人脸定位器, 返回 (人脸框, 置信度)
pub trait FaceLocator {
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<(BoundingBox, f32)>>;
}

impl<F: FaceLocator + ?Sized> FaceLocator for Box<F> {
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<(BoundingBox, f32)>> {
        (**self).locate(image)
    }
}

/// 身份识别协作方 (人脸库比对由外部完成)
pub trait IdentityResolver {
    fn resolve(&mut self, face: &RgbImage) -> Result<Option<Identity>>;
}

impl<R: IdentityResolver + ?Sized> IdentityResolver for Box<R> {
    fn resolve(&mut self, face: &RgbImage) -> Result<Option<Identity>> {
        (**self).resolve(face)
    }
}

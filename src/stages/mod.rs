// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 流水线阶段 (FrameProcessor 实现)
///
/// - `pose`: 姿态估计, 为帧追加 Person
/// - `face`: 人脸识别, 为已有 Person 附加人脸与身份
pub mod face;
pub mod pose;

pub use face::{FaceIdentification, DEFAULT_FACE_CONF_THRESHOLD};
pub use pose::{PoseEstimation, DEFAULT_NMS_IOU_THRESHOLD};

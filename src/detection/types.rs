// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测数据结构定义
/// Data structures shared by detectors and pipeline stages
use crate::geometry::BoundingBox;

// ========== 公共常量 ==========

/// COCO 姿态关键点数量
pub const NUM_KEYPOINTS: usize = 17;

/// COCO 关键点名称 (下标即关键点序号)
pub const KEYPOINT_NAMES: [&str; NUM_KEYPOINTS] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// 骨架连线 (无向边, 仅用于渲染/下游消费)
pub const POSE_CONNECTIONS: [(usize, usize); 18] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (3, 5),
    (4, 6),
    (5, 6),
    (5, 7),
    (6, 8),
    (7, 9),
    (8, 10),
    (5, 11),
    (6, 12),
    (11, 12),
    (11, 13),
    (12, 14),
    (13, 15),
    (14, 16),
];

// ========== 数据结构 ==========

/// 姿态关键点 (x, y, confidence)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self {
            x,
            y,
            confidence: confidence.clamp(0., 1.),
        }
    }

    pub fn is_visible(&self, threshold: f32) -> bool {
        self.confidence > threshold
    }
}

/// 单个检测结果: 边界框 + 17个关键点 + 置信度
///
/// 坐标均为原始图像坐标 (已去除 letterbox 缩放/填充)。
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub keypoints: Vec<Keypoint>,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, keypoints: Vec<Keypoint>, confidence: f32) -> Self {
        Self {
            bbox,
            keypoints,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypoint_names_follow_coco_order() {
        assert_eq!(KEYPOINT_NAMES[0], "nose");
        assert_eq!(KEYPOINT_NAMES[5], "left_shoulder");
        assert_eq!(KEYPOINT_NAMES[NUM_KEYPOINTS - 1], "right_ankle");
        // 左右成对出现
        for i in (1..NUM_KEYPOINTS).step_by(2) {
            let left = KEYPOINT_NAMES[i].strip_prefix("left_").unwrap();
            let right = KEYPOINT_NAMES[i + 1].strip_prefix("right_").unwrap();
            assert_eq!(left, right);
        }
    }

    #[test]
    fn test_connections_reference_valid_keypoints() {
        for &(a, b) in POSE_CONNECTIONS.iter() {
            assert!(a < NUM_KEYPOINTS && b < NUM_KEYPOINTS);
            assert_ne!(a, b);
        }
        // 两肩相连
        assert!(POSE_CONNECTIONS.contains(&(5, 6)));
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use serde::{Deserialize, Serialize};

use crate::detection::{Detection, Keypoint};
use crate::geometry::BoundingBox;

/// 身份引用 (由外部身份识别协作方持有)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub user_name: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }
}

/// 人脸匹配结果
///
/// `identity == None` 表示检测到人脸但未识别出身份, 与 "没有人脸" (`Person::face() == None`) 区分。
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub identity: Option<Identity>,
}

/// 头部朝向
#[derive(Debug, Clone, PartialEq)]
pub struct HeadPose {
    pub bbox: BoundingBox,
    pub orientation: String,
}

/// 帧内的一个人 (Person)
///
/// 由检测阶段创建, 后续阶段只能追加信息 (`set_face` / `set_head` / `set_track_id`),
/// 已设置的字段不会被清除。
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub keypoints: Vec<Keypoint>,
    track_id: Option<u32>,
    face: Option<FaceMatch>,
    head: Option<HeadPose>,
}

impl Person {
    pub fn new(bbox: BoundingBox, confidence: f32, keypoints: Vec<Keypoint>) -> Self {
        Self {
            bbox,
            confidence,
            keypoints,
            track_id: None,
            face: None,
            head: None,
        }
    }

    pub fn track_id(&self) -> Option<u32> {
        self.track_id
    }

    pub fn face(&self) -> Option<&FaceMatch> {
        self.face.as_ref()
    }

    pub fn head(&self) -> Option<&HeadPose> {
        self.head.as_ref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.face.as_ref().and_then(|f| f.identity.as_ref())
    }

    pub fn is_identified(&self) -> bool {
        self.identity().is_some()
    }

    /// 跨帧跟踪器的扩展点, 当前流水线中没有跟踪算法
    pub fn set_track_id(&mut self, track_id: u32) {
        self.track_id = Some(track_id);
    }

    /// 设置人脸信息; 若本次未识别出身份, 保留之前识别到的身份
    pub fn set_face(&mut self, identity: Option<Identity>, bbox: BoundingBox, confidence: f32) {
        let previous = self.face.take().and_then(|f| f.identity);
        self.face = Some(FaceMatch {
            bbox,
            confidence,
            identity: identity.or(previous),
        });
    }

    pub fn set_head(&mut self, orientation: impl Into<String>, bbox: BoundingBox) {
        self.head = Some(HeadPose {
            bbox,
            orientation: orientation.into(),
        });
    }
}

impl From<Detection> for Person {
    fn from(detection: Detection) -> Self {
        Self::new(detection.bbox, detection.confidence, detection.keypoints)
    }
}

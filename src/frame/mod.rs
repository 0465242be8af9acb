// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 帧数据模型 (Frame data model)
///
/// 一帧 = 一次摄像头采集 + 流水线各阶段附加上去的检测结果。
/// 帧通过通道在阶段之间移交所有权, 发送后发送方不再持有。
pub mod person;
pub mod render;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use image::RgbImage;

pub use person::{FaceMatch, HeadPose, Identity, Person};

/// 关键点默认可信阈值
pub const DEFAULT_KEYPOINT_CONF_THRESHOLD: f32 = 0.5;

#[derive(Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    pub index: u64,
    pub source_id: usize,
    pub timestamp: DateTime<Local>,
    persons: Vec<Person>,
    pub keypoint_conf_threshold: f32,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self {
            image: Arc::new(image),
            index,
            source_id: 0,
            timestamp: Local::now(),
            persons: Vec::new(),
            keypoint_conf_threshold: DEFAULT_KEYPOINT_CONF_THRESHOLD,
        }
    }

    pub fn with_source(mut self, source_id: usize) -> Self {
        self.source_id = source_id;
        self
    }

    pub fn with_keypoint_threshold(mut self, threshold: f32) -> Self {
        self.keypoint_conf_threshold = threshold;
        self
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// 可写图像 (写时复制): 若缓冲区仍被其他帧共享 (扇出), 先复制一份
    pub fn image_mut(&mut self) -> &mut RgbImage {
        Arc::make_mut(&mut self.image)
    }

    /// 图像缓冲区是否与其他帧共享
    pub fn is_image_shared(&self) -> bool {
        Arc::strong_count(&self.image) > 1
    }

    pub fn add_person(&mut self, person: Person) {
        self.persons.push(person);
    }

    pub fn persons(&self) -> &[Person] {
        &self.persons
    }

    pub fn persons_mut(&mut self) -> &mut [Person] {
        &mut self.persons
    }

    pub fn person_count(&self) -> usize {
        self.persons.len()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("source_id", &self.source_id)
            .field("timestamp", &self.timestamp)
            .field("size", &format_args!("{}x{}", self.width(), self.height()))
            .field("num_persons", &self.persons.len())
            .finish()
    }
}

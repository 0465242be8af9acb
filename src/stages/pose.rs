// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use anyhow::Result;
use log::debug;

use crate::detection::PoseDetector;
use crate::frame::{Frame, Person};
use crate::geometry::non_max_suppression;
use crate::pipeline::FrameProcessor;

/// NMS 默认 IoU 阈值
pub const DEFAULT_NMS_IOU_THRESHOLD: f32 = 0.8;

/// 姿态估计阶段: 检测器 → NMS → 追加 Person
pub struct PoseEstimation<D> {
    detector: D,
    nms_iou_threshold: f32,
}

impl<D: PoseDetector> PoseEstimation<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            nms_iou_threshold: DEFAULT_NMS_IOU_THRESHOLD,
        }
    }

    pub fn with_nms_threshold(mut self, iou_threshold: f32) -> Self {
        self.nms_iou_threshold = iou_threshold;
        self
    }
}

impl<D: PoseDetector> FrameProcessor for PoseEstimation<D> {
    fn process(&mut self, frame: &mut Frame) -> Result<()> {
        let detections = self.detector.get_poses(frame.image())?;
        if detections.is_empty() {
            return Ok(());
        }

        let boxes: Vec<_> = detections.iter().map(|d| d.bbox).collect();
        let confidences: Vec<_> = detections.iter().map(|d| d.confidence).collect();
        let mut keep = non_max_suppression(&boxes, &confidences, self.nms_iou_threshold);
        // 保持检测器输出顺序
        keep.sort_unstable();

        debug!(
            "🧍 帧 #{}: {} 个候选, NMS 后 {} 人",
            frame.index,
            detections.len(),
            keep.len()
        );

        let mut detections: Vec<Option<_>> = detections.into_iter().map(Some).collect();
        for i in keep {
            if let Some(detection) = detections[i].take() {
                frame.add_person(Person::from(detection));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Detection;
    use crate::geometry::BoundingBox;
    use anyhow::bail;
    use image::RgbImage;

    struct Fixed(Vec<Detection>);

    impl PoseDetector for Fixed {
        fn get_poses(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl PoseDetector for Broken {
        fn get_poses(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
            bail!("inference failed")
        }
    }

    fn det(x: f32, y: f32, conf: f32) -> Detection {
        Detection::new(BoundingBox::from_xywh(x, y, 10., 10.), Vec::new(), conf)
    }

    #[test]
    fn test_overlapping_detections_are_suppressed() {
        let detector = Fixed(vec![det(0., 0., 0.9), det(1., 1., 0.8), det(50., 50., 0.95)]);
        let mut stage = PoseEstimation::new(detector).with_nms_threshold(0.5);
        let mut frame = Frame::new(RgbImage::new(64, 64), 0);
        stage.process(&mut frame).unwrap();

        let confs: Vec<f32> = frame.persons().iter().map(|p| p.confidence).collect();
        assert_eq!(confs, vec![0.9, 0.95]);
    }

    #[test]
    fn test_default_threshold_keeps_moderate_overlap() {
        let detector = Fixed(vec![det(0., 0., 0.9), det(1., 1., 0.8)]);
        let mut stage = PoseEstimation::new(detector);
        let mut frame = Frame::new(RgbImage::new(64, 64), 0);
        stage.process(&mut frame).unwrap();
        // IoU = 81/119 < 0.8
        assert_eq!(frame.person_count(), 2);
    }

    #[test]
    fn test_detector_error_leaves_frame_untouched() {
        let mut stage = PoseEstimation::new(Broken);
        let mut frame = Frame::new(RgbImage::new(8, 8), 3);
        assert!(stage.process(&mut frame).is_err());
        assert_eq!(frame.person_count(), 0);
    }
}

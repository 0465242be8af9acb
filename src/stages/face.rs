// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use anyhow::Result;
use image::{imageops, RgbImage};
use log::{debug, warn};

use crate::detection::{FaceLocator, IdentityResolver};
use crate::frame::Frame;
use crate::geometry::BoundingBox;
use crate::pipeline::FrameProcessor;

pub const DEFAULT_FACE_CONF_THRESHOLD: f32 = 0.5;

/// 人脸识别阶段: 定位人脸 → 归属到重叠最多的人 → 裁剪 → 身份识别 → `set_face`
///
/// 每个人每帧最多分配一张人脸 (置信度高者优先)。
/// 身份识别失败只影响该人脸, 不会丢弃整帧。
pub struct FaceIdentification<L, R> {
    locator: L,
    resolver: R,
    min_confidence: f32,
}

impl<L: FaceLocator, R: IdentityResolver> FaceIdentification<L, R> {
    pub fn new(locator: L, resolver: R) -> Self {
        Self {
            locator,
            resolver,
            min_confidence: DEFAULT_FACE_CONF_THRESHOLD,
        }
    }

    pub fn with_min_confidence(mut self, threshold: f32) -> Self {
        self.min_confidence = threshold;
        self
    }
}

/// 与人脸重叠面积最大且尚未分配的人
fn best_owner(face: &BoundingBox, persons: &[BoundingBox], taken: &[bool]) -> Option<usize> {
    persons
        .iter()
        .enumerate()
        .filter(|(i, _)| !taken[*i])
        .map(|(i, bbox)| (i, bbox.intersection_area(face)))
        .filter(|(_, overlap)| *overlap > 0.)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// 复制出人脸区域, 区域为空时返回 None
fn crop_face(image: &RgbImage, face: &BoundingBox) -> Option<RgbImage> {
    let (w, h) = image.dimensions();
    let face = face.clamp_to(w as f32, h as f32);
    let x = face.x_min().floor() as u32;
    let y = face.y_min().floor() as u32;
    let crop_w = (face.x_max().ceil() as u32).min(w).saturating_sub(x);
    let crop_h = (face.y_max().ceil() as u32).min(h).saturating_sub(y);
    if crop_w == 0 || crop_h == 0 {
        return None;
    }
    Some(imageops::crop_imm(image, x, y, crop_w, crop_h).to_image())
}

impl<L: FaceLocator, R: IdentityResolver> FrameProcessor for FaceIdentification<L, R> {
    fn process(&mut self, frame: &mut Frame) -> Result<()> {
        if frame.person_count() == 0 {
            return Ok(());
        }
        let mut faces = self.locator.locate(frame.image())?;
        faces.retain(|(_, conf)| *conf >= self.min_confidence);
        faces.sort_by(|a, b| b.1.total_cmp(&a.1));

        let person_boxes: Vec<BoundingBox> = frame.persons().iter().map(|p| p.bbox).collect();
        let mut taken = vec![false; person_boxes.len()];

        for (face_box, confidence) in faces {
            let Some(owner) = best_owner(&face_box, &person_boxes, &taken) else {
                continue;
            };
            let Some(crop) = crop_face(frame.image(), &face_box) else {
                continue;
            };
            taken[owner] = true;

            let identity = match self.resolver.resolve(&crop) {
                Ok(identity) => identity,
                Err(e) => {
                    warn!("⚠️  帧 #{} 身份识别失败: {:#}", frame.index, e);
                    None
                }
            };
            if let Some(identity) = &identity {
                debug!("👤 帧 #{}: 识别到 {} ({})", frame.index, identity.user_name, identity.user_id);
            }
            frame.persons_mut()[owner].set_face(identity, face_box, confidence);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Identity, Person};
    use anyhow::bail;
    use image::Rgb;

    struct Faces(Vec<(BoundingBox, f32)>);

    impl FaceLocator for Faces {
        fn locate(&mut self, _image: &RgbImage) -> Result<Vec<(BoundingBox, f32)>> {
            Ok(self.0.clone())
        }
    }

    /// 根据裁剪图左上角像素的红色通道识别身份, 0 表示陌生人
    struct ByColor;

    impl IdentityResolver for ByColor {
        fn resolve(&mut self, face: &RgbImage) -> Result<Option<Identity>> {
            match face.get_pixel(0, 0)[0] {
                0 => Ok(None),
                255 => bail!("face database unavailable"),
                id => Ok(Some(Identity::new(id.to_string(), format!("user-{id}")))),
            }
        }
    }

    fn frame_with_persons() -> Frame {
        let mut image = RgbImage::new(100, 100);
        for (x, y, p) in image.enumerate_pixels_mut() {
            if x < 50 && y < 20 {
                *p = Rgb([7, 0, 0]);
            } else if x >= 60 && y < 20 {
                *p = Rgb([255, 0, 0]);
            }
        }
        let mut frame = Frame::new(image, 0);
        frame.add_person(Person::new(BoundingBox::from_xyxy(0., 0., 50., 100.), 0.9, Vec::new()));
        frame.add_person(Person::new(BoundingBox::from_xyxy(55., 0., 100., 100.), 0.8, Vec::new()));
        frame
    }

    #[test]
    fn test_faces_assigned_to_overlapping_person() {
        let faces = Faces(vec![
            (BoundingBox::from_xyxy(10., 2., 30., 18.), 0.9),
            (BoundingBox::from_xyxy(65., 2., 85., 18.), 0.7),
        ]);
        let mut stage = FaceIdentification::new(faces, ByColor);
        let mut frame = frame_with_persons();
        stage.process(&mut frame).unwrap();

        let first = &frame.persons()[0];
        assert_eq!(first.identity(), Some(&Identity::new("7", "user-7")));
        assert_eq!(first.face().unwrap().confidence, 0.9);

        // 第二张脸识别出错: 记录人脸, 但没有身份
        let second = &frame.persons()[1];
        assert!(second.face().is_some());
        assert!(!second.is_identified());
    }

    #[test]
    fn test_low_confidence_and_orphan_faces_are_ignored() {
        let faces = Faces(vec![
            (BoundingBox::from_xyxy(10., 2., 30., 18.), 0.3),
            (BoundingBox::from_xyxy(51., 2., 54., 18.), 0.9),
        ]);
        let mut stage = FaceIdentification::new(faces, ByColor);
        let mut frame = frame_with_persons();
        stage.process(&mut frame).unwrap();
        assert!(frame.persons().iter().all(|p| p.face().is_none()));
    }

    #[test]
    fn test_min_confidence_is_configurable() {
        let faint = || Faces(vec![(BoundingBox::from_xyxy(10., 2., 30., 18.), 0.3)]);

        let mut stage = FaceIdentification::new(faint(), ByColor).with_min_confidence(0.25);
        let mut frame = frame_with_persons();
        stage.process(&mut frame).unwrap();
        assert_eq!(frame.persons()[0].face().unwrap().confidence, 0.3);
        assert!(frame.persons()[0].is_identified());

        // 阈值本身也算通过
        let mut stage = FaceIdentification::new(faint(), ByColor).with_min_confidence(0.3);
        let mut frame = frame_with_persons();
        stage.process(&mut frame).unwrap();
        assert!(frame.persons()[0].face().is_some());

        let mut stage = FaceIdentification::new(faint(), ByColor).with_min_confidence(0.9);
        let mut frame = frame_with_persons();
        stage.process(&mut frame).unwrap();
        assert!(frame.persons()[0].face().is_none());
    }

    #[test]
    fn test_one_face_per_person_highest_confidence_wins() {
        let faces = Faces(vec![
            (BoundingBox::from_xyxy(10., 30., 30., 40.), 0.6),
            (BoundingBox::from_xyxy(10., 2., 30., 18.), 0.95),
        ]);
        let mut stage = FaceIdentification::new(faces, ByColor);
        let mut frame = frame_with_persons();
        stage.process(&mut frame).unwrap();
        assert_eq!(frame.persons()[0].face().unwrap().confidence, 0.95);
        assert!(frame.persons()[1].face().is_none());
    }

    #[test]
    fn test_crop_is_a_copy_and_clamped() {
        let image = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
        let crop = crop_face(&image, &BoundingBox::from_xyxy(6.5, -3., 14., 4.2)).unwrap();
        assert_eq!(crop.dimensions(), (4, 5));
        assert!(crop_face(&image, &BoundingBox::from_xyxy(20., 20., 30., 30.)).is_none());
    }
}

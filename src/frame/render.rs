// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 帧渲染 (下游可视化用)
//!
//! 所有绘制都在图像副本上进行, 不修改帧自身的缓冲区。

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;

use super::{Frame, Person};
use crate::detection::POSE_CONNECTIONS;
use crate::geometry::BoundingBox;

pub const PERSON_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const HEAD_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const FACE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const KEYPOINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const SKELETON_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

const BOX_THICKNESS: i32 = 4;
const KEYPOINT_RADIUS: i32 = 3;

/// 文字标签样式: 跟踪号 (人物框)、朝向 (头部框)、姓名与置信度 (人脸框)
#[derive(Clone)]
pub struct LabelStyle {
    font: FontArc,
    size: f32,
}

impl LabelStyle {
    pub fn new(font: FontArc, size: f32) -> Self {
        Self {
            font,
            size: size.max(1.0),
        }
    }

    pub fn from_file(path: impl AsRef<Path>, size: f32) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))?;
        Ok(Self::new(font, size))
    }

    pub fn size(&self) -> f32 {
        self.size
    }
}

impl Frame {
    /// 在图像副本上绘制所有人的检测框/关键点/骨架/头部/人脸,
    /// `labels` 为 `Some` 时同时绘制文字标签
    pub fn draw_persons(&self, labels: Option<&LabelStyle>, scale_x: f32, scale_y: f32) -> RgbImage {
        let mut canvas = self.image().clone();
        for person in self.persons() {
            draw_person_on(
                &mut canvas,
                person,
                labels,
                self.keypoint_conf_threshold,
                (scale_x, scale_y),
            );
        }
        canvas
    }

    /// 只绘制指定用户 (已识别身份) 的人
    pub fn draw_person(
        &self,
        user_id: &str,
        labels: Option<&LabelStyle>,
        scale_x: f32,
        scale_y: f32,
    ) -> RgbImage {
        let mut canvas = self.image().clone();
        for person in self
            .persons()
            .iter()
            .filter(|p| p.identity().is_some_and(|id| id.user_id == user_id))
        {
            draw_person_on(
                &mut canvas,
                person,
                labels,
                self.keypoint_conf_threshold,
                (scale_x, scale_y),
            );
        }
        canvas
    }
}

fn draw_person_on(
    canvas: &mut RgbImage,
    person: &Person,
    labels: Option<&LabelStyle>,
    kconf: f32,
    (sx, sy): (f32, f32),
) {
    let person_box = draw_box(canvas, &person.bbox.scale(sx, sy), PERSON_COLOR);

    let head_box = person
        .head()
        .map(|head| (draw_box(canvas, &head.bbox.scale(sx, sy), HEAD_COLOR), head));

    // 关键点
    for kpt in person.keypoints.iter().filter(|k| k.is_visible(kconf)) {
        let (x, y) = (kpt.x * sx, kpt.y * sy);
        if on_canvas(canvas, x, y) {
            let center = (x.round() as i32, y.round() as i32);
            draw_filled_circle_mut(canvas, center, KEYPOINT_RADIUS, KEYPOINT_COLOR);
        }
    }

    // 骨架连线
    for &(start, end) in POSE_CONNECTIONS.iter() {
        let (Some(a), Some(b)) = (person.keypoints.get(start), person.keypoints.get(end)) else {
            continue;
        };
        if !(a.is_visible(kconf) && b.is_visible(kconf)) {
            continue;
        }
        let (from, to) = ((a.x * sx, a.y * sy), (b.x * sx, b.y * sy));
        if on_canvas(canvas, from.0, from.1) && on_canvas(canvas, to.0, to.1) {
            draw_thick_line(canvas, from, to, SKELETON_COLOR);
        }
    }

    let face_box = person
        .face()
        .map(|face| (draw_box(canvas, &face.bbox.scale(sx, sy), FACE_COLOR), face));

    let Some(style) = labels else {
        return;
    };
    if let (Some(bbox), Some(track_id)) = (person_box, person.track_id()) {
        draw_label(canvas, style, &bbox, PERSON_COLOR, &format!("#{track_id}"));
    }
    if let Some((Some(bbox), head)) = head_box {
        draw_label(canvas, style, &bbox, HEAD_COLOR, &head.orientation);
    }
    if let Some((Some(bbox), face)) = face_box {
        let text = match &face.identity {
            Some(identity) => format!("{} {:.2}", identity.user_name, face.confidence),
            None => format!("{:.2}", face.confidence),
        };
        draw_label(canvas, style, &bbox, FACE_COLOR, &text);
    }
}

/// 画布范围内 (含关键点半径的外沿) 的有限坐标
fn on_canvas(canvas: &RgbImage, x: f32, y: f32) -> bool {
    let margin = KEYPOINT_RADIUS as f32;
    x.is_finite()
        && y.is_finite()
        && (-margin..canvas.width() as f32 + margin).contains(&x)
        && (-margin..canvas.height() as f32 + margin).contains(&y)
}

/// 裁剪到画布后绘制; 返回实际绘制的框, 完全在画布外时返回 `None`
fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) -> Option<BoundingBox> {
    let (cw, ch) = canvas.dimensions();
    let visible = bbox.clamp_to(cw as f32, ch as f32);
    if !(visible.width() >= 1.0 && visible.height() >= 1.0) {
        return None;
    }
    let x = visible.x_min().round() as i32;
    let y = visible.y_min().round() as i32;
    let w = visible.width().round() as i32;
    let h = visible.height().round() as i32;
    // 向内逐像素收缩, 模拟线宽
    for t in 0..BOX_THICKNESS {
        let (rw, rh) = (w - 2 * t, h - 2 * t);
        if rw <= 0 || rh <= 0 {
            break;
        }
        let rect = Rect::at(x + t, y + t).of_size(rw as u32, rh as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
    Some(visible)
}

/// 标签画在框的上方; 贴近画布顶部时画在框内
fn draw_label(
    canvas: &mut RgbImage,
    style: &LabelStyle,
    bbox: &BoundingBox,
    color: Rgb<u8>,
    text: &str,
) {
    let x = bbox.x_min().round() as i32;
    let y = (bbox.y_min() - style.size).max(0.0).round() as i32;
    draw_text_mut(canvas, color, x, y, PxScale::from(style.size), &style.font, text);
}

fn draw_thick_line(canvas: &mut RgbImage, from: (f32, f32), to: (f32, f32), color: Rgb<u8>) {
    let half = BOX_THICKNESS / 2;
    for offset in -half..half {
        let o = offset as f32;
        draw_line_segment_mut(canvas, (from.0 + o, from.1), (to.0 + o, to.1), color);
        draw_line_segment_mut(canvas, (from.0, from.1 + o), (to.0, to.1 + o), color);
    }
}

/// 多路摄像头拼图: 每个单元格缩放到 `cell_size`, 超出 `rows * cols` 的图像被忽略
pub fn grid_image(images: &[&RgbImage], rows: u32, cols: u32, cell_size: (u32, u32)) -> RgbImage {
    let (cell_w, cell_h) = cell_size;
    let mut grid = RgbImage::new(cell_w * cols, cell_h * rows);
    let capacity = (rows * cols) as usize;

    for (idx, img) in images.iter().take(capacity).enumerate() {
        let resized = imageops::resize(*img, cell_w, cell_h, FilterType::Triangle);
        let (row, col) = (idx as u32 / cols, idx as u32 % cols);
        imageops::replace(
            &mut grid,
            &resized,
            (col * cell_w) as i64,
            (row * cell_h) as i64,
        );
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Keypoint;
    use crate::frame::Identity;

    fn frame_with_person() -> Frame {
        let mut frame = Frame::new(RgbImage::new(100, 100), 0);
        let mut keypoints = vec![Keypoint::default(); 17];
        keypoints[5] = Keypoint::new(20., 30., 0.9);
        keypoints[6] = Keypoint::new(40., 30., 0.9);
        frame.add_person(Person::new(
            BoundingBox::from_xyxy(10., 10., 50., 60.),
            0.9,
            keypoints,
        ));
        frame
    }

    #[test]
    fn test_draw_persons_leaves_frame_untouched() {
        let frame = frame_with_person();
        let canvas = frame.draw_persons(None, 1., 1.);

        assert_eq!(canvas.get_pixel(10, 10), &PERSON_COLOR);
        assert_eq!(canvas.get_pixel(18, 29), &KEYPOINT_COLOR);
        // 肩膀连线中点
        assert_eq!(canvas.get_pixel(30, 30), &SKELETON_COLOR);
        assert_eq!(frame.image().get_pixel(10, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_person_filters_by_user() {
        let mut frame = frame_with_person();
        let canvas = frame.draw_person("u-1", None, 1., 1.);
        assert_eq!(canvas.get_pixel(10, 10), &Rgb([0, 0, 0]));

        frame.persons_mut()[0].set_face(
            Some(Identity::new("u-1", "Alice")),
            BoundingBox::from_xyxy(25., 12., 35., 22.),
            0.8,
        );
        let canvas = frame.draw_person("u-1", None, 1., 1.);
        assert_eq!(canvas.get_pixel(10, 10), &PERSON_COLOR);
        assert_eq!(canvas.get_pixel(25, 12), &FACE_COLOR);
    }

    fn label_style() -> LabelStyle {
        let font = FontArc::try_from_slice(include_bytes!("../../assets/font/DejaVuSans.ttf"))
            .unwrap();
        LabelStyle::new(font, 14.)
    }

    fn count_pixels(
        img: &RgbImage,
        xs: std::ops::Range<u32>,
        ys: std::ops::Range<u32>,
        pred: impl Fn(&Rgb<u8>) -> bool,
    ) -> usize {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .filter(|&(x, y)| pred(img.get_pixel(x, y)))
            .count()
    }

    #[test]
    fn test_labels_drawn_on_copy_only() {
        let mut frame = Frame::new(RgbImage::new(120, 120), 0);
        let mut person = Person::new(
            BoundingBox::from_xyxy(20., 40., 80., 90.),
            0.9,
            vec![Keypoint::default(); 17],
        );
        person.set_track_id(3);
        person.set_head("front", BoundingBox::from_xyxy(30., 50., 50., 65.));
        person.set_face(
            Some(Identity::new("u-1", "alice")),
            BoundingBox::from_xyxy(35., 70., 60., 85.),
            0.87,
        );
        frame.add_person(person);

        let style = label_style();
        let labeled = frame.draw_persons(Some(&style), 1., 1.);
        let plain = frame.draw_persons(None, 1., 1.);

        let green = |p: &Rgb<u8>| p[1] > 0 && p[0] == 0 && p[2] == 0;
        let red = |p: &Rgb<u8>| p[0] > 0 && p[1] == 0 && p[2] == 0;
        let blue = |p: &Rgb<u8>| p[2] > 0 && p[0] == 0 && p[1] == 0;
        let lit = |p: &Rgb<u8>| p.0 != [0, 0, 0];

        // 跟踪号在人物框上方
        assert!(count_pixels(&labeled, 20..30, 26..40, green) > 0);
        assert_eq!(count_pixels(&plain, 0..120, 0..40, lit), 0);
        // 朝向在头部框上方
        assert!(count_pixels(&labeled, 30..60, 36..50, red) > 0);
        assert_eq!(count_pixels(&plain, 30..60, 44..50, red), 0);
        // 姓名在人脸框上方
        assert!(count_pixels(&labeled, 52..76, 56..70, blue) > 0);
        assert_eq!(count_pixels(&plain, 52..76, 56..70, blue), 0);

        assert_eq!(count_pixels(frame.image(), 0..120, 0..120, lit), 0);
    }

    #[test]
    fn test_unidentified_face_label_and_missing_track_id() {
        let mut frame = Frame::new(RgbImage::new(120, 120), 0);
        let mut person = Person::new(BoundingBox::from_xyxy(20., 40., 80., 90.), 0.9, Vec::new());
        person.set_face(None, BoundingBox::from_xyxy(35., 70., 60., 85.), 0.5);
        frame.add_person(person);

        let labeled = frame.draw_persons(Some(&label_style()), 1., 1.);
        let lit = |p: &Rgb<u8>| p.0 != [0, 0, 0];
        // 没有跟踪号时人物框上方为空
        assert_eq!(count_pixels(&labeled, 0..120, 0..40, lit), 0);
        assert!(count_pixels(&labeled, 35..76, 56..70, |p| p[2] > 0 && p[1] == 0) > 0);
    }

    #[test]
    fn test_off_canvas_geometry_is_skipped() {
        let mut frame = frame_with_person();
        frame.persons_mut()[0].set_head("left", BoundingBox::from_xyxy(12., 12., 30., 25.));
        let style = label_style();

        // 放大后全部落在画布之外
        let canvas = frame.draw_persons(Some(&style), 1e9, 1e9);
        assert_eq!(&canvas, frame.image());
        let canvas = frame.draw_persons(Some(&style), f32::NAN, 1.);
        assert_eq!(&canvas, frame.image());

        // 部分越界的框被裁剪到画布
        let mut frame = Frame::new(RgbImage::new(40, 40), 0);
        frame.add_person(Person::new(
            BoundingBox::from_xyxy(-1e6, -1e6, 20., 20.),
            0.9,
            Vec::new(),
        ));
        let canvas = frame.draw_persons(Some(&style), 1., 1.);
        assert_eq!(canvas.get_pixel(0, 0), &PERSON_COLOR);
        assert_eq!(canvas.get_pixel(19, 10), &PERSON_COLOR);
        assert_eq!(canvas.get_pixel(25, 25), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_label_style_from_file() {
        let style = LabelStyle::from_file(
            concat!(env!("CARGO_MANIFEST_DIR"), "/assets/font/DejaVuSans.ttf"),
            0.,
        )
        .unwrap();
        assert_eq!(style.size(), 1.);
        assert!(LabelStyle::from_file("missing-font.ttf", 14.).is_err());

        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();
        assert!(LabelStyle::from_file(&bogus, 14.).is_err());
    }

    #[test]
    fn test_grid_image_layout() {
        let red = RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]));
        let blue = RgbImage::from_pixel(16, 16, Rgb([0, 0, 255]));
        let grid = grid_image(&[&red, &blue, &red], 1, 2, (4, 4));

        assert_eq!(grid.dimensions(), (8, 4));
        assert_eq!(grid.get_pixel(1, 1), &Rgb([255, 0, 0]));
        assert_eq!(grid.get_pixel(5, 1), &Rgb([0, 0, 255]));
    }
}

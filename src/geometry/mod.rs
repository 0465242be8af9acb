// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 几何过滤模块 (Geometry)
// 纯函数: IoU / 中心距离 / 合并框 / NMS / 近邻合并

/// 边界框 (Bounding box)
///
/// 内部统一使用角点形式 `(x_min, y_min, x_max, y_max)`,
/// `(x, y, w, h)` 形式只在边界处通过 [`BoundingBox::from_xywh`] / [`BoundingBox::xywh`] 转换。
/// 负宽高在构造时被压成 0 (退化框面积为 0, 不会为负)。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    x_min: f32,
    y_min: f32,
    x_max: f32,
    y_max: f32,
}

impl BoundingBox {
    pub fn from_xyxy(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max: x_max.max(x_min),
            y_max: y_max.max(y_min),
        }
    }

    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::from_xyxy(x, y, x + width.max(0.0), y + height.max(0.0))
    }

    /// 由中心点和宽高构造 (YOLO 输出格式)
    pub fn from_cxcywh(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        let (w, h) = (width.max(0.0), height.max(0.0));
        Self::from_xyxy(cx - w / 2., cy - h / 2., cx + w / 2., cy + h / 2.)
    }

    pub fn x_min(&self) -> f32 {
        self.x_min
    }

    pub fn y_min(&self) -> f32 {
        self.y_min
    }

    pub fn x_max(&self) -> f32 {
        self.x_max
    }

    pub fn y_max(&self) -> f32 {
        self.y_max
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn xywh(&self) -> [f32; 4] {
        [self.x_min, self.y_min, self.width(), self.height()]
    }

    pub fn xyxy(&self) -> [f32; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.x_min + self.x_max) / 2.,
            (self.y_min + self.y_max) / 2.,
        )
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    pub fn intersection_area(&self, another: &BoundingBox) -> f32 {
        let l = self.x_min.max(another.x_min);
        let r = self.x_max.min(another.x_max);
        let t = self.y_min.max(another.y_min);
        let b = self.y_max.min(another.y_max);
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union_area(&self, another: &BoundingBox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    /// 按比例缩放 (用于渲染缩放或坐标还原)
    pub fn scale(&self, sx: f32, sy: f32) -> Self {
        Self::from_xyxy(
            self.x_min * sx,
            self.y_min * sy,
            self.x_max * sx,
            self.y_max * sy,
        )
    }

    /// 裁剪到图像范围 `[0, width] x [0, height]`
    pub fn clamp_to(&self, width: f32, height: f32) -> Self {
        Self::from_xyxy(
            self.x_min.clamp(0., width),
            self.y_min.clamp(0., height),
            self.x_max.clamp(0., width),
            self.y_max.clamp(0., height),
        )
    }
}

/// 交并比 (Intersection over Union), 并集面积为 0 时返回 0
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let union = a.union_area(b);
    if union <= 0. {
        return 0.;
    }
    (a.intersection_area(b) / union).clamp(0., 1.)
}

/// 两个框中心点的欧氏距离
pub fn center_distance(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let (ax, ay) = a.center();
    let (bx, by) = b.center();
    (ax - bx).hypot(ay - by)
}

/// 同时包含两个框的最小框
pub fn union_box(a: &BoundingBox, b: &BoundingBox) -> BoundingBox {
    BoundingBox::from_xyxy(
        a.x_min.min(b.x_min),
        a.y_min.min(b.y_min),
        a.x_max.max(b.x_max),
        a.y_max.max(b.y_max),
    )
}

/// 非极大值抑制 (Non-Maximum Suppression)
///
/// 按置信度降序处理 (置信度相同按输入顺序, 先出现者优先),
/// 与已保留框 IoU 超过 `iou_threshold` 的框被抑制。
/// NaN 置信度排在最后, 不会抑制任何有效置信度的框。
/// 返回保留框的下标, 顺序即处理顺序。`boxes` 与 `confidences` 长度不一致时只看公共部分。
pub fn non_max_suppression(
    boxes: &[BoundingBox],
    confidences: &[f32],
    iou_threshold: f32,
) -> Vec<usize> {
    let n = boxes.len().min(confidences.len());
    let rank = |i: usize| {
        let c = confidences[i];
        if c.is_nan() {
            f32::NEG_INFINITY
        } else {
            c
        }
    };
    let mut order: Vec<usize> = (0..n).collect();
    // sort_by 是稳定排序, 平分时保持输入顺序
    order.sort_by(|&i, &j| rank(j).total_cmp(&rank(i)));

    let mut keep: Vec<usize> = Vec::with_capacity(n);
    for index in order {
        let suppressed = keep
            .iter()
            .any(|&kept| iou(&boxes[kept], &boxes[index]) > iou_threshold);
        if !suppressed {
            keep.push(index);
        }
    }
    keep
}

/// 合并重叠或相近的框
///
/// 单次从左到右扫描: 每个框并入第一个 IoU > 0 或中心距离
/// `< distance_threshold * max(w, h)` (w/h 取当前框) 的已合并框, 否则自成一组。
/// 不迭代到不动点, 结果依赖输入顺序。
pub fn merge_close_boxes(boxes: &[BoundingBox], distance_threshold: f32) -> Vec<BoundingBox> {
    let mut merged: Vec<BoundingBox> = Vec::new();
    for current in boxes {
        let limit = distance_threshold * current.width().max(current.height());
        let target = merged.iter_mut().find(|group| {
            iou(current, group) > 0. || center_distance(current, group) < limit
        });
        match target {
            Some(group) => *group = union_box(current, group),
            None => merged.push(*current),
        }
    }
    merged
}

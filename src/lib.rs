// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 流水线配置参数
pub mod detection; // 检测器接口与检测结果
pub mod error; // 错误类型
pub mod frame; // 帧与人物数据模型, 渲染
pub mod geometry; // 边界框几何: IoU / NMS / 合并
pub mod models; // 推理引擎接口与 YOLOv8-pose 解码
pub mod pipeline; // 服务生命周期、阶段与编排
pub mod stages; // 具体处理阶段

pub use crate::config::PipelineConfig;
pub use crate::detection::{Detection, FaceLocator, IdentityResolver, Keypoint, PoseDetector};
pub use crate::error::{ConfigError, PipelineError};
pub use crate::frame::{Frame, Identity, Person};
pub use crate::geometry::{
    center_distance, iou, merge_close_boxes, non_max_suppression, union_box, BoundingBox,
};
pub use crate::pipeline::{
    FrameProcessor, FrameSource, Pipeline, PipelineBuilder, Service, ServiceState, Stage,
};

/// 本地时间字符串, 用作快照文件名
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen_time_string_layout() {
        let s = gen_time_string("-");
        let parts: Vec<&str> = s.split('-').collect();
        assert_eq!(parts.len(), 7);
        assert_eq!(parts[0].len(), 4);
        assert_eq!(parts[6].len(), 9);
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 流水线配置 - 通过JSON文件调整参数

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 流水线参数配置, 缺失的字段取默认值
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // === 输入 ===
    pub camera_sources: Vec<String>, // 图片目录/文件、视频文件、流地址或摄像头序号, 下标即 source_id
    pub frame_interval_ms: u64,      // 回放帧间隔, 0 = 不限速

    // === 模型 ===
    pub model_path: String,
    pub input_width: u32,
    pub input_height: u32,

    // === 阈值 ===
    pub bbox_conf_threshold: f32,     // 人体框置信度
    pub keypoint_conf_threshold: f32, // 关键点可见阈值
    pub nms_iou_threshold: f32,       // NMS IOU阈值

    // === 流水线 ===
    pub channel_capacity: usize, // 相邻阶段之间的队列长度
    pub output_dir: String,      // 标注快照输出目录
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            camera_sources: Vec::new(),
            frame_interval_ms: 0,

            model_path: "models/yolov8n-pose.onnx".to_string(),
            input_width: 640,
            input_height: 640,

            bbox_conf_threshold: 0.5,
            keypoint_conf_threshold: 0.5,
            nms_iou_threshold: 0.8,

            channel_capacity: 8,
            output_dir: "runs/sentinel".to_string(),
        }
    }
}

impl PipelineConfig {
    /// 从JSON文件加载并校验
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 文件不存在时写入默认配置
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        info!("📝 配置文件不存在, 创建默认配置...");
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("bbox_conf_threshold", self.bbox_conf_threshold),
            ("keypoint_conf_threshold", self.keypoint_conf_threshold),
            ("nms_iou_threshold", self.nms_iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "model input size must be non-zero, got {}x{}",
                self.input_width, self.input_height
            )));
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前流水线配置:");
        info!("  帧源: {:?}", self.camera_sources);
        info!("  模型: {} ({}x{})", self.model_path, self.input_width, self.input_height);
        info!(
            "  置信度: bbox {:.2} / 关键点 {:.2}, NMS IOU {:.2}",
            self.bbox_conf_threshold, self.keypoint_conf_threshold, self.nms_iou_threshold
        );
        info!("  队列长度: {}", self.channel_capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("sentinel.json");

        let created = PipelineConfig::load_or_create(&path).unwrap();
        assert_eq!(created, PipelineConfig::default());
        assert!(path.exists());

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded, created);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{ "camera_sources": ["cam0"], "nms_iou_threshold": 0.45 }"#).unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.camera_sources, vec!["cam0".to_string()]);
        assert_eq!(config.nms_iou_threshold, 0.45);
        assert_eq!(config.channel_capacity, 8);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PipelineConfig::load(dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            PipelineConfig::load(&broken),
            Err(ConfigError::Parse { .. })
        ));

        let invalid = dir.path().join("invalid.json");
        fs::write(&invalid, r#"{ "bbox_conf_threshold": 1.5 }"#).unwrap();
        assert!(matches!(
            PipelineConfig::load(&invalid),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_capacity() {
        let config = PipelineConfig {
            channel_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(PipelineConfig::default().validate().is_ok());
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use thiserror::Error;

/// 流水线生命周期错误
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 阶段初始化 (检测器构造) 失败, 该阶段直接进入 Stopped
    #[error("service `{name}` failed to start")]
    Startup {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to spawn worker thread for `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// 工作线程退出后通道端点已释放, 不能再次启动
    #[error("service `{name}` has already stopped and cannot be restarted")]
    NotRestartable { name: String },

    #[error("worker thread of `{name}` panicked during startup")]
    WorkerPanicked { name: String },
}

/// 配置文件错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 编排器: 按拓扑顺序 (源 → 终点) 注册服务, 统一启动, 逆序停止

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{error, info};

use super::service::{Service, ServiceState};
use super::source::{FrameSource, SourceService};
use super::stage::{FrameProcessor, Stage};
use super::stats::StatsSnapshot;
use crate::error::PipelineError;
use crate::frame::Frame;

#[derive(Default)]
pub struct Pipeline {
    services: Vec<Box<dyn Service>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// 服务需按 源 → 终点 的顺序添加
    pub fn add<S: Service + 'static>(&mut self, service: S) -> &mut Self {
        self.services.push(Box::new(service));
        self
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// 按添加顺序启动。任一服务启动失败时, 已启动的服务被逆序停止, 并返回该错误。
    pub fn start_all(&mut self) -> Result<(), PipelineError> {
        info!("🚀 启动流水线 ({} 个服务)", self.services.len());
        for i in 0..self.services.len() {
            if let Err(e) = self.services[i].start() {
                error!("❌ 服务 `{}` 启动失败, 回滚已启动的服务", self.services[i].name());
                for service in self.services[..i].iter_mut().rev() {
                    service.stop();
                }
                return Err(e);
            }
        }
        info!("✅ 流水线已启动");
        Ok(())
    }

    /// 按添加顺序的逆序停止, 每个服务完全退出后才停止下一个
    pub fn stop_all(&mut self) {
        let running = self
            .services
            .iter()
            .any(|s| matches!(s.state(), ServiceState::Running | ServiceState::Stopping));
        if running {
            info!("🛑 停止流水线...");
        }
        // 已自行退出的服务也要 stop 一次以回收线程
        for service in self.services.iter_mut().rev() {
            service.stop();
        }
        if running {
            info!("✅ 流水线已停止");
        }
    }

    pub fn states(&self) -> Vec<(String, ServiceState)> {
        self.services
            .iter()
            .map(|s| (s.name().to_string(), s.state()))
            .collect()
    }

    pub fn stats(&self) -> Vec<StatsSnapshot> {
        self.services.iter().map(|s| s.stats()).collect()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop_all();
    }
}

type ServiceFactory = Box<dyn FnOnce(Receiver<Frame>, Sender<Frame>) -> Box<dyn Service>>;
type SourceFactory = Box<dyn FnOnce(Sender<Frame>) -> Box<dyn Service>>;

/// 线性链路构建器: 帧源 → 阶段1 → 阶段2 → ... → 输出
///
/// 每两个相邻服务之间是一个容量为 `capacity` 的有界通道。
pub struct PipelineBuilder {
    capacity: usize,
    sources: Vec<SourceFactory>,
    stages: Vec<ServiceFactory>,
}

/// 构建结果: 流水线本体 + 链路两端
pub struct PipelineChain {
    pub pipeline: Pipeline,
    /// 链路头部的发送端 (帧源之外额外注入帧; 不需要时直接丢弃)
    pub input: Sender<Frame>,
    /// 链路尾部的接收端
    pub output: Receiver<Frame>,
}

impl PipelineBuilder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sources: Vec::new(),
            stages: Vec::new(),
        }
    }

    pub fn source<S, F>(mut self, name: impl Into<String>, source_id: usize, factory: F) -> Self
    where
        S: FrameSource + 'static,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let name = name.into();
        self.sources
            .push(Box::new(move |tx: Sender<Frame>| -> Box<dyn Service> {
                Box::new(SourceService::new(name, source_id, tx, factory))
            }));
        self
    }

    /// 添加已配置好的帧源服务 (帧间隔、关键点阈值等)
    pub fn source_with<F>(mut self, build: F) -> Self
    where
        F: FnOnce(Sender<Frame>) -> Box<dyn Service> + 'static,
    {
        self.sources.push(Box::new(build));
        self
    }

    pub fn stage<P, F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        P: FrameProcessor + 'static,
        F: FnOnce() -> Result<P> + Send + 'static,
    {
        let name = name.into();
        self.stages.push(Box::new(
            move |rx: Receiver<Frame>, tx: Sender<Frame>| -> Box<dyn Service> {
                Box::new(Stage::new(name, rx, vec![tx], factory))
            },
        ));
        self
    }

    pub fn build(self) -> PipelineChain {
        let mut pipeline = Pipeline::new();
        let (input, mut rx) = bounded(self.capacity);

        for build in self.sources {
            pipeline.services.push(build(input.clone()));
        }
        for build in self.stages {
            let (tx, next_rx) = bounded(self.capacity);
            pipeline.services.push(build(rx, tx));
            rx = next_rx;
        }

        PipelineChain {
            pipeline,
            input,
            output: rx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stats::ServiceStats;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<(&'static str, String)>>>;

    /// 记录 start/stop 调用顺序的服务
    struct Recorder {
        name: String,
        state: ServiceState,
        fail_start: bool,
        log: Log,
    }

    impl Recorder {
        fn new(name: &str, fail_start: bool, log: &Log) -> Self {
            Self {
                name: name.to_string(),
                state: ServiceState::Created,
                fail_start,
                log: Arc::clone(log),
            }
        }
    }

    impl Service for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn state(&self) -> ServiceState {
            self.state
        }

        fn start(&mut self) -> Result<(), PipelineError> {
            self.log.lock().unwrap().push(("start", self.name.clone()));
            if self.fail_start {
                self.state = ServiceState::Stopped;
                return Err(PipelineError::Startup {
                    name: self.name.clone(),
                    source: anyhow::anyhow!("boom"),
                });
            }
            self.state = ServiceState::Running;
            Ok(())
        }

        fn request_stop(&mut self) {
            if self.state == ServiceState::Running {
                self.state = ServiceState::Stopping;
            }
        }

        fn stop(&mut self) {
            if matches!(self.state, ServiceState::Running | ServiceState::Stopping) {
                self.log.lock().unwrap().push(("stop", self.name.clone()));
                self.state = ServiceState::Stopped;
            }
        }

        fn stats(&self) -> StatsSnapshot {
            ServiceStats::default().snapshot(&self.name)
        }
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock()
            .unwrap()
            .iter()
            .map(|(op, name)| format!("{op} {name}"))
            .collect()
    }

    #[test]
    fn test_start_forward_stop_reverse() {
        let log = Log::default();
        let mut pipeline = Pipeline::new();
        pipeline
            .add(Recorder::new("a", false, &log))
            .add(Recorder::new("b", false, &log))
            .add(Recorder::new("c", false, &log));

        pipeline.start_all().unwrap();
        pipeline.stop_all();
        // 再次停止不产生调用
        pipeline.stop_all();

        assert_eq!(
            entries(&log),
            [
                "start a", "start b", "start c", "stop c", "stop b", "stop a"
            ]
        );
        assert!(pipeline
            .states()
            .iter()
            .all(|(_, s)| *s == ServiceState::Stopped));
    }

    #[test]
    fn test_failed_start_rolls_back_in_reverse() {
        let log = Log::default();
        let mut pipeline = Pipeline::new();
        pipeline
            .add(Recorder::new("a", false, &log))
            .add(Recorder::new("b", false, &log))
            .add(Recorder::new("c", true, &log))
            .add(Recorder::new("d", false, &log));

        match pipeline.start_all() {
            Err(PipelineError::Startup { name, .. }) => assert_eq!(name, "c"),
            other => panic!("expected startup error, got {other:?}"),
        }
        assert_eq!(
            entries(&log),
            ["start a", "start b", "start c", "stop b", "stop a"]
        );
        let states: Vec<ServiceState> = pipeline.states().into_iter().map(|(_, s)| s).collect();
        assert_eq!(
            states,
            vec![
                ServiceState::Stopped,
                ServiceState::Stopped,
                ServiceState::Stopped,
                ServiceState::Created,
            ]
        );
    }

    #[test]
    fn test_drop_stops_running_services() {
        let log = Log::default();
        {
            let mut pipeline = Pipeline::new();
            pipeline
                .add(Recorder::new("a", false, &log))
                .add(Recorder::new("b", false, &log));
            pipeline.start_all().unwrap();
        }
        assert_eq!(entries(&log)[2..], ["stop b", "stop a"]);
    }
}

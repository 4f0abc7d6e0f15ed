// 节点入口模块
//
// 宿主（节点编辑器）调用的入口，每个节点一个文件：
// - load_audio: 本地/URL 音频路径加载，URL 波形加载
// - uvr5: 人声/伴奏分离
// - preview: 结果预览

pub mod load_audio;
pub mod preview;
pub mod uvr5;

use crate::audio::separator::{BackendFactory, WorkerFactory};
use crate::audio::source::ManagedDirs;
use crate::config::AppConfig;
use crate::device::DeviceConfig;
use crate::error::AppResult;
use crate::media::ffmpeg::{Ffmpeg, MediaToolkit};
use crate::models::{HfHub, ModelHub};
use std::path::{Path, PathBuf};

/// 节点执行所需的全部依赖
pub struct NodeContext {
    pub dirs: ManagedDirs,
    pub weights_dir: PathBuf,
    pub repo_id: String,
    pub device: DeviceConfig,
    pub fallback_to_silence: bool,
    pub hub: Box<dyn ModelHub>,
    pub toolkit: Box<dyn MediaToolkit>,
    pub factory: Box<dyn BackendFactory>,
}

impl NodeContext {
    /// 由配置构建，相对路径以数据目录为基准；会创建所需目录
    pub fn from_config(config: &AppConfig, data_dir: &Path) -> AppResult<Self> {
        let paths = config.paths.resolve(data_dir);
        paths.ensure_all()?;

        Ok(Self {
            dirs: ManagedDirs {
                input_dir: paths.input_dir,
                output_dir: paths.output_dir,
                temp_dir: paths.temp_dir,
            },
            weights_dir: paths.weights_dir,
            repo_id: config.hub.repo_id.clone(),
            device: DeviceConfig::from_settings(&config.device),
            fallback_to_silence: config.url_loader.fallback_to_silence,
            hub: Box::new(HfHub::new(&config.hub.endpoint, &config.hub.revision)),
            toolkit: Box::new(Ffmpeg::new()),
            factory: Box::new(WorkerFactory::new(
                config.separation.worker_command.clone(),
                config.separation.worker_args.clone(),
            )),
        })
    }
}

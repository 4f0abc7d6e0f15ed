// 人声分离模块 - 调用 UVR5 预训练模型
//
// 模型推理本身在 worker 进程中完成（见 worker.rs），这里负责：
// 按模型名拉取权重、选择推理封装、调用分离、结束后尽力释放资源。

use crate::audio::worker::{UvrWorker, WorkerRequest};
use crate::device::DeviceConfig;
use crate::error::{AppError, AppResult};
use crate::models::{self, ModelFamily, ModelHub};
use crate::utils::{OutputFormat, SeparationResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 激进程度上限
pub const MAX_AGGRESSIVENESS: u8 = 20;

/// onnx 去混响模型的分块参数
const MDX_DEREVERB_CHUNKS: u32 = 15;

/// 分离请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeparationRequest {
    pub model_name: String,
    /// 仅对 VR 模型有意义
    pub aggressiveness: u8,
    pub output_format: OutputFormat,
}

impl SeparationRequest {
    pub fn new(model_name: &str, aggressiveness: i64, output_format: OutputFormat) -> AppResult<Self> {
        if !models::is_known_model(model_name) {
            return Err(AppError::InvalidInput(format!("未知模型: {}", model_name)));
        }
        if !(0..=MAX_AGGRESSIVENESS as i64).contains(&aggressiveness) {
            return Err(AppError::InvalidInput(format!(
                "激进程度需在 0-{} 之间: {}",
                MAX_AGGRESSIVENESS, aggressiveness
            )));
        }
        Ok(Self {
            model_name: model_name.to_string(),
            aggressiveness: aggressiveness as u8,
            output_format,
        })
    }

    pub fn family(&self) -> ModelFamily {
        ModelFamily::from_name(&self.model_name)
    }

    pub fn is_hp3(&self) -> bool {
        models::is_hp3(&self.model_name)
    }
}

/// 推理封装的统一接口
pub trait SeparationBackend {
    fn name(&self) -> &'static str;

    /// 分离音频，返回 (人声, 伴奏) 文件路径
    fn separate(
        &mut self,
        input: &Path,
        ins_dir: &Path,
        vocal_dir: &Path,
        format: OutputFormat,
        is_hp3: bool,
    ) -> AppResult<SeparationResult>;

    /// 释放已加载的模型权重
    fn release(&mut self) -> AppResult<()>;

    /// 释放加速卡缓存
    fn empty_cache(&mut self) -> AppResult<()> {
        Ok(())
    }
}

/// 创建推理封装所需的参数
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSpec {
    pub family: ModelFamily,
    pub weight_path: PathBuf,
    pub aggressiveness: u8,
    pub device: DeviceConfig,
}

/// 按模型家族创建推理封装
pub trait BackendFactory {
    fn create(&self, spec: &BackendSpec) -> AppResult<Box<dyn SeparationBackend>>;
}

/// worker 进程工厂
#[derive(Debug, Clone)]
pub struct WorkerFactory {
    program: String,
    base_args: Vec<String>,
}

impl WorkerFactory {
    pub fn new(program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
        }
    }

    /// worker 命令行参数
    pub fn worker_args(&self, arch: WorkerArch, spec: &BackendSpec) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend([
            "--arch".to_string(),
            arch.as_str().to_string(),
            "--model".to_string(),
            spec.weight_path.to_string_lossy().to_string(),
            "--device".to_string(),
            spec.device.device.as_str().to_string(),
        ]);
        if spec.device.half_precision {
            args.push("--half".to_string());
        }
        match arch {
            WorkerArch::Vr | WorkerArch::VrDeEcho => {
                args.extend(["--agg".to_string(), spec.aggressiveness.to_string()]);
            }
            WorkerArch::MdxDereverb => {
                args.extend(["--chunks".to_string(), MDX_DEREVERB_CHUNKS.to_string()]);
            }
        }
        args
    }
}

impl BackendFactory for WorkerFactory {
    fn create(&self, spec: &BackendSpec) -> AppResult<Box<dyn SeparationBackend>> {
        let arch = WorkerArch::for_family(spec.family);
        let worker = UvrWorker::spawn(&self.program, &self.worker_args(arch, spec))?;
        Ok(Box::new(WorkerBackend { arch, worker }))
    }
}

/// worker 端的推理封装
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerArch {
    /// VR 标准人声分离
    Vr,
    /// VR 去回声
    VrDeEcho,
    /// MDX-Net onnx 去混响，不使用激进程度
    MdxDereverb,
}

impl WorkerArch {
    pub fn for_family(family: ModelFamily) -> Self {
        match family {
            ModelFamily::Standard => WorkerArch::Vr,
            ModelFamily::DeEcho => WorkerArch::VrDeEcho,
            ModelFamily::OnnxDereverb => WorkerArch::MdxDereverb,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerArch::Vr => "vr",
            WorkerArch::VrDeEcho => "vr-deecho",
            WorkerArch::MdxDereverb => "mdx-dereverb",
        }
    }
}

/// 由 worker 进程承载的推理封装
pub struct WorkerBackend {
    arch: WorkerArch,
    worker: UvrWorker,
}

impl SeparationBackend for WorkerBackend {
    fn name(&self) -> &'static str {
        self.arch.as_str()
    }

    fn separate(
        &mut self,
        input: &Path,
        ins_dir: &Path,
        vocal_dir: &Path,
        format: OutputFormat,
        is_hp3: bool,
    ) -> AppResult<SeparationResult> {
        let response = self.worker.request(&WorkerRequest::Separate {
            input,
            ins_dir,
            vocal_dir,
            format,
            is_hp3,
        })?;
        match (response.vocal, response.instrument) {
            (Some(vocal_path), Some(accompaniment_path)) => Ok(SeparationResult {
                vocal_path,
                accompaniment_path,
            }),
            _ => Err(AppError::InferenceFailed("worker 应答缺少输出路径".to_string())),
        }
    }

    fn release(&mut self) -> AppResult<()> {
        self.worker.request(&WorkerRequest::Release).map(|_| ())
    }

    fn empty_cache(&mut self) -> AppResult<()> {
        self.worker.request(&WorkerRequest::EmptyCache).map(|_| ())
    }
}

/// 分离调用器
pub struct SeparationInvoker<'a> {
    weights_dir: PathBuf,
    repo_id: String,
    hub: &'a dyn ModelHub,
    factory: &'a dyn BackendFactory,
    device: DeviceConfig,
}

impl<'a> SeparationInvoker<'a> {
    pub fn new(
        weights_dir: impl Into<PathBuf>,
        repo_id: impl Into<String>,
        hub: &'a dyn ModelHub,
        factory: &'a dyn BackendFactory,
        device: DeviceConfig,
    ) -> Self {
        Self {
            weights_dir: weights_dir.into(),
            repo_id: repo_id.into(),
            hub,
            factory,
            device,
        }
    }

    /// 对已规整的音频执行分离
    pub fn run(
        &self,
        request: &SeparationRequest,
        input: &Path,
        vocal_dir: &Path,
        ins_dir: &Path,
    ) -> AppResult<SeparationResult> {
        info!("=== 开始人声分离 ===");
        info!("[SEPARATOR] 音频: {}, 模型: {}", input.display(), request.model_name);

        let weight_path = models::ensure_weights(
            &request.model_name,
            &self.weights_dir,
            self.hub,
            &self.repo_id,
        )?;

        let spec = BackendSpec {
            family: request.family(),
            weight_path,
            aggressiveness: request.aggressiveness,
            device: self.device,
        };

        fs::create_dir_all(vocal_dir)?;
        fs::create_dir_all(ins_dir)?;

        let mut backend = self.factory.create(&spec)?;
        info!(
            "[SEPARATOR] 推理封装: {}, 设备: {}, is_hp3: {}",
            backend.name(),
            self.device.device.as_str(),
            request.is_hp3()
        );

        let result = backend.separate(
            input,
            ins_dir,
            vocal_dir,
            request.output_format,
            request.is_hp3(),
        );

        self.cleanup(backend.as_mut());

        let result = result?;
        info!(
            "[SEPARATOR] {}->Success: 人声={}, 伴奏={}",
            input.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            result.vocal_path.display(),
            result.accompaniment_path.display()
        );
        Ok(result)
    }

    /// 尽力释放模型与显卡缓存；此时分离结果已经落盘，释放失败只记录不上抛
    fn cleanup(&self, backend: &mut dyn SeparationBackend) {
        if let Err(e) = backend.release() {
            debug!("[SEPARATOR] 释放模型失败（忽略）: {}", e);
        }
        if self.device.device.is_accelerator() {
            debug!("[SEPARATOR] clean_empty_cache");
            if let Err(e) = backend.empty_cache() {
                debug!("[SEPARATOR] 释放显卡缓存失败（忽略）: {}", e);
            }
        }
    }
}

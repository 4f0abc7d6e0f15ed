// 配置管理模块

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use crate::error::{AppError, AppResult};
use crate::models::DEFAULT_MODEL;
use crate::utils::OutputFormat;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::info;

static CONFIG: OnceCell<RwLock<AppConfig>> = OnceCell::new();
static CONFIG_PATH: OnceCell<PathBuf> = OnceCell::new();

/// 加速模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AccelerationMode {
    /// 仅使用 CPU
    Cpu,
    /// 使用 CUDA
    Cuda,
    /// 启动时检测，有 NVIDIA GPU 则用 CUDA
    Auto,
}

impl Default for AccelerationMode {
    fn default() -> Self {
        Self::Auto
    }
}

/// 日志级别
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    /// 转换为 tracing 过滤器字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// 宿主管理的目录
///
/// 相对路径以数据目录为基准解析。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// 输入目录（下载、重采样后的音频都写在这里）
    pub input_dir: PathBuf,
    /// 输出目录（分离结果）
    pub output_dir: PathBuf,
    /// 临时目录
    pub temp_dir: PathBuf,
    /// 模型权重根目录
    pub weights_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            temp_dir: PathBuf::from("temp"),
            weights_dir: PathBuf::from("uvr5"),
        }
    }
}

impl PathsConfig {
    /// 以数据目录为基准得到绝对路径
    pub fn resolve(&self, data_dir: &Path) -> PathsConfig {
        PathsConfig {
            input_dir: data_dir.join(&self.input_dir),
            output_dir: data_dir.join(&self.output_dir),
            temp_dir: data_dir.join(&self.temp_dir),
            weights_dir: data_dir.join(&self.weights_dir),
        }
    }

    /// 创建全部目录
    pub fn ensure_all(&self) -> AppResult<()> {
        for dir in [&self.input_dir, &self.output_dir, &self.temp_dir, &self.weights_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// 模型仓库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub endpoint: String,
    pub repo_id: String,
    pub revision: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://huggingface.co".to_string(),
            repo_id: "lj1995/VoiceConversionWebUI".to_string(),
            revision: "main".to_string(),
        }
    }
}

/// 推理设备配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub acceleration: AccelerationMode,
    /// 半精度推理，仅在 CUDA 上生效
    pub half_precision: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            acceleration: AccelerationMode::Auto,
            half_precision: true,
        }
    }
}

/// 人声分离配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    pub default_model: String,
    pub aggressiveness: u8,
    pub output_format: OutputFormat,
    /// 推理 worker 可执行程序
    pub worker_command: String,
    /// 放在 worker 参数最前面，如 ["-m", "uvr5_worker"]
    pub worker_args: Vec<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_worker_command() -> String {
    "uvr5-worker".to_string()
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            aggressiveness: 10,
            output_format: OutputFormat::Wav,
            worker_command: default_worker_command(),
            worker_args: Vec::new(),
        }
    }
}

/// URL 音频加载配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlLoaderConfig {
    /// 加载失败时返回静音而不是报错（旧行为，会掩盖真实错误）
    #[serde(default)]
    pub fallback_to_silence: bool,
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub separation: SeparationConfig,
    #[serde(default)]
    pub url_loader: UrlLoaderConfig,
    /// 日志级别
    #[serde(default)]
    pub log_level: LogLevel,
}

/// 从文件读取配置，不存在则写入默认配置
pub fn load_config_file(config_path: &Path) -> AppResult<AppConfig> {
    if config_path.exists() {
        let content = fs::read_to_string(config_path)?;
        Ok(serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("配置文件 JSON 解析失败: {}，使用默认配置", e);
            AppConfig::default()
        }))
    } else {
        let config = AppConfig::default();
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&config)?;
        fs::write(config_path, content)?;
        Ok(config)
    }
}

/// 初始化配置
pub fn init_config(config_path: &Path) -> AppResult<()> {
    CONFIG_PATH.set(config_path.to_path_buf())
        .map_err(|_| AppError::Config("配置路径已初始化".to_string()))?;

    let config = load_config_file(config_path)?;

    info!("[CONFIG] 配置已加载");

    CONFIG.set(RwLock::new(config))
        .map_err(|_| AppError::Config("配置已初始化".to_string()))?;

    Ok(())
}

/// 获取配置
pub fn get_config() -> AppConfig {
    CONFIG.get()
        .map(|c| c.read().clone())
        .unwrap_or_default()
}

/// 更新配置
pub fn update_config(config: AppConfig) -> AppResult<()> {
    info!("[CONFIG] 配置更新");

    // 先写入文件，成功后再更新内存
    if let Some(path) = CONFIG_PATH.get() {
        let content = serde_json::to_string_pretty(&config)?;
        fs::write(path, content)?;
    }

    if let Some(lock) = CONFIG.get() {
        let mut current = lock.write();
        *current = config;
    }

    Ok(())
}

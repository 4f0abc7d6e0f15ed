// 推理设备模块
//
// 设备与精度只在启动时计算一次，之后作为显式参数传给分离器。

use crate::config::{AccelerationMode, DeviceSettings};
use crate::utils::hidden_command;
use serde::{Deserialize, Serialize};
use tracing::info;

/// 推理设备
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }

    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Cuda)
    }
}

/// 分离器使用的设备配置
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    pub device: Device,
    pub half_precision: bool,
}

impl DeviceConfig {
    pub fn cpu() -> Self {
        Self {
            device: Device::Cpu,
            half_precision: false,
        }
    }

    /// 由配置得出设备；auto 模式下探测 NVIDIA GPU
    pub fn from_settings(settings: &DeviceSettings) -> Self {
        let device = match settings.acceleration {
            AccelerationMode::Cpu => Device::Cpu,
            AccelerationMode::Cuda => Device::Cuda,
            AccelerationMode::Auto => {
                if detect_nvidia_gpu().is_some() {
                    Device::Cuda
                } else {
                    Device::Cpu
                }
            }
        };
        let config = Self::new(device, settings.half_precision);
        info!(
            "[DEVICE] 推理设备: {}, 半精度: {}",
            config.device.as_str(),
            config.half_precision
        );
        config
    }

    /// CPU 上不支持半精度
    pub fn new(device: Device, half_precision: bool) -> Self {
        Self {
            device,
            half_precision: half_precision && device.is_accelerator(),
        }
    }
}

/// 通过 nvidia-smi 探测 GPU，返回显卡名称
pub fn detect_nvidia_gpu() -> Option<String> {
    let output = hidden_command("nvidia-smi")
        .args(["--query-gpu=name", "--format=csv,noheader"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

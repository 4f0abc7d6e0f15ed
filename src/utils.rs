// 工具模块

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::AppError;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

/// Windows 下隐藏控制台窗口的标志
#[cfg(target_os = "windows")]
pub const CREATE_NO_WINDOW: u32 = 0x08000000;

/// 宿主可识别的音频扩展名（不含点）
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "m4a"];

/// URL 文件名缺失或扩展名不认识时使用的默认扩展名
pub const DEFAULT_AUDIO_EXTENSION: &str = "mp3";

/// 创建一个隐藏控制台窗口的 Command（Windows 专用）
/// 在非 Windows 平台上等同于 Command::new
#[cfg(target_os = "windows")]
pub fn hidden_command<S: AsRef<std::ffi::OsStr>>(program: S) -> Command {
    let mut cmd = Command::new(program);
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

#[cfg(not(target_os = "windows"))]
pub fn hidden_command<S: AsRef<std::ffi::OsStr>>(program: S) -> Command {
    Command::new(program)
}

/// 生成 UUID
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 获取可执行文件所在目录
pub fn get_exe_dir() -> Option<PathBuf> {
    std::env::current_exe().ok()?.parent().map(|p| p.to_path_buf())
}

/// 解析程序路径，优先使用可执行文件旁的 ffmpeg 目录
pub fn resolve_tool_path(tool_name: &str) -> String {
    if let Some(exe_dir) = get_exe_dir() {
        let exe_name = format!("{}{}", tool_name, std::env::consts::EXE_SUFFIX);
        let tool_path = exe_dir.join("ffmpeg").join(&exe_name);
        if tool_path.exists() {
            return tool_path.to_string_lossy().to_string();
        }
        let tool_path = exe_dir.join(&exe_name);
        if tool_path.exists() {
            return tool_path.to_string_lossy().to_string();
        }
    }
    // 回退到系统 PATH
    tool_name.to_string()
}

/// 去掉从界面粘贴路径时带进来的空格、引号和换行
pub fn clean_input_path(raw: &str) -> String {
    raw.trim_matches(|c: char| c == ' ' || c == '"' || c == '\n')
        .to_string()
}

/// 扩展名是否为受支持的音频格式（大小写不敏感）
pub fn is_audio_extension(ext: &str) -> bool {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    AUDIO_EXTENSIONS.contains(&ext.as_str())
}

/// 文件路径是否带受支持的音频扩展名
pub fn has_audio_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(is_audio_extension)
        .unwrap_or(false)
}

/// 分离输出格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Wav,
    Flac,
    Mp3,
    M4a,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Flac => "flac",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::M4a => "m4a",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Wav
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wav" => Ok(OutputFormat::Wav),
            "flac" => Ok(OutputFormat::Flac),
            "mp3" => Ok(OutputFormat::Mp3),
            "m4a" => Ok(OutputFormat::M4a),
            other => Err(AppError::InvalidInput(format!("不支持的输出格式: {}", other))),
        }
    }
}

/// 音频流格式（来自 ffprobe）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioFormatInfo {
    pub channels: u32,
    pub sample_rate: u32,
}

impl AudioFormatInfo {
    /// 分离模型要求的声道数
    pub const REQUIRED_CHANNELS: u32 = 2;
    /// 分离模型要求的采样率
    pub const REQUIRED_SAMPLE_RATE: u32 = 44100;

    pub fn is_separation_ready(&self) -> bool {
        self.channels == Self::REQUIRED_CHANNELS && self.sample_rate == Self::REQUIRED_SAMPLE_RATE
    }
}

/// 分离结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeparationResult {
    pub vocal_path: PathBuf,
    pub accompaniment_path: PathBuf,
}

/// 界面播放用的预览信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviewInfo {
    pub filename: String,
    pub subfolder: String,
}

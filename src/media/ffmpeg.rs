// FFmpeg 封装模块
//
// 只用到两件事：ffprobe 读取第一个流的声道数/采样率，ffmpeg 转成 16bit 双声道 44.1kHz PCM。

use crate::error::{AppError, AppResult};
use crate::utils::{hidden_command, resolve_tool_path, AudioFormatInfo};
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tracing::{debug, error, info};

/// 探测与转码接口
pub trait MediaToolkit {
    /// 读取音频流格式
    fn probe(&self, path: &Path) -> AppResult<AudioFormatInfo>;

    /// 转码为 pcm_s16le / 2 声道 / 44100Hz，覆盖已有的输出文件
    fn transcode(&self, input: &Path, output: &Path) -> AppResult<()>;
}

/// 调用系统 ffprobe / ffmpeg
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self {
            ffmpeg_path: resolve_tool_path("ffmpeg"),
            ffprobe_path: resolve_tool_path("ffprobe"),
        }
    }
}

impl Ffmpeg {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MediaToolkit for Ffmpeg {
    fn probe(&self, path: &Path) -> AppResult<AudioFormatInfo> {
        let output = hidden_command(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
            .arg(path)
            .output()
            .map_err(|e| AppError::ProbeFailed(format!("ffprobe 执行失败: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::ProbeFailed(format!(
                "ffprobe 错误 ({}): {}",
                path.display(),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let info = parse_probe_output(&stdout)?;
        debug!(
            "[FFMPEG] 探测 {}: channels={}, sample_rate={}",
            path.display(),
            info.channels,
            info.sample_rate
        );
        Ok(info)
    }

    fn transcode(&self, input: &Path, output: &Path) -> AppResult<()> {
        info!("[FFMPEG] 转码: {} -> {}", input.display(), output.display());

        let result = hidden_command(&self.ffmpeg_path)
            .args(transcode_args(input, output))
            .stdout(Stdio::null())
            .output()
            .map_err(|e| AppError::TranscodeFailed(format!("ffmpeg 启动失败: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(5)..].join("\n");
            error!("[FFMPEG] 转码失败，退出码: {:?}", result.status.code());
            return Err(AppError::TranscodeFailed(format!(
                "ffmpeg 处理 {} 失败: {}",
                input.display(),
                tail
            )));
        }

        Ok(())
    }
}

/// 转码参数：去掉视频流，16bit PCM，双声道 44.1kHz，覆盖输出
pub fn transcode_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-i".into(), input.into()];
    args.extend(
        ["-vn", "-acodec", "pcm_s16le", "-ac", "2", "-ar", "44100"]
            .iter()
            .map(OsString::from),
    );
    args.push(output.into());
    args.push("-y".into());
    args
}

/// 解析 ffprobe JSON，只取第一个流
///
/// ffprobe 的 sample_rate 是字符串，channels 是整数。
pub fn parse_probe_output(stdout: &str) -> AppResult<AudioFormatInfo> {
    let json: serde_json::Value = serde_json::from_str(stdout)
        .map_err(|e| AppError::ProbeFailed(format!("解析 ffprobe 输出失败: {}", e)))?;

    let stream = json["streams"]
        .as_array()
        .and_then(|s| s.first())
        .ok_or_else(|| AppError::ProbeFailed("文件中没有任何流".to_string()))?;

    let channels = stream["channels"]
        .as_u64()
        .ok_or_else(|| AppError::ProbeFailed("第一个流没有声道信息".to_string()))? as u32;

    let sample_rate = match &stream["sample_rate"] {
        serde_json::Value::String(s) => s.parse::<u32>().ok(),
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as u32),
        _ => None,
    }
    .ok_or_else(|| AppError::ProbeFailed("第一个流没有采样率信息".to_string()))?;

    Ok(AudioFormatInfo { channels, sample_rate })
}

// 错误处理模块

use thiserror::Error;
use serde::Serialize;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("未找到: {0}")]
    NotFound(String),

    #[error("下载失败 ({url}): {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("音频探测失败: {0}")]
    ProbeFailed(String),

    #[error("音频转码失败: {0}")]
    TranscodeFailed(String),

    #[error("模型获取失败: {0}")]
    ModelFetchFailed(String),

    #[error("人声分离推理失败: {0}")]
    InferenceFailed(String),

    #[error("音频解码失败: {0}")]
    Decode(String),

    #[error("配置错误: {0}")]
    Config(String),
}

impl AppError {
    /// 构造下载错误
    pub fn download(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        AppError::DownloadFailed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

// 实现 Serialize 以便把错误直接交给宿主/命令行输出
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_as_message() {
        let err = AppError::NotFound("a.wav".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"未找到: a.wav\"");
    }

    #[test]
    fn test_download_error_keeps_url() {
        let err = AppError::download("https://example.com/a.mp3", "HTTP 404");
        assert!(err.to_string().contains("https://example.com/a.mp3"));
        assert!(err.to_string().contains("HTTP 404"));
    }
}

// 预览信息：界面播放只需要文件名和所在目录名

use crate::error::{AppError, AppResult};
use crate::utils::PreviewInfo;
use std::path::Path;

pub fn preview_info(path: &Path) -> AppResult<PreviewInfo> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| AppError::InvalidInput(format!("路径没有文件名: {}", path.display())))?;

    let subfolder = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(PreviewInfo { filename, subfolder })
}

impl PreviewInfo {
    /// 宿主界面约定的结构
    pub fn to_ui_json(&self) -> serde_json::Value {
        serde_json::json!({ "ui": { "audio": [self.filename, self.subfolder] } })
    }
}

// 预览节点

use crate::audio::fingerprint::{self, Fingerprint};
use crate::audio::preview;
use crate::error::AppResult;
use crate::nodes::NodeContext;
use crate::utils::{clean_input_path, PreviewInfo};
use std::path::Path;

/// 返回界面播放需要的文件名和目录名
pub fn preview_audio(audio: &str) -> AppResult<PreviewInfo> {
    preview::preview_info(Path::new(&clean_input_path(audio)))
}

/// 预览节点的变更指纹：按宿主注释解析路径后取内容哈希
pub fn preview_audio_changed(ctx: &NodeContext, audio: &str) -> AppResult<Fingerprint> {
    fingerprint::hash_file(&ctx.dirs.annotated_path(audio)?)
}

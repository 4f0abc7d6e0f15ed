// 音频格式规整模块
//
// 分离模型只接受双声道 44.1kHz。格式已满足时原样返回路径，否则转码到
// <输入目录>/<原文件名>.reformatted.wav。
//
// 输出路径只由原文件名决定，同名输入并发规整会互相覆盖（后写者生效），
// 调用方需要按文件名串行。

use crate::error::AppResult;
use crate::media::ffmpeg::MediaToolkit;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 规整后文件的后缀
pub const REFORMATTED_SUFFIX: &str = ".reformatted.wav";

pub struct AudioNormalizer<'a> {
    toolkit: &'a dyn MediaToolkit,
    input_dir: PathBuf,
}

impl<'a> AudioNormalizer<'a> {
    pub fn new(toolkit: &'a dyn MediaToolkit, input_dir: impl Into<PathBuf>) -> Self {
        Self {
            toolkit,
            input_dir: input_dir.into(),
        }
    }

    /// 规整后的固定路径
    pub fn reformatted_path(&self, input: &Path) -> PathBuf {
        let basename = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.input_dir.join(format!("{}{}", basename, REFORMATTED_SUFFIX))
    }

    /// 返回一个保证为双声道 44.1kHz 的音频路径
    pub fn normalize(&self, input: &Path) -> AppResult<PathBuf> {
        let info = self.toolkit.probe(input)?;

        if info.is_separation_ready() {
            debug!("[NORMALIZE] 格式已满足，跳过转码: {}", input.display());
            return Ok(input.to_path_buf());
        }

        let target = self.reformatted_path(input);
        info!(
            "[NORMALIZE] {} 为 {}ch/{}Hz，转码到 {}",
            input.display(),
            info.channels,
            info.sample_rate,
            target.display()
        );
        self.toolkit.transcode(input, &target)?;
        Ok(target)
    }
}

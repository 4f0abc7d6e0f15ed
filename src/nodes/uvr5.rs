// UVR5 分离节点
//
// 规整输入格式后调用分离器，人声和伴奏都写到输出目录。

use crate::audio::normalizer::AudioNormalizer;
use crate::audio::separator::{SeparationInvoker, SeparationRequest};
use crate::error::{AppError, AppResult};
use crate::nodes::NodeContext;
use crate::utils::{clean_input_path, OutputFormat, SeparationResult};
use std::path::PathBuf;
use tracing::error;

pub fn split(
    ctx: &NodeContext,
    audio: &str,
    model: &str,
    agg: i64,
    format: OutputFormat,
) -> AppResult<SeparationResult> {
    let request = SeparationRequest::new(model, agg, format)?;

    let input = PathBuf::from(clean_input_path(audio));
    if !input.is_file() {
        error!("[NODE] 音频文件不存在: {}", input.display());
        return Err(AppError::NotFound(format!("音频文件不存在: {}", input.display())));
    }

    let normalizer = AudioNormalizer::new(ctx.toolkit.as_ref(), &ctx.dirs.input_dir);
    let normalized = normalizer.normalize(&input)?;

    let invoker = SeparationInvoker::new(
        &ctx.weights_dir,
        ctx.repo_id.clone(),
        ctx.hub.as_ref(),
        ctx.factory.as_ref(),
        ctx.device,
    );
    let output_dir = &ctx.dirs.output_dir;
    invoker.run(&request, &normalized, output_dir, output_dir)
}

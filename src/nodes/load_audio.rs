// 音频加载节点

use crate::audio::fingerprint::{self, Fingerprint};
use crate::audio::loader::{UrlAudioLoader, Waveform};
use crate::audio::source::{list_audio_files, AudioReference, AudioSource, ResolvedAudio, SourceType};
use crate::error::AppResult;
use crate::nodes::NodeContext;
use tracing::info;

/// 加载音频路径（本地文件或 URL 下载）
pub fn load_audio_path(ctx: &NodeContext, source_type: SourceType, audio: &str) -> AppResult<ResolvedAudio> {
    let reference = AudioReference::new(source_type, audio);
    let resolved = AudioSource::new(ctx.dirs.clone()).resolve(&reference)?;
    info!("[NODE] 音频已加载: {}", resolved.path.display());
    Ok(resolved)
}

/// 加载节点的变更指纹：本地文件取内容哈希，URL 取 URL 本身，不触发下载
pub fn load_audio_path_changed(ctx: &NodeContext, source_type: SourceType, audio: &str) -> AppResult<Fingerprint> {
    let reference = AudioReference::new(source_type, audio);
    fingerprint::fingerprint_reference(&reference, &ctx.dirs)
}

/// 输入目录中可选的音频文件
pub fn input_choices(ctx: &NodeContext) -> AppResult<Vec<String>> {
    list_audio_files(&ctx.dirs.input_dir)
}

/// 从 URL 加载并解码为波形
pub fn load_audio_url(ctx: &NodeContext, url: &str) -> AppResult<Waveform> {
    UrlAudioLoader::new(&ctx.dirs.temp_dir, ctx.fallback_to_silence).load(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::normalizer::tests::FakeToolkit;
    use crate::audio::source::tests::serve_once;
    use crate::error::AppError;
    use crate::nodes::tests::test_context;
    use std::fs;

    #[test]
    fn test_load_local_and_fingerprint() {
        let root = tempfile::tempdir().unwrap();
        let ctx = test_context(root.path(), FakeToolkit::default());
        fs::write(ctx.dirs.input_dir.join("a.wav"), b"abc").unwrap();

        let resolved = load_audio_path(&ctx, SourceType::File, "a.wav").unwrap();
        assert_eq!(resolved.path, ctx.dirs.input_dir.join("a.wav"));

        let fp = load_audio_path_changed(&ctx, SourceType::File, "a.wav").unwrap();
        assert_eq!(
            fp.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_load_missing_local_file() {
        let root = tempfile::tempdir().unwrap();
        let ctx = test_context(root.path(), FakeToolkit::default());
        assert!(matches!(
            load_audio_path(&ctx, SourceType::File, "gone.wav"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_url_downloads_into_input_dir() {
        let root = tempfile::tempdir().unwrap();
        let ctx = test_context(root.path(), FakeToolkit::default());
        let url = format!("{}/music/audio.mp3", serve_once(200, b"ID3data".to_vec()));

        let resolved = load_audio_path(&ctx, SourceType::Url, &url).unwrap();
        assert_eq!(resolved.path, ctx.dirs.input_dir.join("audio.mp3"));
        assert_eq!(fs::read(&resolved.path).unwrap(), b"ID3data");

        // URL 的指纹就是 URL 本身，不需要再次下载
        let fp = load_audio_path_changed(&ctx, SourceType::Url, &url).unwrap();
        assert_eq!(fp.as_str(), url);
    }

    #[test]
    fn test_input_choices_lists_audio_only() {
        let root = tempfile::tempdir().unwrap();
        let ctx = test_context(root.path(), FakeToolkit::default());
        fs::write(ctx.dirs.input_dir.join("b.flac"), b"").unwrap();
        fs::write(ctx.dirs.input_dir.join("a.wav"), b"").unwrap();
        fs::write(ctx.dirs.input_dir.join("notes.txt"), b"").unwrap();
        assert_eq!(input_choices(&ctx).unwrap(), vec!["a.wav", "b.flac"]);
    }

    #[test]
    fn test_load_url_waveform_failure_is_strict_by_default() {
        let root = tempfile::tempdir().unwrap();
        let ctx = test_context(root.path(), FakeToolkit::default());
        let url = format!("{}/x.wav", serve_once(404, Vec::new()));
        assert!(load_audio_url(&ctx, &url).is_err());
    }
}

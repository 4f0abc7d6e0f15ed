// URL 音频加载（直接解码为波形）
//
// 与 source.rs 的下载不同，这里下载到临时文件、解码后即删除。
// 旧行为在失败时返回一段静音而不是报错，会把真实错误藏起来，
// 因此只在配置 url_loader.fallback_to_silence 打开时启用。

use crate::audio::source::parse_remote_url;
use crate::error::{AppError, AppResult};
use crate::utils::DEFAULT_AUDIO_EXTENSION;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// 可直接解码的扩展名
const LOADER_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a"];

/// 静音占位的采样率
const SILENCE_SAMPLE_RATE: u32 = 44100;

/// 解码后的波形，按声道存放
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Waveform {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl Waveform {
    /// 双声道、单个采样点的静音
    pub fn silence() -> Self {
        Self {
            channels: vec![vec![0.0], vec![0.0]],
            sample_rate: SILENCE_SAMPLE_RATE,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }
}

pub struct UrlAudioLoader {
    agent: ureq::Agent,
    temp_dir: PathBuf,
    fallback_to_silence: bool,
}

impl UrlAudioLoader {
    pub fn new(temp_dir: impl Into<PathBuf>, fallback_to_silence: bool) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .build();
        Self {
            agent,
            temp_dir: temp_dir.into(),
            fallback_to_silence,
        }
    }

    pub fn load(&self, url: &str) -> AppResult<Waveform> {
        match self.try_load(url) {
            Ok(waveform) => Ok(waveform),
            Err(e) if self.fallback_to_silence => {
                warn!("[LOADER] 从 URL 加载音频失败，返回静音: {}", e);
                Ok(Waveform::silence())
            }
            Err(e) => Err(e),
        }
    }

    fn try_load(&self, raw: &str) -> AppResult<Waveform> {
        let url = parse_remote_url(raw)?;

        let ext = Path::new(url.path())
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|e| LOADER_EXTENSIONS.contains(&e.as_str()))
            .unwrap_or_else(|| DEFAULT_AUDIO_EXTENSION.to_string());

        let response = self
            .agent
            .get(url.as_str())
            .call()
            .map_err(|e| AppError::download(url.as_str(), e))?;

        std::fs::create_dir_all(&self.temp_dir)?;
        let mut temp = tempfile::Builder::new()
            .prefix("url-audio-")
            .suffix(&format!(".{}", ext))
            .tempfile_in(&self.temp_dir)?;
        let written = std::io::copy(&mut response.into_reader(), temp.as_file_mut())
            .map_err(|e| AppError::download(url.as_str(), e))?;
        temp.as_file_mut().flush()?;
        info!("[LOADER] 已下载 {} bytes: {}", written, url);

        // temp 离开作用域时删除临时文件
        decode_file(temp.path())
    }
}

/// 用 symphonia 解码整个文件
pub fn decode_file(path: &Path) -> AppResult<Waveform> {
    let decode_err = |what: &str, e: &dyn std::fmt::Display| {
        AppError::Decode(format!("{} ({}): {}", what, path.display(), e))
    };

    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_err("无法识别格式", &e))?;
    let mut format = probed.format;

    let (track_id, codec_params) = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .map(|t| (t.id, t.codec_params.clone()))
        .ok_or_else(|| AppError::Decode(format!("没有音频轨道: {}", path.display())))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err("不支持的编码", &e))?;

    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_err("读取数据包失败", &e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("[LOADER] 跳过损坏的数据包: {}", e);
                continue;
            }
            Err(e) => return Err(decode_err("解码失败", &e)),
        };

        let spec = *decoded.spec();
        let n_channels = spec.channels.count();
        if n_channels == 0 {
            continue;
        }
        sample_rate = spec.rate;
        if channels.len() != n_channels {
            channels.resize(n_channels, Vec::new());
        }

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        for frame in buffer.samples().chunks_exact(n_channels) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
    }

    if channels.is_empty() || sample_rate == 0 {
        return Err(AppError::Decode(format!("没有解码出任何音频: {}", path.display())));
    }

    Ok(Waveform { channels, sample_rate })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::tests::serve_once;
    use std::io::Cursor;

    fn stereo_wav(frames: usize, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                writer.write_sample((i % 100) as i16 * 100).unwrap();
                writer.write_sample(-((i % 100) as i16) * 100).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        std::fs::write(&path, stereo_wav(1000, 22050)).unwrap();

        let waveform = decode_file(&path).unwrap();
        assert_eq!(waveform.num_channels(), 2);
        assert_eq!(waveform.sample_rate, 22050);
        assert_eq!(waveform.num_frames(), 1000);
        assert!(waveform.channels[0][1] > 0.0);
        assert!(waveform.channels[1][1] < 0.0);
    }

    #[test]
    fn test_load_from_url_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve_once(200, stereo_wav(500, 44100));
        let loader = UrlAudioLoader::new(dir.path(), false);

        let waveform = loader.load(&format!("{}/clip.wav", base)).unwrap();
        assert_eq!(waveform.num_frames(), 500);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_strict_mode_propagates_errors() {
        let dir = tempfile::tempdir().unwrap();
        let loader = UrlAudioLoader::new(dir.path(), false);
        assert!(matches!(loader.load("not a url"), Err(AppError::InvalidInput(_))));

        let base = serve_once(500, Vec::new());
        assert!(matches!(
            loader.load(&format!("{}/a.mp3", base)),
            Err(AppError::DownloadFailed { .. })
        ));
    }

    #[test]
    fn test_fallback_returns_silence() {
        let dir = tempfile::tempdir().unwrap();
        let loader = UrlAudioLoader::new(dir.path(), true);
        assert_eq!(loader.load("not a url").unwrap(), Waveform::silence());

        let base = serve_once(200, b"definitely not audio".to_vec());
        let waveform = loader.load(&format!("{}/a.mp3", base)).unwrap();
        assert_eq!(waveform, Waveform::silence());
    }
}

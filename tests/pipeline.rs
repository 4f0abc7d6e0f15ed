// 端到端：URL 下载 -> 指纹 -> 规整 -> 分离 -> 预览

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uvr5_nodes::audio::separator::{BackendFactory, BackendSpec, SeparationBackend};
use uvr5_nodes::audio::source::{ManagedDirs, SourceType};
use uvr5_nodes::device::DeviceConfig;
use uvr5_nodes::media::ffmpeg::MediaToolkit;
use uvr5_nodes::models::{HfHub, ModelFamily};
use uvr5_nodes::nodes::{load_audio, preview, uvr5};
use uvr5_nodes::utils::{AudioFormatInfo, OutputFormat, SeparationResult};
use uvr5_nodes::{AppError, AppResult, NodeContext};

/// 按请求路径应答的 HTTP 服务，记录收到的路径
fn serve_files(files: HashMap<String, Vec<u8>>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
                continue;
            }
            let mut line = String::new();
            while reader.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
                if line == "\r\n" {
                    break;
                }
                line.clear();
            }
            let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
            log.lock().push(path.clone());
            let (status, body) = match files.get(&path) {
                Some(body) => (200, body.clone()),
                None => (404, Vec::new()),
            };
            let head = format!(
                "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
        }
    });
    (format!("http://{}", addr), seen)
}

/// 所有文件都已是双声道 44.1kHz
#[derive(Default)]
struct ReadyToolkit {
    transcodes: Arc<Mutex<Vec<PathBuf>>>,
}

impl MediaToolkit for ReadyToolkit {
    fn probe(&self, path: &Path) -> AppResult<AudioFormatInfo> {
        if !path.is_file() {
            return Err(AppError::ProbeFailed(path.display().to_string()));
        }
        Ok(AudioFormatInfo { channels: 2, sample_rate: 44100 })
    }

    fn transcode(&self, input: &Path, _output: &Path) -> AppResult<()> {
        self.transcodes.lock().push(input.to_path_buf());
        Err(AppError::TranscodeFailed("unexpected".to_string()))
    }
}

struct RecordingBackend {
    events: Arc<Mutex<Vec<String>>>,
}

impl SeparationBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn separate(
        &mut self,
        input: &Path,
        ins_dir: &Path,
        vocal_dir: &Path,
        format: OutputFormat,
        is_hp3: bool,
    ) -> AppResult<SeparationResult> {
        self.events.lock().push(format!("separate {} hp3={}", input.display(), is_hp3));
        let name = input.file_name().unwrap().to_string_lossy().to_string();
        let vocal_path = vocal_dir.join(format!("vocal_{}_10.{}", name, format));
        let accompaniment_path = ins_dir.join(format!("instrument_{}_10.{}", name, format));
        fs::write(&vocal_path, b"vocal")?;
        fs::write(&accompaniment_path, b"instrument")?;
        Ok(SeparationResult { vocal_path, accompaniment_path })
    }

    fn release(&mut self) -> AppResult<()> {
        self.events.lock().push("release".to_string());
        Ok(())
    }

    fn empty_cache(&mut self) -> AppResult<()> {
        self.events.lock().push("empty_cache".to_string());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingFactory {
    specs: Arc<Mutex<Vec<BackendSpec>>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl BackendFactory for RecordingFactory {
    fn create(&self, spec: &BackendSpec) -> AppResult<Box<dyn SeparationBackend>> {
        self.specs.lock().push(spec.clone());
        Ok(Box::new(RecordingBackend { events: Arc::clone(&self.events) }))
    }
}

#[test]
fn test_url_to_separated_stems() {
    let root = tempfile::tempdir().unwrap();
    let mut files = HashMap::new();
    files.insert("/media/audio.mp3".to_string(), b"ID3 fake mp3".to_vec());
    files.insert(
        "/lj1995/VoiceConversionWebUI/resolve/main/uvr5_weights/HP5_only_main_vocal.pth".to_string(),
        b"weights".to_vec(),
    );
    let (base, seen) = serve_files(files);

    let toolkit = ReadyToolkit::default();
    let transcodes = Arc::clone(&toolkit.transcodes);
    let factory = RecordingFactory::default();
    let specs = Arc::clone(&factory.specs);
    let events = Arc::clone(&factory.events);

    let dirs = ManagedDirs {
        input_dir: root.path().join("input"),
        output_dir: root.path().join("output"),
        temp_dir: root.path().join("temp"),
    };
    for d in [&dirs.input_dir, &dirs.output_dir, &dirs.temp_dir] {
        fs::create_dir_all(d).unwrap();
    }
    let ctx = NodeContext {
        dirs,
        weights_dir: root.path().join("uvr5"),
        repo_id: "lj1995/VoiceConversionWebUI".to_string(),
        device: DeviceConfig::cpu(),
        fallback_to_silence: false,
        hub: Box::new(HfHub::new(&base, "main")),
        toolkit: Box::new(toolkit),
        factory: Box::new(factory),
    };

    let url = format!("{}/media/audio.mp3", base);

    // 指纹就是 URL，不会发起下载
    let fp = load_audio::load_audio_path_changed(&ctx, SourceType::Url, &url).unwrap();
    assert_eq!(fp.as_str(), url);
    assert!(seen.lock().is_empty());

    let resolved = load_audio::load_audio_path(&ctx, SourceType::Url, &url).unwrap();
    let downloaded = root.path().join("input").join("audio.mp3");
    assert_eq!(resolved.path, downloaded);
    assert_eq!(fs::read(&downloaded).unwrap(), b"ID3 fake mp3");

    let result = uvr5::split(
        &ctx,
        &resolved.path.to_string_lossy(),
        "HP5_only_main_vocal.pth",
        10,
        OutputFormat::Wav,
    )
    .unwrap();

    // 已是 2ch/44.1kHz，不转码
    assert!(transcodes.lock().is_empty());

    let weight = root.path().join("uvr5").join("uvr5_weights").join("HP5_only_main_vocal.pth");
    assert_eq!(fs::read(&weight).unwrap(), b"weights");
    {
        let specs = specs.lock();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].family, ModelFamily::Standard);
        assert_eq!(specs[0].weight_path, weight);
        assert_eq!(specs[0].aggressiveness, 10);
    }
    // CPU 上只释放模型，不清显卡缓存
    assert_eq!(
        *events.lock(),
        vec![format!("separate {} hp3=false", downloaded.display()), "release".to_string()]
    );

    let output_dir = root.path().join("output");
    assert_eq!(result.vocal_path.parent().unwrap(), output_dir);
    assert_eq!(result.accompaniment_path.parent().unwrap(), output_dir);
    assert_eq!(result.vocal_path.extension().and_then(|e| e.to_str()), Some("wav"));
    assert_eq!(result.accompaniment_path.extension().and_then(|e| e.to_str()), Some("wav"));

    let info = preview::preview_audio(&result.vocal_path.to_string_lossy()).unwrap();
    assert_eq!(info.subfolder, "output");
    assert_eq!(
        info.to_ui_json(),
        serde_json::json!({"ui": {"audio": ["vocal_audio.mp3_10.wav", "output"]}})
    );

    // 第二次分离复用已下载的权重
    uvr5::split(&ctx, &resolved.path.to_string_lossy(), "HP5_only_main_vocal.pth", 10, OutputFormat::Wav)
        .unwrap();
    let weight_requests = seen
        .lock()
        .iter()
        .filter(|p| p.ends_with(".pth"))
        .count();
    assert_eq!(weight_requests, 1);
}

// 音频来源模块
//
// 把用户给的引用（输入目录里的文件名，或远程 URL）解析成本地文件路径。
// 远程音频下载到输入目录并长期保留，不是临时文件。

use crate::error::{AppError, AppResult};
use crate::utils::{clean_input_path, generate_id, is_audio_extension, DEFAULT_AUDIO_EXTENSION};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use regex::Regex;
use tracing::{debug, info};
use url::Url;

lazy_static::lazy_static! {
    // 宿主的带注释文件名，如 "song.wav [output]"
    static ref ANNOTATION_REGEX: Regex = Regex::new(r"^(.*?)\s*\[(input|output|temp)\]$").unwrap();
}

/// 来源类型（节点上的下拉选项）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    File,
    Url,
}

impl FromStr for SourceType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(SourceType::File),
            "url" => Ok(SourceType::Url),
            other => Err(AppError::InvalidInput(format!("未知的来源类型: {}", other))),
        }
    }
}

/// 音频引用
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AudioReference {
    LocalPath(String),
    RemoteUrl(String),
}

impl AudioReference {
    pub fn new(source_type: SourceType, audio: &str) -> Self {
        match source_type {
            SourceType::File => AudioReference::LocalPath(audio.to_string()),
            SourceType::Url => AudioReference::RemoteUrl(audio.trim().to_string()),
        }
    }
}

/// 解析后的本地音频
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedAudio {
    pub path: PathBuf,
    pub origin: AudioReference,
}

/// 宿主管理的目录
#[derive(Debug, Clone)]
pub struct ManagedDirs {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl ManagedDirs {
    /// 解析带注释的文件名，未注释的默认在输入目录下
    ///
    /// 文件名只能是受管目录内的相对路径，绝对路径和 `..` 返回 InvalidInput。
    pub fn annotated_path(&self, name: &str) -> AppResult<PathBuf> {
        let name = clean_input_path(name);
        let (base, relative) = match ANNOTATION_REGEX.captures(&name) {
            Some(caps) => {
                let base = match &caps[2] {
                    "output" => &self.output_dir,
                    "temp" => &self.temp_dir,
                    _ => &self.input_dir,
                };
                (base, caps[1].to_string())
            }
            None => (&self.input_dir, name.clone()),
        };

        let escapes = Path::new(&relative)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.is_empty() || escapes {
            return Err(AppError::InvalidInput(format!("文件名不在受管目录内: {}", name)));
        }
        Ok(base.join(relative))
    }
}

/// 校验 URL，必须同时有协议和主机
pub fn parse_remote_url(raw: &str) -> AppResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| AppError::InvalidInput(format!("无效的 URL {:?}: {}", raw, e)))?;
    if url.scheme().is_empty() || url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(AppError::InvalidInput(format!("URL 缺少协议或主机: {}", raw)));
    }
    Ok(url)
}

/// 由 URL 路径推导本地文件名
///
/// 没有文件名（或文件名不含扩展名）时生成随机名；扩展名不是音频格式时保留主名、改成 .mp3。
pub fn local_filename_for(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    if last.is_empty() || !last.contains('.') {
        return format!("{}.{}", generate_id(), DEFAULT_AUDIO_EXTENSION);
    }

    let path = Path::new(last);
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if is_audio_extension(ext) {
        return last.to_string();
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_id);
    format!("{}.{}", stem, DEFAULT_AUDIO_EXTENSION)
}

/// 音频来源解析器
pub struct AudioSource {
    dirs: ManagedDirs,
    agent: ureq::Agent,
}

impl AudioSource {
    pub fn new(dirs: ManagedDirs) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .build();
        Self { dirs, agent }
    }

    pub fn dirs(&self) -> &ManagedDirs {
        &self.dirs
    }

    /// 解析引用为本地文件
    pub fn resolve(&self, reference: &AudioReference) -> AppResult<ResolvedAudio> {
        let path = match reference {
            AudioReference::LocalPath(name) => self.resolve_local(name)?,
            AudioReference::RemoteUrl(raw) => self.download(raw)?,
        };
        Ok(ResolvedAudio {
            path,
            origin: reference.clone(),
        })
    }

    /// 本地文件必须存在
    pub fn resolve_local(&self, name: &str) -> AppResult<PathBuf> {
        let path = self.dirs.annotated_path(name)?;
        if !path.is_file() {
            return Err(AppError::NotFound(format!("音频文件不存在: {}", path.display())));
        }
        debug!("[SOURCE] 本地音频: {}", path.display());
        Ok(path)
    }

    /// 下载远程音频到输入目录，同名文件直接覆盖
    ///
    /// 下载中途失败不会清理已写入的部分文件。
    pub fn download(&self, raw: &str) -> AppResult<PathBuf> {
        let url = parse_remote_url(raw)?;
        let save_path = self.dirs.input_dir.join(local_filename_for(&url));

        info!("[SOURCE] 下载音频文件: {} 到 {}", url, save_path.display());

        let response = self
            .agent
            .get(url.as_str())
            .call()
            .map_err(|e| AppError::download(url.as_str(), e))?;

        fs::create_dir_all(&self.dirs.input_dir)?;
        let mut file = fs::File::create(&save_path)
            .map_err(|e| AppError::download(url.as_str(), e))?;
        let written = std::io::copy(&mut response.into_reader(), &mut file)
            .map_err(|e| AppError::download(url.as_str(), e))?;

        info!("[SOURCE] 下载完成: {} ({} bytes)", save_path.display(), written);
        Ok(save_path)
    }

    /// 输入目录中的音频文件名（按名称排序，不递归）
    pub fn list_input_audio(&self) -> AppResult<Vec<String>> {
        list_audio_files(&self.dirs.input_dir)
    }
}

/// 列出目录中带音频扩展名的文件
pub fn list_audio_files(dir: &Path) -> AppResult<Vec<String>> {
    let mut files: Vec<String> = fs::read_dir(dir)?
        .flatten()
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| {
            name.rsplit_once('.')
                .map(|(_, ext)| is_audio_extension(ext))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

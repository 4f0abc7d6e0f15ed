// 变更指纹模块
//
// 宿主在决定是否重新执行节点前调用这里：两次指纹相同则复用上次的输出。
// 本地文件取内容的 SHA256；远程 URL 直接用 URL 文本。
// URL 指纹只能感知 URL 本身的变化，远端内容被悄悄替换时不会触发重算。

use crate::audio::source::{AudioReference, ManagedDirs, ResolvedAudio};
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// 流式读取的块大小
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// 变更指纹
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 计算文件内容的 SHA256（十六进制小写）
pub fn hash_file(path: &Path) -> AppResult<Fingerprint> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            AppError::NotFound(format!("音频文件不存在: {}", path.display()))
        }
        _ => AppError::Io(e),
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    let digest = hex::encode(hasher.finalize());
    debug!("[FINGERPRINT] {} -> {}", path.display(), digest);
    Ok(Fingerprint(digest))
}

/// 已解析音频的指纹
pub fn fingerprint_resolved(audio: &ResolvedAudio) -> AppResult<Fingerprint> {
    match &audio.origin {
        AudioReference::RemoteUrl(url) => Ok(Fingerprint(url.clone())),
        AudioReference::LocalPath(_) => hash_file(&audio.path),
    }
}

/// 未解析引用的指纹，不会触发下载
pub fn fingerprint_reference(reference: &AudioReference, dirs: &ManagedDirs) -> AppResult<Fingerprint> {
    match reference {
        AudioReference::RemoteUrl(url) => Ok(Fingerprint(url.clone())),
        AudioReference::LocalPath(name) => hash_file(&dirs.annotated_path(name)?),
    }
}

// 模型管理模块
//
// UVR5 权重目录结构（与模型仓库一致）:
//   <weights_dir>/uvr5_weights/<model>.pth
//   <weights_dir>/uvr5_weights/onnx_dereverb_By_FoxJoy/vocals.onnx

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// 权重子目录
pub const WEIGHTS_SUBFOLDER: &str = "uvr5_weights";

/// onnx 去混响模型名（不是文件名）
pub const ONNX_DEREVERB_MODEL: &str = "onnx_dereverb_By_FoxJoy";

/// onnx 去混响模型实际的权重文件
pub const ONNX_DEREVERB_FILENAME: &str = "vocals.onnx";

/// 默认模型
pub const DEFAULT_MODEL: &str = "HP5-主旋律人声vocals+其他instrumentals.pth";

/// 所有可选模型
pub const KNOWN_MODELS: &[&str] = &[
    "HP5_only_main_vocal.pth",
    "HP5-主旋律人声vocals+其他instrumentals.pth",
    "HP2_all_vocals.pth",
    "HP2-人声vocals+非人声instrumentals.pth",
    "HP3_all_vocals.pth",
    "VR-DeEchoAggressive.pth",
    "VR-DeEchoDeReverb.pth",
    "VR-DeEchoNormal.pth",
    ONNX_DEREVERB_MODEL,
];

/// 模型家族，决定使用哪种推理封装
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// VR 标准人声分离
    Standard,
    /// VR 去回声
    DeEcho,
    /// MDX-Net onnx 去混响
    OnnxDereverb,
}

impl ModelFamily {
    pub fn from_name(model_name: &str) -> Self {
        if model_name == ONNX_DEREVERB_MODEL {
            ModelFamily::OnnxDereverb
        } else if model_name.contains("DeEcho") {
            ModelFamily::DeEcho
        } else {
            ModelFamily::Standard
        }
    }
}

/// HP3 模型的人声/伴奏构造方式不同，需要透传给推理端
pub fn is_hp3(model_name: &str) -> bool {
    model_name.contains("HP3")
}

/// 模型名是否在可选列表中
pub fn is_known_model(model_name: &str) -> bool {
    KNOWN_MODELS.contains(&model_name)
}

/// 模型在仓库中的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightLocation {
    pub filename: String,
    pub subfolder: String,
}

impl WeightLocation {
    pub fn for_model(model_name: &str) -> Self {
        if ModelFamily::from_name(model_name) == ModelFamily::OnnxDereverb {
            Self {
                filename: ONNX_DEREVERB_FILENAME.to_string(),
                subfolder: format!("{}/{}", WEIGHTS_SUBFOLDER, ONNX_DEREVERB_MODEL),
            }
        } else {
            Self {
                filename: model_name.to_string(),
                subfolder: WEIGHTS_SUBFOLDER.to_string(),
            }
        }
    }

    /// 本地路径：<weights_dir>/<subfolder>/<filename>
    pub fn local_path(&self, weights_dir: &Path) -> PathBuf {
        self.subfolder
            .split('/')
            .fold(weights_dir.to_path_buf(), |p, part| p.join(part))
            .join(&self.filename)
    }
}

/// 模型仓库拉取接口
pub trait ModelHub {
    /// 下载 `<subfolder>/<filename>` 到 `<local_dir>/<subfolder>/<filename>`，返回本地路径
    fn fetch(
        &self,
        repo_id: &str,
        filename: &str,
        subfolder: &str,
        local_dir: &Path,
    ) -> AppResult<PathBuf>;
}

/// Hugging Face 仓库
pub struct HfHub {
    endpoint: String,
    revision: String,
    agent: ureq::Agent,
}

impl HfHub {
    pub fn new(endpoint: &str, revision: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .build();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            revision: revision.to_string(),
            agent,
        }
    }

    pub fn file_url(&self, repo_id: &str, filename: &str, subfolder: &str) -> String {
        let subfolder = subfolder.trim_matches('/');
        if subfolder.is_empty() {
            format!("{}/{}/resolve/{}/{}", self.endpoint, repo_id, self.revision, filename)
        } else {
            format!(
                "{}/{}/resolve/{}/{}/{}",
                self.endpoint, repo_id, self.revision, subfolder, filename
            )
        }
    }
}

impl ModelHub for HfHub {
    fn fetch(
        &self,
        repo_id: &str,
        filename: &str,
        subfolder: &str,
        local_dir: &Path,
    ) -> AppResult<PathBuf> {
        let url = self.file_url(repo_id, filename, subfolder);
        let target = WeightLocation {
            filename: filename.to_string(),
            subfolder: subfolder.trim_matches('/').to_string(),
        }
        .local_path(local_dir);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::ModelFetchFailed(format!("创建权重目录失败: {}", e)))?;
        }

        info!("[HUB] 下载模型: {} -> {}", url, target.display());

        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| AppError::ModelFetchFailed(format!("{}: {}", url, e)))?;

        // 先写 .part，完整后再改名，避免留下半个权重文件被当成已下载
        let part_path = target.with_file_name(format!("{}.part", filename));
        let written = (|| -> std::io::Result<u64> {
            let mut file = fs::File::create(&part_path)?;
            let n = std::io::copy(&mut response.into_reader(), &mut file)?;
            file.flush()?;
            Ok(n)
        })();

        let written = match written {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&part_path);
                return Err(AppError::ModelFetchFailed(format!("写入 {} 失败: {}", filename, e)));
            }
        };

        fs::rename(&part_path, &target)
            .map_err(|e| AppError::ModelFetchFailed(format!("重命名 {} 失败: {}", filename, e)))?;

        info!("[HUB] 下载完成: {} ({} bytes)", target.display(), written);
        Ok(target)
    }
}

/// 确保模型权重在本地，缺失时从仓库拉取；已存在的文件不会重新下载
pub fn ensure_weights(
    model_name: &str,
    weights_dir: &Path,
    hub: &dyn ModelHub,
    repo_id: &str,
) -> AppResult<PathBuf> {
    let location = WeightLocation::for_model(model_name);
    let local = location.local_path(weights_dir);

    if local.is_file() {
        debug!("[HUB] 权重已存在: {}", local.display());
        return Ok(local);
    }

    hub.fetch(repo_id, &location.filename, &location.subfolder, weights_dir)?;

    if !local.is_file() {
        return Err(AppError::ModelFetchFailed(format!(
            "下载后仍找不到权重文件: {}",
            local.display()
        )));
    }
    Ok(local)
}

/// 模型状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub model: String,
    pub family: ModelFamily,
    pub downloaded: bool,
    pub local_path: String,
}

/// 获取所有模型的下载状态
pub fn model_status(weights_dir: &Path) -> Vec<ModelStatus> {
    KNOWN_MODELS
        .iter()
        .map(|name| {
            let path = WeightLocation::for_model(name).local_path(weights_dir);
            ModelStatus {
                model: name.to_string(),
                family: ModelFamily::from_name(name),
                downloaded: path.is_file(),
                local_path: path.to_string_lossy().to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// 记录调用并写出占位文件的假仓库
    #[derive(Default)]
    pub(crate) struct RecordingHub {
        pub calls: Mutex<Vec<(String, String, String)>>,
        pub fail: bool,
    }

    impl ModelHub for RecordingHub {
        fn fetch(
            &self,
            repo_id: &str,
            filename: &str,
            subfolder: &str,
            local_dir: &Path,
        ) -> AppResult<PathBuf> {
            self.calls.lock().push((repo_id.to_string(), filename.to_string(), subfolder.to_string()));
            if self.fail {
                return Err(AppError::ModelFetchFailed("offline".to_string()));
            }
            let target = WeightLocation {
                filename: filename.to_string(),
                subfolder: subfolder.to_string(),
            }
            .local_path(local_dir);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(&target, b"weights").unwrap();
            Ok(target)
        }
    }

    #[test]
    fn test_family_selection() {
        assert_eq!(ModelFamily::from_name(ONNX_DEREVERB_MODEL), ModelFamily::OnnxDereverb);
        assert_eq!(ModelFamily::from_name("VR-DeEchoNormal.pth"), ModelFamily::DeEcho);
        assert_eq!(ModelFamily::from_name("HP5_only_main_vocal.pth"), ModelFamily::Standard);
        assert!(is_hp3("HP3_all_vocals.pth"));
        assert!(!is_hp3("HP2_all_vocals.pth"));
    }

    #[test]
    fn test_weight_locations() {
        let base = Path::new("/w");
        let vr = WeightLocation::for_model("HP2_all_vocals.pth");
        assert_eq!(vr.local_path(base), PathBuf::from("/w/uvr5_weights/HP2_all_vocals.pth"));

        let onnx = WeightLocation::for_model(ONNX_DEREVERB_MODEL);
        assert_eq!(onnx.subfolder, "uvr5_weights/onnx_dereverb_By_FoxJoy");
        assert_eq!(
            onnx.local_path(base),
            PathBuf::from("/w/uvr5_weights/onnx_dereverb_By_FoxJoy/vocals.onnx")
        );
    }

    #[test]
    fn test_ensure_weights_fetches_once() {
        let dir = tempfile::tempdir().unwrap();
        let hub = RecordingHub::default();

        let first = ensure_weights("HP3_all_vocals.pth", dir.path(), &hub, "repo/x").unwrap();
        let second = ensure_weights("HP3_all_vocals.pth", dir.path(), &hub, "repo/x").unwrap();

        assert_eq!(first, second);
        let calls = hub.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("repo/x".to_string(), "HP3_all_vocals.pth".to_string(), "uvr5_weights".to_string()));
    }

    #[test]
    fn test_ensure_weights_propagates_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let hub = RecordingHub { fail: true, ..Default::default() };
        let err = ensure_weights("HP2_all_vocals.pth", dir.path(), &hub, "repo/x").unwrap_err();
        assert!(matches!(err, AppError::ModelFetchFailed(_)));
    }

    #[test]
    fn test_hub_url() {
        let hub = HfHub::new("https://huggingface.co/", "main");
        assert_eq!(
            hub.file_url("lj1995/VoiceConversionWebUI", "vocals.onnx", "uvr5_weights/onnx_dereverb_By_FoxJoy"),
            "https://huggingface.co/lj1995/VoiceConversionWebUI/resolve/main/uvr5_weights/onnx_dereverb_By_FoxJoy/vocals.onnx"
        );
    }

    #[test]
    fn test_model_status() {
        let dir = tempfile::tempdir().unwrap();
        let hub = RecordingHub::default();
        ensure_weights("VR-DeEchoNormal.pth", dir.path(), &hub, "repo/x").unwrap();

        let status = model_status(dir.path());
        assert_eq!(status.len(), KNOWN_MODELS.len());
        let downloaded: Vec<_> = status.iter().filter(|s| s.downloaded).map(|s| s.model.as_str()).collect();
        assert_eq!(downloaded, vec!["VR-DeEchoNormal.pth"]);
    }
}

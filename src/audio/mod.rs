// 音频处理模块
//
// 子模块：
// - source: 输入解析（本地文件 / URL 下载）
// - fingerprint: 变更指纹，供宿主判断是否需要重新执行
// - normalizer: 规整为双声道 44.1kHz
// - separator: 人声/伴奏分离（UVR5 模型，worker 进程推理）
// - worker: 推理 worker 进程协议
// - preview: 界面播放信息
// - loader: URL 音频直接解码为波形

pub mod fingerprint;
pub mod loader;
pub mod normalizer;
pub mod preview;
pub mod separator;
pub mod source;
pub mod worker;

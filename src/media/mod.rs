// 外部媒体工具模块
//
// 子模块：
// - ffmpeg: ffprobe 探测与 ffmpeg 转码

pub mod ffmpeg;

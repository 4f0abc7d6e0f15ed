// UVR5 人声分离节点
//
// 音频来源解析、变更指纹、格式规整、分离调用与结果预览。

pub mod audio;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod media;
pub mod models;
pub mod nodes;
pub mod utils;

pub use error::{AppError, AppResult};
pub use nodes::NodeContext;

// 命令行参数

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uvr5_nodes::audio::source::SourceType;
use uvr5_nodes::utils::OutputFormat;

/// uvr5-nodes - UVR5 人声/伴奏分离
///
/// 每个子命令对应一个节点，结果以 JSON 输出到 stdout，日志写入数据目录。
#[derive(Parser, Debug)]
#[command(name = "uvr5-nodes")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// 数据目录（config.json、logs、input/output/temp、权重）
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// 同时把日志输出到 stderr（可重复: -v, -vv）
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 解析音频来源（本地文件或下载 URL）
    Load {
        #[arg(long, default_value = "file")]
        source_type: SourceType,
        audio: String,
    },
    /// 加载节点的变更指纹
    Fingerprint {
        #[arg(long, default_value = "file")]
        source_type: SourceType,
        audio: String,
    },
    /// 从 URL 加载并解码，输出波形概要
    LoadUrl { url: String },
    /// 分离人声和伴奏
    Separate {
        audio: String,
        #[command(flatten)]
        options: SeparateArgs,
    },
    /// 预览信息；--changed 时输出预览节点的变更指纹
    Preview {
        path: String,
        #[arg(long)]
        changed: bool,
    },
    /// 加载、分离、预览一次完成
    Run {
        #[arg(long, default_value = "file")]
        source_type: SourceType,
        audio: String,
        #[command(flatten)]
        options: SeparateArgs,
    },
    /// 列出输入目录中的音频
    Inputs,
    /// 列出模型及下载状态
    Models,
}

/// 未指定时取配置中的默认值
#[derive(clap::Args, Debug)]
pub struct SeparateArgs {
    #[arg(long)]
    pub model: Option<String>,
    /// 激进程度 0-20
    #[arg(long, allow_negative_numbers = true)]
    pub agg: Option<i64>,
    #[arg(long)]
    pub format: Option<OutputFormat>,
}

// uvr5-nodes 命令行入口

mod cli;

use clap::Parser;
use cli::{Cli, Command, SeparateArgs};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use uvr5_nodes::config::{self, AppConfig, LogLevel};
use uvr5_nodes::nodes::{load_audio, preview, uvr5};
use uvr5_nodes::utils::SeparationResult;
use uvr5_nodes::{logging, models, AppResult, NodeContext};

/// 获取数据目录（可执行文件同级的 data 文件夹）
fn get_app_data_dir() -> PathBuf {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            // 开发模式下，exe 在 target/debug 目录，需要回到项目根目录
            let in_target = exe_dir.ends_with("target/debug")
                || exe_dir.ends_with("target/release")
                || exe_dir.ends_with("target\\debug")
                || exe_dir.ends_with("target\\release");
            let data_dir = if in_target {
                exe_dir
                    .parent()
                    .and_then(|p| p.parent())
                    .map(|p| p.join("data"))
                    .unwrap_or_else(|| exe_dir.join("data"))
            } else {
                exe_dir.join("data")
            };
            return data_dir;
        }
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("data")
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(get_app_data_dir);

    if let Err(e) = config::init_config(&data_dir.join("config.json")) {
        eprintln!("初始化配置失败: {}", e);
    }
    let app_config = config::get_config();

    let log_level = match cli.verbose {
        0 | 1 => app_config.log_level.clone(),
        _ => LogLevel::Debug,
    };
    // guard 必须保持存活，否则异步日志线程会退出
    let _log_guard = logging::init_logging(&data_dir, &log_level, cli.verbose > 0);

    info!("uvr5-nodes 启动, 数据目录: {:?}", data_dir);

    match run(cli.command, &app_config, &data_dir) {
        Ok(value) => {
            println!("{}", value);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("执行失败: {}", e);
            println!("{}", serde_json::json!({ "error": e }));
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, app_config: &AppConfig, data_dir: &Path) -> AppResult<serde_json::Value> {
    let ctx = NodeContext::from_config(app_config, data_dir)?;

    let value = match command {
        Command::Load { source_type, audio } => {
            serde_json::to_value(load_audio::load_audio_path(&ctx, source_type, &audio)?)?
        }
        Command::Fingerprint { source_type, audio } => {
            serde_json::to_value(load_audio::load_audio_path_changed(&ctx, source_type, &audio)?)?
        }
        Command::LoadUrl { url } => {
            let waveform = load_audio::load_audio_url(&ctx, &url)?;
            serde_json::json!({
                "channels": waveform.num_channels(),
                "frames": waveform.num_frames(),
                "sample_rate": waveform.sample_rate,
            })
        }
        Command::Separate { audio, options } => {
            serde_json::to_value(separate(&ctx, app_config, &audio, &options)?)?
        }
        Command::Preview { path, changed } => {
            if changed {
                serde_json::to_value(preview::preview_audio_changed(&ctx, &path)?)?
            } else {
                preview::preview_audio(&path)?.to_ui_json()
            }
        }
        Command::Run { source_type, audio, options } => {
            let resolved = load_audio::load_audio_path(&ctx, source_type, &audio)?;
            let path = resolved.path.to_string_lossy().to_string();
            let result = separate(&ctx, app_config, &path, &options)?;
            let vocal = preview::preview_audio(&result.vocal_path.to_string_lossy())?;
            let instrument = preview::preview_audio(&result.accompaniment_path.to_string_lossy())?;
            serde_json::json!({
                "audio": resolved,
                "result": result,
                "preview": [vocal.to_ui_json(), instrument.to_ui_json()],
            })
        }
        Command::Inputs => serde_json::to_value(load_audio::input_choices(&ctx)?)?,
        Command::Models => serde_json::to_value(models::model_status(&ctx.weights_dir))?,
    };
    Ok(value)
}

fn separate(
    ctx: &NodeContext,
    app_config: &AppConfig,
    audio: &str,
    options: &SeparateArgs,
) -> AppResult<SeparationResult> {
    let defaults = &app_config.separation;
    let model = options.model.as_deref().unwrap_or(&defaults.default_model);
    let agg = options.agg.unwrap_or(i64::from(defaults.aggressiveness));
    let format = options.format.unwrap_or(defaults.output_format);
    uvr5::split(ctx, audio, model, agg, format)
}

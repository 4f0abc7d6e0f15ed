// 日志管理模块
// 提供异步非阻塞的日志持久化功能

use std::path::Path;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use crate::config::LogLevel;

/// 日志保留天数
const LOG_RETENTION_DAYS: u64 = 7;

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "uvr5-nodes.log";

/// 初始化日志系统
///
/// 返回 WorkerGuard，必须在 main 函数中保持存活，否则异步日志线程会提前退出
pub fn init_logging(data_dir: &Path, log_level: &LogLevel, verbose: bool) -> WorkerGuard {
    let log_dir = data_dir.join("logs");

    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("创建日志目录失败: {}", e);
    }

    cleanup_old_logs(&log_dir);

    // 按天轮转日志文件
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &log_dir,
        LOG_FILE_PREFIX,
    );

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    // ureq / symphonia 只记录 warn，减少噪音
    let filter_string = format!("{},ureq=warn,symphonia=warn", log_level.as_str());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&filter_string));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_writer)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true);

    // 控制台输出走 stderr，stdout 留给 JSON 结果
    let console_layer = (cfg!(debug_assertions) || verbose).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}

/// 清理超过保留期限的旧日志文件
fn cleanup_old_logs(log_dir: &Path) {
    let now = std::time::SystemTime::now();
    let retention_duration = std::time::Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let is_ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|name| name.starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false);
        if !is_ours {
            continue;
        }

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => continue,
        };

        if let Ok(age) = now.duration_since(modified) {
            if age > retention_duration {
                if let Err(e) = fs::remove_file(&path) {
                    eprintln!("删除旧日志文件失败 {:?}: {}", path, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_keeps_fresh_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let ours = dir.path().join(format!("{}.2026-10-18", LOG_FILE_PREFIX));
        let foreign = dir.path().join("other.log");
        fs::write(&ours, "x").unwrap();
        fs::write(&foreign, "y").unwrap();

        cleanup_old_logs(dir.path());

        assert!(ours.exists());
        assert!(foreign.exists());
    }
}

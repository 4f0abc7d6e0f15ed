// 推理 worker 进程
//
// 模型权重加载在独立的 worker 进程里，双方通过 stdin/stdout 逐行交换 JSON：
//   启动后 worker 输出一行 {"ok":true} 表示模型已加载
//   {"op":"separate","input":..,"ins_dir":..,"vocal_dir":..,"format":"wav","is_hp3":false}
//     -> {"ok":true,"vocal":"..","instrument":".."}
//   {"op":"release"}      -> 释放已加载的权重
//   {"op":"empty_cache"}  -> 释放显卡缓存
// 失败时返回 {"ok":false,"error":".."}。stderr 只用于日志。

use crate::error::{AppError, AppResult};
use crate::utils::{hidden_command, OutputFormat};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 出错时附带的 stderr 行数
const STDERR_TAIL_LINES: usize = 20;

/// 关闭 stdin 后等待 worker 自行退出的时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WorkerRequest<'a> {
    Separate {
        input: &'a Path,
        ins_dir: &'a Path,
        vocal_dir: &'a Path,
        format: OutputFormat,
        is_hp3: bool,
    },
    Release,
    EmptyCache,
}

#[derive(Debug, Deserialize)]
pub struct WorkerResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub vocal: Option<PathBuf>,
    #[serde(default)]
    pub instrument: Option<PathBuf>,
}

pub struct UvrWorker {
    label: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
}

impl UvrWorker {
    /// 启动 worker 并等待模型加载完成
    pub fn spawn(program: &str, args: &[String]) -> AppResult<Self> {
        info!("[SEPARATOR] 启动推理 worker: {} {}", program, args.join(" "));

        let mut child = hidden_command(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                error!("[SEPARATOR] 启动 worker 失败: {}", e);
                AppError::InferenceFailed(format!("启动推理 worker {} 失败: {}", program, e))
            })?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::InferenceFailed("无法获取 worker 输出流".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::InferenceFailed("无法获取 worker 错误输出流".into()))?;

        // 持续读取 stderr，防止管道写满阻塞 worker
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let tail = Arc::clone(&stderr_tail);
        std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                debug!("[SEPARATOR] worker stderr: {}", line);
                let mut tail = tail.lock();
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        });

        let mut worker = Self {
            label: program.to_string(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr_tail,
        };

        let ready = worker.read_response()?;
        if !ready.ok {
            return Err(worker.failure("模型加载失败", ready.error));
        }
        debug!("[SEPARATOR] worker 已就绪");
        Ok(worker)
    }

    /// 发送一条请求并读取应答；ok=false 时转为错误
    pub fn request(&mut self, request: &WorkerRequest<'_>) -> AppResult<WorkerResponse> {
        let line = serde_json::to_string(request)?;
        debug!("[SEPARATOR] -> worker: {}", line);

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AppError::InferenceFailed("worker 输入流已关闭".into()))?;
        writeln!(stdin, "{}", line)
            .and_then(|_| stdin.flush())
            .map_err(|e| AppError::InferenceFailed(format!("写入 worker 失败: {}", e)))?;

        let response = self.read_response()?;
        if !response.ok {
            return Err(self.failure("worker 返回错误", response.error));
        }
        Ok(response)
    }

    /// 读取下一条 JSON 应答，跳过非 JSON 的输出行
    fn read_response(&mut self) -> AppResult<WorkerResponse> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .stdout
                .read_line(&mut line)
                .map_err(|e| AppError::InferenceFailed(format!("读取 worker 输出失败: {}", e)))?;
            if n == 0 {
                let status = self.child.try_wait().ok().flatten().and_then(|s| s.code());
                return Err(self.failure(
                    "worker 意外退出",
                    Some(format!("退出码: {:?}", status)),
                ));
            }
            let trimmed = line.trim();
            if !trimmed.starts_with('{') {
                if !trimmed.is_empty() {
                    debug!("[SEPARATOR] worker stdout: {}", trimmed);
                }
                continue;
            }
            return serde_json::from_str(trimmed).map_err(|e| {
                AppError::InferenceFailed(format!("解析 worker 应答失败: {} ({})", e, trimmed))
            });
        }
    }

    fn failure(&self, what: &str, detail: Option<String>) -> AppError {
        let tail: Vec<String> = self.stderr_tail.lock().iter().cloned().collect();
        let mut message = format!("{} [{}]", what, self.label);
        if let Some(detail) = detail {
            message.push_str(": ");
            message.push_str(&detail);
        }
        if !tail.is_empty() {
            message.push('\n');
            message.push_str(&tail.join("\n"));
        }
        error!("[SEPARATOR] {}", message);
        AppError::InferenceFailed(message)
    }

    /// 关闭输入流让 worker 退出，超时则强制结束
    pub fn shutdown(&mut self) {
        drop(self.stdin.take());

        let deadline = std::time::Instant::now() + SHUTDOWN_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!("[SEPARATOR] worker 已退出: {:?}", status.code());
                    return;
                }
                Ok(None) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                _ => break,
            }
        }

        warn!("[SEPARATOR] worker 未按时退出，强制结束");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for UvrWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

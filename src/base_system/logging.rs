//! 日志系统：控制台 + `logs/latest.log`。
//!
//! 文件日志按子系统分级：`walk`/`locate` 的逐轮区间记录在 DEBUG，
//! `player` 的重试细节只在调试模式下写入 TRACE。退出、Ctrl-C、panic
//! 以及启动时超过 10MB 的旧日志都会打包为 zip，只保留最近几份。

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::{io, panic};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

const LATEST_LOG: &str = "latest.log";
const ARCHIVE_PREFIX: &str = "reconstruct_";
const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// 搜索与遍历相关的 target，文件日志里始终保留 DEBUG。
const SEARCH_TARGETS: [&str; 3] = ["walk", "locate", "reconstruct"];

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("time formatting failed: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    pub debug: bool,
    pub use_color: bool,
    pub archive_on_exit: bool,
    pub console: bool,
    /// 保留的归档数量，0 表示不清理
    pub keep_archives: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            archive_on_exit: true,
            console: true,
            keep_archives: 10,
        }
    }
}

/// 控制台：普通模式只看 INFO，调试模式放开到 DEBUG，`player` 的重试噪音始终不上屏。
fn console_filter(debug: bool) -> Targets {
    let level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    Targets::new()
        .with_default(level)
        .with_target("player", LevelFilter::INFO)
}

fn file_filter(debug: bool) -> Targets {
    let base = if debug {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    SEARCH_TARGETS
        .iter()
        .fold(Targets::new().with_default(base), |targets, target| {
            targets.with_target(*target, LevelFilter::DEBUG.max(base))
        })
}

pub struct LogSystem {
    shared: Arc<Shutdown>,
}

impl LogSystem {
    /// 初始化全局日志；`base_dir` 为 None 时日志写到当前目录的 `logs/`。
    pub fn init_with_base(options: LogOptions, base_dir: Option<&Path>) -> Result<Self, LogError> {
        let logs_dir = base_dir
            .map(|b| b.join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"));
        fs::create_dir_all(&logs_dir)?;
        let latest_log = logs_dir.join(LATEST_LOG);

        // 上次运行异常退出、没来得及归档的大日志先收起来
        if fs::metadata(&latest_log).is_ok_and(|m| m.len() >= MAX_LOG_BYTES) {
            archive_log_file(&latest_log, &logs_dir)?;
        }

        let (file_writer, guard) = non_blocking::NonBlockingBuilder::default()
            .lossy(false)
            .finish(rolling::never(&logs_dir, LATEST_LOG));

        let console_writer = if options.console {
            BoxMakeWriter::new(io::stderr)
        } else {
            BoxMakeWriter::new(io::sink)
        };

        let console_layer = fmt::layer()
            .with_target(false)
            .with_ansi(options.use_color)
            .with_writer(console_writer)
            .with_filter(console_filter(options.debug));

        let file_layer = fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(file_writer)
            .with_filter(file_filter(options.debug));

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| {
                if e.to_string().contains("global") {
                    LogError::AlreadyInitialized
                } else {
                    LogError::SubscriberInit(e)
                }
            })?;

        let shared = Arc::new(Shutdown {
            logs_dir,
            guard: Mutex::new(Some(guard)),
            done: AtomicBool::new(false),
            archive: options.archive_on_exit,
            keep_archives: options.keep_archives,
        });
        shared.hook_interrupt();
        shared.hook_panic();

        Ok(Self { shared })
    }

    pub fn logs_dir(&self) -> &Path {
        &self.shared.logs_dir
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.shared.finish();
    }
}

struct Shutdown {
    logs_dir: PathBuf,
    guard: Mutex<Option<WorkerGuard>>,
    done: AtomicBool,
    archive: bool,
    keep_archives: usize,
}

impl Shutdown {
    fn hook_interrupt(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        let _ = ctrlc::set_handler(move || {
            warn!("收到中断信号；已落盘的分段与 status.json 保留，可直接续传");
            shared.finish();
            std::process::exit(130);
        });
    }

    fn hook_panic(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            error!("panic: {info}");
            shared.finish();
            previous(info);
        }));
    }

    /// 只执行一次：刷新写线程后归档并清理旧归档。
    fn finish(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        // 丢弃 guard 会阻塞到写线程清空缓冲
        if let Ok(mut guard) = self.guard.lock() {
            guard.take();
        }
        if !self.archive {
            return;
        }
        let latest = self.logs_dir.join(LATEST_LOG);
        if let Err(err) = archive_log_file(&latest, &self.logs_dir) {
            eprintln!("failed to archive log: {err}");
        }
        if let Err(err) = prune_archives(&self.logs_dir, self.keep_archives) {
            eprintln!("failed to prune log archives: {err}");
        }
    }
}

fn archive_log_file(latest_log: &Path, logs_dir: &Path) -> Result<Option<PathBuf>, LogError> {
    let len = match fs::metadata(latest_log) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len == 0 {
        let _ = fs::remove_file(latest_log);
        return Ok(None);
    }

    let stamp = OffsetDateTime::now_utc().format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    let archive_path = unique_archive_path(logs_dir, &stamp);

    let mut zip = zip::ZipWriter::new(File::create(&archive_path)?);
    zip.start_file(
        format!("{stamp}.log"),
        FileOptions::default().compression_method(CompressionMethod::Deflated),
    )?;
    io::copy(&mut File::open(latest_log)?, &mut zip)?;
    zip.finish()?;
    fs::remove_file(latest_log)?;

    info!("log archived to {}", archive_path.display());
    Ok(Some(archive_path))
}

/// 同一秒内多次归档时追加序号。
fn unique_archive_path(logs_dir: &Path, stamp: &str) -> PathBuf {
    let first = logs_dir.join(format!("{ARCHIVE_PREFIX}{stamp}.zip"));
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| logs_dir.join(format!("{ARCHIVE_PREFIX}{stamp}_{n}.zip")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// 按文件名（即时间戳）排序，删除最旧的归档直到只剩 `keep` 份。
fn prune_archives(logs_dir: &Path, keep: usize) -> io::Result<usize> {
    if keep == 0 {
        return Ok(0);
    }
    let mut archives: Vec<PathBuf> = fs::read_dir(logs_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(ARCHIVE_PREFIX) && n.ends_with(".zip"))
        })
        .collect();
    if archives.len() <= keep {
        return Ok(0);
    }
    archives.sort();
    let stale = archives.len() - keep;
    for path in &archives[..stale] {
        fs::remove_file(path)?;
    }
    Ok(stale)
}
